//! Test pass: evaluate `test` annotations against the current values.
//!
//! Primitive fields are checked directly. A struct, list or unsupported-kind
//! field that carries its own `test` is checked as a whole (normally through
//! a `$(name)` predicate) and its members are not visited; without one, the
//! walk descends as usual.

use crate::annotation::{ConfOptions, FieldDescriptor};
use crate::error::TagfigError;
use crate::expr;
use crate::registry::FunctionRegistry;
use crate::slot::{
    OptionalPrimitiveSlot, OptionalStructSlot, PrimitiveListSlot, PrimitiveSlot, StructListSlot,
    Tagged,
};
use crate::types::Stage;
use crate::value::FieldValue;
use crate::walk::{self, FieldCx, Visitor};

/// Receives test failures that were downgraded to warnings.
pub type WarnFn<'w> = &'w dyn Fn(&TagfigError);

/// The warning sink used when none is configured.
pub fn log_warning(err: &TagfigError) {
    tracing::warn!(error = %err, "test failed");
}

pub(crate) struct TestPass<'a> {
    registry: &'a FunctionRegistry,
    /// Downgrade every failure, as if each field had `testwarn`.
    warn_only: bool,
    warn: WarnFn<'a>,
    pub touched: Vec<String>,
}

impl<'a> TestPass<'a> {
    pub fn new(registry: &'a FunctionRegistry, warn_only: bool, warn: WarnFn<'a>) -> Self {
        Self {
            registry,
            warn_only,
            warn,
            touched: Vec::new(),
        }
    }

    fn check(
        &mut self,
        cx: &FieldCx,
        value: FieldValue<'_>,
        type_name: &str,
    ) -> Result<(), TagfigError> {
        let parsed = expr::parse_for(cx)?;
        match parsed.evaluate(cx, &value, type_name, self.registry) {
            Ok(()) => {
                tracing::debug!(field = %cx.path, test = cx.desc.test, "test passed");
                self.touched.push(cx.path());
                Ok(())
            }
            Err(err) if err.is_test_failure() && (self.warn_only || cx.opts.test_warn()) => {
                (self.warn)(&err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

impl Visitor for TestPass<'_> {
    fn stage(&self) -> Stage {
        Stage::Test
    }

    fn annotated(&self, desc: &FieldDescriptor) -> bool {
        !desc.test.is_empty()
    }

    fn excluded(&self, opts: &ConfOptions<'_>) -> bool {
        opts.test_skip()
    }

    fn primitive(&mut self, cx: &FieldCx, slot: &mut dyn PrimitiveSlot) -> Result<(), TagfigError> {
        if cx.desc.test.is_empty() {
            return Ok(());
        }
        if cx.opts.skip_zero() && slot.is_zero() {
            tracing::trace!(field = %cx.path, "zero value, test skipped");
            return Ok(());
        }
        let value = slot.value();
        self.check(cx, FieldValue::new(Some(&value), slot.as_any()), "primitive")
    }

    fn optional_primitive(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalPrimitiveSlot,
    ) -> Result<(), TagfigError> {
        if cx.desc.test.is_empty() {
            return Ok(());
        }
        if slot.get().is_none() {
            if cx.opts.skip_nil() {
                return Ok(());
            }
            slot.allocate();
        }
        match slot.get_mut() {
            Some(inner) => self.primitive(cx, inner),
            None => Ok(()),
        }
    }

    fn nested(&mut self, cx: &FieldCx, value: &mut dyn Tagged) -> Result<(), TagfigError> {
        if cx.desc.test.is_empty() {
            return walk::walk_struct(self, &cx.path, value);
        }
        self.check(cx, FieldValue::new(None, value.as_any()), value.type_name())
    }

    fn optional_nested(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalStructSlot,
    ) -> Result<(), TagfigError> {
        if slot.get().is_none() {
            if cx.opts.skip_nil() {
                return Ok(());
            }
            slot.allocate();
        }
        if !cx.desc.test.is_empty() {
            return self.check(cx, FieldValue::new(None, slot.as_any()), slot.type_name());
        }
        match slot.get_mut() {
            Some(inner) => walk::walk_struct(self, &cx.path, inner),
            None => Ok(()),
        }
    }

    fn primitive_list(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn PrimitiveListSlot,
    ) -> Result<(), TagfigError> {
        if cx.desc.test.is_empty() {
            return Ok(());
        }
        self.check(cx, FieldValue::new(None, slot.as_any()), "list")
    }

    fn nested_list(&mut self, cx: &FieldCx, slot: &mut dyn StructListSlot) -> Result<(), TagfigError> {
        if cx.desc.test.is_empty() {
            return walk::walk_list(self, &cx.path, slot);
        }
        self.check(cx, FieldValue::new(None, slot.as_any()), slot.type_name())
    }

    fn unsupported(
        &mut self,
        cx: &FieldCx,
        value: &dyn std::any::Any,
        type_name: &'static str,
    ) -> Result<(), TagfigError> {
        if cx.desc.test.is_empty() {
            return Ok(());
        }
        self.check(cx, FieldValue::new(None, value), type_name)
    }
}
