//! Default pass: fill zero-valued fields from `default` annotations.
//!
//! A default never overwrites: primitives are assigned only while they hold
//! their zero value, lists only while empty, optional fields only while
//! `None`. A `None` optional primitive is allocated only when it has a
//! default; a `None` optional struct is always allocated (and recursed into)
//! unless `skipnil` asks otherwise, or a `$(func)` default supplies the
//! whole struct.

use crate::annotation::{ConfOptions, FieldDescriptor, Source};
use crate::binder;
use crate::error::TagfigError;
use crate::registry::FunctionRegistry;
use crate::slot::{
    OptionalPrimitiveSlot, OptionalStructSlot, PrimitiveListSlot, PrimitiveSlot, StructListSlot,
    Tagged,
};
use crate::types::Stage;
use crate::value::DefaultValue;
use crate::walk::{self, FieldCx, Visitor};

pub(crate) struct DefaultPass<'r> {
    registry: &'r FunctionRegistry,
    pub touched: Vec<String>,
}

impl<'r> DefaultPass<'r> {
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Self {
            registry,
            touched: Vec::new(),
        }
    }

    fn touch(&mut self, cx: &FieldCx) {
        tracing::debug!(field = %cx.path, "default applied");
        self.touched.push(cx.path());
    }

    fn call(&self, cx: &FieldCx, name: &str) -> Result<DefaultValue, TagfigError> {
        binder::call_default(self.registry, cx, name)
    }

    /// `skipnil` without `nildefault` leaves a `None` field alone.
    fn leave_nil(cx: &FieldCx) -> bool {
        cx.opts.skip_nil() && !cx.opts.nil_default()
    }
}

impl Visitor for DefaultPass<'_> {
    fn stage(&self) -> Stage {
        Stage::Defaults
    }

    fn annotated(&self, desc: &FieldDescriptor) -> bool {
        !desc.default.is_empty()
    }

    fn excluded(&self, opts: &ConfOptions<'_>) -> bool {
        opts.default_skip()
    }

    fn inspect(&mut self, cx: &FieldCx) -> Result<(), TagfigError> {
        if cx.opts.skip_zero() && !cx.desc.default.is_empty() {
            return Err(TagfigError::SkipZeroWithDefault { path: cx.path() });
        }
        Ok(())
    }

    fn primitive(&mut self, cx: &FieldCx, slot: &mut dyn PrimitiveSlot) -> Result<(), TagfigError> {
        if cx.desc.default.is_empty() || !slot.is_zero() {
            return Ok(());
        }
        match Source::parse(cx.desc.default) {
            Source::Literal(raw) => binder::assign_raw(cx, slot, raw)?,
            Source::Func(name) => {
                let value = self.call(cx, name)?;
                binder::assign_default(cx, name, slot, value)?;
            }
        }
        self.touch(cx);
        Ok(())
    }

    fn optional_primitive(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalPrimitiveSlot,
    ) -> Result<(), TagfigError> {
        if let Some(inner) = slot.get_mut() {
            return self.primitive(cx, inner);
        }
        if cx.desc.default.is_empty() || Self::leave_nil(cx) {
            return Ok(());
        }
        match Source::parse(cx.desc.default) {
            Source::Literal(_) => self.primitive(cx, slot.allocate()),
            Source::Func(name) => {
                match self.call(cx, name)? {
                    DefaultValue::Boxed(boxed) => slot
                        .replace_boxed(boxed)
                        .map_err(|_| binder::mismatch(cx, name))?,
                    value => binder::assign_default(cx, name, slot.allocate(), value)?,
                }
                self.touch(cx);
                Ok(())
            }
        }
    }

    fn nested(&mut self, cx: &FieldCx, value: &mut dyn Tagged) -> Result<(), TagfigError> {
        if !cx.desc.default.is_empty() {
            return Err(cx.unsupported(Stage::Defaults, value.type_name()));
        }
        walk::walk_struct(self, &cx.path, value)
    }

    fn optional_nested(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalStructSlot,
    ) -> Result<(), TagfigError> {
        let source = match cx.desc.default {
            "" => None,
            raw => Some(Source::parse(raw)),
        };
        if let Some(Source::Literal(_)) = source {
            return Err(cx.unsupported(Stage::Defaults, slot.type_name()));
        }

        if slot.get().is_none() {
            if Self::leave_nil(cx) {
                return Ok(());
            }
            if let Some(Source::Func(name)) = source {
                let boxed = match self.call(cx, name)? {
                    DefaultValue::Boxed(boxed) => boxed,
                    DefaultValue::Primitive(_) => return Err(binder::mismatch(cx, name)),
                };
                slot.replace_boxed(boxed)
                    .map_err(|_| binder::mismatch(cx, name))?;
                self.touch(cx);
                return Ok(());
            }
            slot.allocate();
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
        if cx.desc.default.is_empty() || !slot.is_empty() {
            return Ok(());
        }
        match Source::parse(cx.desc.default) {
            Source::Literal(raw) => binder::assign_csv(cx, slot, raw)?,
            Source::Func(name) => match self.call(cx, name)? {
                DefaultValue::Boxed(boxed) => slot
                    .replace_boxed(boxed)
                    .map_err(|_| binder::mismatch(cx, name))?,
                DefaultValue::Primitive(_) => return Err(binder::mismatch(cx, name)),
            },
        }
        self.touch(cx);
        Ok(())
    }

    fn nested_list(&mut self, cx: &FieldCx, slot: &mut dyn StructListSlot) -> Result<(), TagfigError> {
        let source = match cx.desc.default {
            "" => None,
            raw => Some(Source::parse(raw)),
        };
        match source {
            Some(Source::Literal(_)) => Err(cx.unsupported(Stage::Defaults, slot.type_name())),
            Some(Source::Func(name)) if slot.is_empty() => {
                let boxed = match self.call(cx, name)? {
                    DefaultValue::Boxed(boxed) => boxed,
                    DefaultValue::Primitive(_) => return Err(binder::mismatch(cx, name)),
                };
                slot.replace_boxed(boxed)
                    .map_err(|_| binder::mismatch(cx, name))?;
                self.touch(cx);
                Ok(())
            }
            _ => walk::walk_list(self, &cx.path, slot),
        }
    }
}
