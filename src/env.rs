//! Environment pass: override fields from `env` annotations.
//!
//! Works from a snapshot (`HashMap<String, String>`) so tests can pass
//! synthetic data instead of the process environment. A present variable
//! always wins over the field's current value, except under `backupenv`
//! where it only fills a zero value. `Vec` fields read the variable as a
//! comma-separated list.

use std::collections::HashMap;

use crate::annotation::{ConfOptions, FieldDescriptor};
use crate::binder;
use crate::error::TagfigError;
use crate::slot::{
    OptionalPrimitiveSlot, OptionalStructSlot, PrimitiveListSlot, PrimitiveSlot, StructListSlot,
    Tagged,
};
use crate::types::Stage;
use crate::walk::{self, FieldCx, Visitor};

/// Snapshot of the process environment. Variables whose name or value is
/// not valid UTF-8 are left out.
pub fn snapshot() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

pub(crate) struct EnvPass<'e> {
    vars: &'e HashMap<String, String>,
    /// Every missing variable is an error, not just `mustenv` ones.
    strict: bool,
    pub touched: Vec<String>,
}

impl<'e> EnvPass<'e> {
    pub fn new(vars: &'e HashMap<String, String>, strict: bool) -> Self {
        Self {
            vars,
            strict,
            touched: Vec::new(),
        }
    }

    fn lookup(&self, cx: &FieldCx) -> Result<Option<&'e str>, TagfigError> {
        let name = cx.desc.env.trim();
        match self.vars.get(name) {
            Some(value) => Ok(Some(value.as_str())),
            None if self.strict || cx.opts.must_env() => Err(TagfigError::EnvVarMissing {
                path: cx.path(),
                name: name.to_string(),
            }),
            None => {
                tracing::trace!(field = %cx.path, var = name, "env var not set");
                Ok(None)
            }
        }
    }

    fn touch(&mut self, cx: &FieldCx) {
        tracing::debug!(field = %cx.path, var = cx.desc.env, "env applied");
        self.touched.push(cx.path());
    }
}

impl Visitor for EnvPass<'_> {
    fn stage(&self) -> Stage {
        Stage::Env
    }

    fn annotated(&self, desc: &FieldDescriptor) -> bool {
        !desc.env.is_empty()
    }

    fn excluded(&self, opts: &ConfOptions<'_>) -> bool {
        opts.env_skip()
    }

    fn primitive(&mut self, cx: &FieldCx, slot: &mut dyn PrimitiveSlot) -> Result<(), TagfigError> {
        if cx.desc.env.is_empty() {
            return Ok(());
        }
        let Some(raw) = self.lookup(cx)? else {
            return Ok(());
        };
        if cx.opts.backup_env() && !slot.is_zero() {
            return Ok(());
        }
        binder::assign_raw(cx, slot, raw)?;
        self.touch(cx);
        Ok(())
    }

    fn optional_primitive(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalPrimitiveSlot,
    ) -> Result<(), TagfigError> {
        if cx.desc.env.is_empty() {
            return Ok(());
        }
        if slot.get().is_none() && cx.opts.skip_nil() {
            return Ok(());
        }
        let Some(raw) = self.lookup(cx)? else {
            return Ok(());
        };
        let inner = slot.allocate();
        if cx.opts.backup_env() && !inner.is_zero() {
            return Ok(());
        }
        binder::assign_raw(cx, inner, raw)?;
        self.touch(cx);
        Ok(())
    }

    fn nested(&mut self, cx: &FieldCx, value: &mut dyn Tagged) -> Result<(), TagfigError> {
        if !cx.desc.env.is_empty() {
            return Err(cx.unsupported(Stage::Env, value.type_name()));
        }
        walk::walk_struct(self, &cx.path, value)
    }

    fn optional_nested(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalStructSlot,
    ) -> Result<(), TagfigError> {
        if !cx.desc.env.is_empty() {
            return Err(cx.unsupported(Stage::Env, slot.type_name()));
        }
        if slot.get().is_none() {
            if cx.opts.skip_nil() {
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
        if cx.desc.env.is_empty() {
            return Ok(());
        }
        let Some(raw) = self.lookup(cx)? else {
            return Ok(());
        };
        if cx.opts.backup_env() && !slot.is_empty() {
            return Ok(());
        }
        binder::assign_csv(cx, slot, raw)?;
        self.touch(cx);
        Ok(())
    }

    fn nested_list(&mut self, cx: &FieldCx, slot: &mut dyn StructListSlot) -> Result<(), TagfigError> {
        if !cx.desc.env.is_empty() {
            return Err(cx.unsupported(Stage::Env, slot.type_name()));
        }
        walk::walk_list(self, &cx.path, slot)
    }
}
