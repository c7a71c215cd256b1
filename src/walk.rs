//! The recursive walker shared by every pass.
//!
//! [`walk_struct`] owns the parts that are identical across passes: field
//! order, `skip` handling, the private-field guard and dispatch on the slot
//! shape. A pass implements [`Visitor`] and overrides only the shapes it acts
//! on; the default methods recurse into present structs and list elements and
//! leave everything else alone.

use std::any::Any;

use crate::annotation::{ConfOptions, FieldDescriptor};
use crate::error::TagfigError;
use crate::path::FieldPath;
use crate::slot::{
    OptionalPrimitiveSlot, OptionalStructSlot, PrimitiveListSlot, PrimitiveSlot, Slot,
    StructListSlot, Tagged,
};
use crate::types::Stage;

/// Everything a visitor knows about the field in hand.
pub(crate) struct FieldCx {
    pub path: FieldPath,
    pub desc: &'static FieldDescriptor,
    pub opts: ConfOptions<'static>,
}

impl FieldCx {
    pub fn path(&self) -> String {
        self.path.to_string()
    }

    pub fn unsupported(&self, stage: Stage, type_name: &'static str) -> TagfigError {
        TagfigError::UnsupportedFieldKind {
            path: self.path(),
            type_name,
            stage,
        }
    }
}

pub(crate) trait Visitor {
    fn stage(&self) -> Stage;

    /// Whether the field carries an annotation this pass acts on.
    fn annotated(&self, desc: &FieldDescriptor) -> bool;

    /// Pass-specific opt-out such as `envskip`.
    fn excluded(&self, _opts: &ConfOptions<'_>) -> bool {
        false
    }

    /// Runs for every visited field before dispatch.
    fn inspect(&mut self, _cx: &FieldCx) -> Result<(), TagfigError> {
        Ok(())
    }

    fn primitive(&mut self, _cx: &FieldCx, _slot: &mut dyn PrimitiveSlot) -> Result<(), TagfigError> {
        Ok(())
    }

    fn optional_primitive(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalPrimitiveSlot,
    ) -> Result<(), TagfigError> {
        match slot.get_mut() {
            Some(inner) => self.primitive(cx, inner),
            None => Ok(()),
        }
    }

    fn nested(&mut self, cx: &FieldCx, value: &mut dyn Tagged) -> Result<(), TagfigError> {
        walk_struct(self, &cx.path, value)
    }

    fn optional_nested(
        &mut self,
        cx: &FieldCx,
        slot: &mut dyn OptionalStructSlot,
    ) -> Result<(), TagfigError> {
        match slot.get_mut() {
            Some(inner) => walk_struct(self, &cx.path, inner),
            None => Ok(()),
        }
    }

    fn primitive_list(
        &mut self,
        _cx: &FieldCx,
        _slot: &mut dyn PrimitiveListSlot,
    ) -> Result<(), TagfigError> {
        Ok(())
    }

    fn nested_list(&mut self, cx: &FieldCx, slot: &mut dyn StructListSlot) -> Result<(), TagfigError> {
        walk_list(self, &cx.path, slot)
    }

    fn unsupported(
        &mut self,
        cx: &FieldCx,
        _value: &dyn Any,
        type_name: &'static str,
    ) -> Result<(), TagfigError> {
        if self.annotated(cx.desc) {
            return Err(cx.unsupported(self.stage(), type_name));
        }
        Ok(())
    }
}

/// Visit every field of `target` once, in declaration order.
pub(crate) fn walk_struct<V: Visitor + ?Sized>(
    visitor: &mut V,
    path: &FieldPath,
    target: &mut dyn Tagged,
) -> Result<(), TagfigError> {
    for field in target.fields() {
        let desc = field.descriptor;
        let opts = desc.conf();
        if opts.skip() || visitor.excluded(&opts) {
            tracing::trace!(stage = %visitor.stage(), field = desc.name, "skipped");
            continue;
        }

        let cx = FieldCx {
            path: path.field(desc.name),
            desc,
            opts,
        };

        if !desc.exported {
            // any annotation counts, not just this pass's, so a private
            // field is caught even when its own stage never runs
            let stage = if visitor.annotated(desc) {
                Some(visitor.stage())
            } else {
                desc.annotated_stage()
            };
            if let Some(stage) = stage {
                return Err(TagfigError::UnexportedFieldTagged {
                    path: cx.path(),
                    stage,
                });
            }
            continue;
        }

        visitor.inspect(&cx)?;
        match field.slot {
            Slot::Primitive(slot) => visitor.primitive(&cx, slot)?,
            Slot::OptionalPrimitive(slot) => visitor.optional_primitive(&cx, slot)?,
            Slot::Struct(value) => visitor.nested(&cx, value)?,
            Slot::OptionalStruct(slot) => visitor.optional_nested(&cx, slot)?,
            Slot::PrimitiveList(slot) => visitor.primitive_list(&cx, slot)?,
            Slot::StructList(slot) => visitor.nested_list(&cx, slot)?,
            Slot::Unsupported { value, type_name } => visitor.unsupported(&cx, value, type_name)?,
        }
    }
    Ok(())
}

/// Recurse into every element, suffixing the path with `[i]`.
pub(crate) fn walk_list<V: Visitor + ?Sized>(
    visitor: &mut V,
    path: &FieldPath,
    list: &mut dyn StructListSlot,
) -> Result<(), TagfigError> {
    for i in 0..list.len() {
        if let Some(element) = list.element_mut(i) {
            walk_struct(visitor, &path.index(i), element)?;
        }
    }
    Ok(())
}
