//! Coercion and assignment helpers shared by the substitution passes.

use crate::error::TagfigError;
use crate::registry::FunctionRegistry;
use crate::slot::{PrimitiveListSlot, PrimitiveSlot};
use crate::value::DefaultValue;
use crate::walk::FieldCx;

/// Parse `raw` into the slot's kind and store it.
pub(crate) fn assign_raw(
    cx: &FieldCx,
    slot: &mut dyn PrimitiveSlot,
    raw: &str,
) -> Result<(), TagfigError> {
    slot.set_raw(raw).map_err(|e| e.at(cx.path()))
}

/// Replace the list with the comma-separated elements of `raw`. Tokens are
/// not trimmed; an empty `raw` leaves the list empty.
pub(crate) fn assign_csv(
    cx: &FieldCx,
    list: &mut dyn PrimitiveListSlot,
    raw: &str,
) -> Result<(), TagfigError> {
    list.clear();
    if raw.is_empty() {
        return Ok(());
    }
    for token in raw.split(',') {
        list.push_raw(token).map_err(|e| e.at(cx.path()))?;
    }
    Ok(())
}

/// Invoke the default function `name` for the field.
pub(crate) fn call_default(
    registry: &FunctionRegistry,
    cx: &FieldCx,
    name: &str,
) -> Result<DefaultValue, TagfigError> {
    let f = registry
        .default_func(name)
        .ok_or_else(|| TagfigError::UnknownFunction {
            path: cx.path(),
            name: name.to_string(),
            registry: "default",
        })?;
    tracing::debug!(field = %cx.path, func = name, "calling default func");
    Ok(f(cx.desc.name))
}

/// Store a function-provided default into a primitive.
pub(crate) fn assign_default(
    cx: &FieldCx,
    name: &str,
    slot: &mut dyn PrimitiveSlot,
    value: DefaultValue,
) -> Result<(), TagfigError> {
    match value {
        DefaultValue::Primitive(v) if slot.set_value(&v) => Ok(()),
        _ => Err(mismatch(cx, name)),
    }
}

pub(crate) fn mismatch(cx: &FieldCx, name: &str) -> TagfigError {
    TagfigError::DefaultFuncTypeMismatch {
        path: cx.path(),
        name: name.to_string(),
    }
}
