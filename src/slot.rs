//! The run-time view of a config struct.
//!
//! A [`Tagged`] type lists its fields as [`Field`]s: the static
//! [`FieldDescriptor`] plus a [`Slot`], a mutable handle typed by the field's
//! shape. Passes never see concrete Rust types; they work through the slot
//! traits below, which are implemented once for every primitive, `Option`,
//! `Vec` and `Box` combination the engine supports.
//!
//! `#[derive(Tagged)]` writes the [`Tagged`] impl. Writing one by hand is
//! possible and occasionally useful in tests:
//!
//! ```
//! use std::any::Any;
//! use tagfig::{Field, FieldDescriptor, Slot, Tagged};
//!
//! #[derive(Default)]
//! struct Server {
//!     port: u16,
//! }
//!
//! static SERVER_FIELDS: [FieldDescriptor; 1] = [FieldDescriptor {
//!     default: "8080",
//!     ..FieldDescriptor::bare("port", true)
//! }];
//!
//! impl Tagged for Server {
//!     fn fields(&mut self) -> Vec<Field<'_>> {
//!         vec![Field::new(&SERVER_FIELDS[0], Slot::primitive(&mut self.port))]
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//! ```

use std::any::Any;
use std::fmt::Debug;

use crate::annotation::FieldDescriptor;
use crate::error::CoerceError;
use crate::value::{PrimitiveKind, Value};

/// A struct the engine can walk.
pub trait Tagged: Any {
    /// Every field in declaration order.
    fn fields(&mut self) -> Vec<Field<'_>>;

    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T: Tagged> Tagged for Box<T> {
    fn fields(&mut self) -> Vec<Field<'_>> {
        (**self).fields()
    }

    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }

    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }
}

pub struct Field<'a> {
    pub descriptor: &'static FieldDescriptor,
    pub slot: Slot<'a>,
}

impl<'a> Field<'a> {
    pub fn new(descriptor: &'static FieldDescriptor, slot: Slot<'a>) -> Self {
        Self { descriptor, slot }
    }
}

/// Mutable access to one field, by shape.
pub enum Slot<'a> {
    Primitive(&'a mut dyn PrimitiveSlot),
    /// `Option<P>`: a nilable primitive.
    OptionalPrimitive(&'a mut dyn OptionalPrimitiveSlot),
    /// A nested struct, always present.
    Struct(&'a mut dyn Tagged),
    /// `Option<S>` / `Option<Box<S>>`: a nilable struct.
    OptionalStruct(&'a mut dyn OptionalStructSlot),
    PrimitiveList(&'a mut dyn PrimitiveListSlot),
    StructList(&'a mut dyn StructListSlot),
    /// Anything else. Ignored unless annotated.
    Unsupported {
        value: &'a dyn Any,
        type_name: &'static str,
    },
}

impl<'a> Slot<'a> {
    pub fn primitive<T: Primitive>(value: &'a mut T) -> Self {
        Slot::Primitive(value)
    }

    pub fn optional_primitive<T: Primitive>(value: &'a mut Option<T>) -> Self {
        Slot::OptionalPrimitive(value)
    }

    pub fn nested<T: Tagged>(value: &'a mut T) -> Self {
        Slot::Struct(value)
    }

    pub fn optional_nested<T: Tagged + Default>(value: &'a mut Option<T>) -> Self {
        Slot::OptionalStruct(value)
    }

    pub fn primitive_list<T: Primitive>(value: &'a mut Vec<T>) -> Self {
        Slot::PrimitiveList(value)
    }

    pub fn nested_list<T: Tagged>(value: &'a mut Vec<T>) -> Self {
        Slot::StructList(value)
    }

    pub fn unsupported<T: Any>(value: &'a mut T) -> Self {
        Slot::Unsupported {
            value,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Short shape name used in errors and logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Slot::Primitive(_) | Slot::OptionalPrimitive(_) => "primitive",
            Slot::Struct(s) => s.type_name(),
            Slot::OptionalStruct(s) => s.type_name(),
            Slot::PrimitiveList(_) => "list",
            Slot::StructList(s) => s.type_name(),
            Slot::Unsupported { type_name, .. } => type_name,
        }
    }
}

/// A leaf type the engine can coerce into.
pub trait Primitive: Any + Clone + Default + PartialEq + Debug + Send {
    const KIND: PrimitiveKind;

    fn from_raw(raw: &str) -> Result<Self, CoerceError>;

    /// Narrow a widened value. `None` when the kind differs or the number
    /// does not fit.
    fn from_value(value: &Value) -> Option<Self>;

    fn to_value(&self) -> Value;
}

macro_rules! signed {
    ($($t:ty),*) => {$(
        impl Primitive for $t {
            const KIND: PrimitiveKind = PrimitiveKind::Int;

            fn from_raw(raw: &str) -> Result<Self, CoerceError> {
                raw.parse()
                    .map_err(|_| CoerceError::NotANumber(raw.to_string()))
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Int(i) => <$t>::try_from(*i).ok(),
                    Value::Uint(u) => <$t>::try_from(*u).ok(),
                    _ => None,
                }
            }

            fn to_value(&self) -> Value {
                Value::Int(*self as i64)
            }
        }
    )*};
}

macro_rules! unsigned {
    ($($t:ty),*) => {$(
        impl Primitive for $t {
            const KIND: PrimitiveKind = PrimitiveKind::Uint;

            fn from_raw(raw: &str) -> Result<Self, CoerceError> {
                raw.parse()
                    .map_err(|_| CoerceError::NotANumber(raw.to_string()))
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Uint(u) => <$t>::try_from(*u).ok(),
                    Value::Int(i) => <$t>::try_from(*i).ok(),
                    _ => None,
                }
            }

            fn to_value(&self) -> Value {
                Value::Uint(*self as u64)
            }
        }
    )*};
}

macro_rules! float {
    ($($t:ty),*) => {$(
        impl Primitive for $t {
            const KIND: PrimitiveKind = PrimitiveKind::Float;

            fn from_raw(raw: &str) -> Result<Self, CoerceError> {
                raw.parse()
                    .map_err(|_| CoerceError::NotANumber(raw.to_string()))
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::Float(x) => Some(*x as $t),
                    _ => None,
                }
            }

            fn to_value(&self) -> Value {
                Value::Float(*self as f64)
            }
        }
    )*};
}

signed!(i8, i16, i32, i64, isize);
unsigned!(u8, u16, u32, u64, usize);
float!(f32, f64);

impl Primitive for String {
    const KIND: PrimitiveKind = PrimitiveKind::Str;

    fn from_raw(raw: &str) -> Result<Self, CoerceError> {
        Ok(raw.to_string())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }

    fn to_value(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl Primitive for bool {
    const KIND: PrimitiveKind = PrimitiveKind::Bool;

    /// Anything but empty, `0` or `false` is true.
    fn from_raw(raw: &str) -> Result<Self, CoerceError> {
        Ok(!matches!(raw, "" | "0" | "false"))
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

pub trait PrimitiveSlot {
    fn kind(&self) -> PrimitiveKind;
    fn is_zero(&self) -> bool;
    fn value(&self) -> Value;
    fn set_raw(&mut self, raw: &str) -> Result<(), CoerceError>;
    /// Returns `false` when the value's kind or range doesn't fit.
    fn set_value(&mut self, value: &Value) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Primitive> PrimitiveSlot for T {
    fn kind(&self) -> PrimitiveKind {
        T::KIND
    }

    fn is_zero(&self) -> bool {
        *self == T::default()
    }

    fn value(&self) -> Value {
        self.to_value()
    }

    fn set_raw(&mut self, raw: &str) -> Result<(), CoerceError> {
        *self = T::from_raw(raw)?;
        Ok(())
    }

    fn set_value(&mut self, value: &Value) -> bool {
        match T::from_value(value) {
            Some(v) => {
                *self = v;
                true
            }
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub trait OptionalPrimitiveSlot {
    fn kind(&self) -> PrimitiveKind;
    fn get(&self) -> Option<&dyn PrimitiveSlot>;
    fn get_mut(&mut self) -> Option<&mut dyn PrimitiveSlot>;
    /// Set to `Some(zero)` if `None`, then hand out the inner value.
    fn allocate(&mut self) -> &mut dyn PrimitiveSlot;
    /// Accepts a boxed `P` or `Option<P>`; gives the box back otherwise.
    fn replace_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Primitive> OptionalPrimitiveSlot for Option<T> {
    fn kind(&self) -> PrimitiveKind {
        T::KIND
    }

    fn get(&self) -> Option<&dyn PrimitiveSlot> {
        self.as_ref().map(|v| v as &dyn PrimitiveSlot)
    }

    fn get_mut(&mut self) -> Option<&mut dyn PrimitiveSlot> {
        self.as_mut().map(|v| v as &mut dyn PrimitiveSlot)
    }

    fn allocate(&mut self) -> &mut dyn PrimitiveSlot {
        self.get_or_insert_with(T::default)
    }

    fn replace_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>> {
        let value = match value.downcast::<T>() {
            Ok(v) => {
                *self = Some(*v);
                return Ok(());
            }
            Err(value) => value,
        };
        *self = *value.downcast::<Option<T>>()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub trait OptionalStructSlot {
    fn get(&self) -> Option<&dyn Tagged>;
    fn get_mut(&mut self) -> Option<&mut dyn Tagged>;
    fn allocate(&mut self) -> &mut dyn Tagged;
    /// Accepts a boxed `S` or `Option<S>`; gives the box back otherwise.
    fn replace_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>>;
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Tagged + Default> OptionalStructSlot for Option<T> {
    fn get(&self) -> Option<&dyn Tagged> {
        self.as_ref().map(|v| v as &dyn Tagged)
    }

    fn get_mut(&mut self) -> Option<&mut dyn Tagged> {
        self.as_mut().map(|v| v as &mut dyn Tagged)
    }

    fn allocate(&mut self) -> &mut dyn Tagged {
        self.get_or_insert_with(T::default)
    }

    fn replace_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>> {
        let value = match value.downcast::<T>() {
            Ok(v) => {
                *self = Some(*v);
                return Ok(());
            }
            Err(value) => value,
        };
        *self = *value.downcast::<Option<T>>()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub trait PrimitiveListSlot {
    fn kind(&self) -> PrimitiveKind;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn values(&self) -> Vec<Value>;
    fn clear(&mut self);
    fn push_raw(&mut self, raw: &str) -> Result<(), CoerceError>;
    /// Accepts a boxed `Vec<P>`; gives the box back otherwise.
    fn replace_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>>;
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Primitive> PrimitiveListSlot for Vec<T> {
    fn kind(&self) -> PrimitiveKind {
        T::KIND
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn values(&self) -> Vec<Value> {
        self.iter().map(Primitive::to_value).collect()
    }

    fn clear(&mut self) {
        Vec::clear(self)
    }

    fn push_raw(&mut self, raw: &str) -> Result<(), CoerceError> {
        self.push(T::from_raw(raw)?);
        Ok(())
    }

    fn replace_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>> {
        *self = *value.downcast::<Vec<T>>()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

pub trait StructListSlot {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn element_mut(&mut self, index: usize) -> Option<&mut dyn Tagged>;
    /// Accepts a boxed `Vec<S>`; gives the box back otherwise.
    fn replace_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>>;
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Tagged> StructListSlot for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn element_mut(&mut self, index: usize) -> Option<&mut dyn Tagged> {
        self.get_mut(index).map(|v| v as &mut dyn Tagged)
    }

    fn replace_boxed(&mut self, value: Box<dyn Any + Send>) -> Result<(), Box<dyn Any + Send>> {
        *self = *value.downcast::<Vec<T>>()?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", true)]
    #[case("yes", true)]
    #[case("False", true)]
    #[case("0", false)]
    #[case("false", false)]
    #[case("", false)]
    fn bool_coercion_is_permissive(#[case] raw: &str, #[case] expected: bool) {
        assert_eq!(bool::from_raw(raw).unwrap(), expected);
    }

    #[test]
    fn integers_reject_garbage() {
        assert_eq!(
            i32::from_raw("12a"),
            Err(CoerceError::NotANumber("12a".into()))
        );
        assert_eq!(u8::from_raw("300"), Err(CoerceError::NotANumber("300".into())));
        assert_eq!(i64::from_raw("-42").unwrap(), -42);
    }

    #[test]
    fn narrowing_checks_range() {
        assert_eq!(u8::from_value(&Value::Int(255)), Some(255));
        assert_eq!(u8::from_value(&Value::Int(256)), None);
        assert_eq!(i16::from_value(&Value::Uint(7)), Some(7));
        assert_eq!(f32::from_value(&Value::Int(1)), None);
        assert_eq!(String::from_value(&Value::Bool(true)), None);
    }

    #[test]
    fn primitive_slot_tracks_zero() {
        let mut port: u16 = 0;
        let slot: &mut dyn PrimitiveSlot = &mut port;
        assert!(slot.is_zero());
        slot.set_raw("8080").unwrap();
        assert!(!slot.is_zero());
        assert_eq!(slot.value(), Value::Uint(8080));
        assert!(!slot.set_value(&Value::Str("x".into())));
        assert_eq!(port, 8080);
    }

    #[test]
    fn optional_primitive_allocates_zero() {
        let mut name: Option<String> = None;
        {
            let slot: &mut dyn OptionalPrimitiveSlot = &mut name;
            assert!(slot.get().is_none());
            assert!(slot.allocate().is_zero());
        }
        assert_eq!(name, Some(String::new()));
    }

    #[test]
    fn optional_primitive_replace_accepts_inner_or_option() {
        let mut count: Option<i32> = None;
        let slot: &mut dyn OptionalPrimitiveSlot = &mut count;
        slot.replace_boxed(Box::new(5i32)).unwrap();
        assert_eq!(slot.get().map(|s| s.value()), Some(Value::Int(5)));
        slot.replace_boxed(Box::new(None::<i32>)).unwrap();
        assert!(slot.get().is_none());
        assert!(slot.replace_boxed(Box::new("x")).is_err());
    }

    #[test]
    fn primitive_list_push_and_replace() {
        let mut ports: Vec<u16> = Vec::new();
        {
            let slot: &mut dyn PrimitiveListSlot = &mut ports;
            slot.push_raw("80").unwrap();
            slot.push_raw("443").unwrap();
            assert!(slot.push_raw("x").is_err());
            assert_eq!(slot.values(), vec![Value::Uint(80), Value::Uint(443)]);
        }
        assert_eq!(ports, vec![80, 443]);

        let slot: &mut dyn PrimitiveListSlot = &mut ports;
        slot.replace_boxed(Box::new(vec![1u16])).unwrap();
        assert!(slot.replace_boxed(Box::new(vec![1u32])).is_err());
        assert_eq!(slot.len(), 1);
    }

    #[test]
    fn unsupported_keeps_type_name() {
        let mut elapsed = std::time::Duration::from_secs(1);
        let slot = Slot::unsupported(&mut elapsed);
        assert!(slot.type_name().contains("Duration"));
    }
}
