//! Primitive kinds and the values that move between sources and fields.

use std::any::Any;
use std::fmt;

/// The closed set of leaf kinds the engine can coerce into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Str,
    Int,
    Uint,
    Float,
    Bool,
}

impl PrimitiveKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Uint | Self::Float)
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Str => "string",
            Self::Int => "integer",
            Self::Uint => "unsigned integer",
            Self::Float => "float",
            Self::Bool => "bool",
        })
    }
}

/// A primitive value, widened to the largest representation of its kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Str(_) => PrimitiveKind::Str,
            Self::Int(_) => PrimitiveKind::Int,
            Self::Uint(_) => PrimitiveKind::Uint,
            Self::Float(_) => PrimitiveKind::Float,
            Self::Bool(_) => PrimitiveKind::Bool,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::Int(i) => *i == 0,
            Self::Uint(u) => *u == 0,
            Self::Float(f) => *f == 0.0,
            Self::Bool(b) => !b,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Self::Uint(u)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// What a registered default function returns.
///
/// Primitive fields (and `Option`s of them) accept the matching primitive
/// variant. Optional structs and lists take the whole replacement through
/// [`Boxed`](Self::Boxed): the box must hold exactly the field's type (or,
/// for an `Option<T>` field, a `T`).
pub enum DefaultValue {
    Primitive(Value),
    Boxed(Box<dyn Any + Send>),
}

impl DefaultValue {
    pub fn boxed<T: Any + Send>(value: T) -> Self {
        Self::Boxed(Box::new(value))
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(v) => f.debug_tuple("Primitive").field(v).finish(),
            Self::Boxed(_) => f.write_str("Boxed(..)"),
        }
    }
}

macro_rules! default_from {
    ($($t:ty),*) => {$(
        impl From<$t> for DefaultValue {
            fn from(value: $t) -> Self {
                Self::Primitive(value.into())
            }
        }
    )*};
}

default_from!(Value, &str, String, i64, u64, f64, bool);

/// The current value of a field, handed to test predicates.
///
/// Primitive fields expose their widened [`Value`]; every field, primitive or
/// not, can be downcast to its concrete Rust type.
#[derive(Clone, Copy)]
pub struct FieldValue<'a> {
    primitive: Option<&'a Value>,
    raw: &'a dyn Any,
}

impl<'a> FieldValue<'a> {
    pub(crate) fn new(primitive: Option<&'a Value>, raw: &'a dyn Any) -> Self {
        Self { primitive, raw }
    }

    pub fn primitive(&self) -> Option<&'a Value> {
        self.primitive
    }

    pub fn as_str(&self) -> Option<&'a str> {
        self.primitive.and_then(Value::as_str)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.primitive? {
            Value::Int(i) => Some(*i),
            Value::Uint(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.primitive? {
            Value::Uint(u) => Some(*u),
            Value::Int(i) => u64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.primitive? {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.primitive? {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The field as `T`. An `Option<T>` field holding `Some` also matches.
    pub fn downcast_ref<T: Any>(&self) -> Option<&'a T> {
        self.raw.downcast_ref::<T>().or_else(|| {
            self.raw
                .downcast_ref::<Option<T>>()
                .and_then(Option::as_ref)
        })
    }
}

impl fmt::Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldValue")
            .field("primitive", &self.primitive)
            .finish_non_exhaustive()
    }
}
