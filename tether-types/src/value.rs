//! The tagged value container carried by options, samples, and parameters.

use crate::error::Status;
use crate::location::Location;
use serde::{Deserialize, Serialize};

/// The type tag of a [`Value`], without its payload.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// A present-but-empty value. Distinct from an absent binding.
    Null,
    /// Boolean.
    Bool,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// UTF-8 string.
    String,
    /// Raw bytes.
    Raw,
    /// Geographic position.
    Location,
}

impl ValueKind {
    /// Whether this kind is one of the eight integer widths.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ValueKind::Int8
                | ValueKind::Int16
                | ValueKind::Int32
                | ValueKind::Int64
                | ValueKind::UInt8
                | ValueKind::UInt16
                | ValueKind::UInt32
                | ValueKind::UInt64
        )
    }

    /// Whether values of this kind take part in numeric coercion.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, ValueKind::Float32 | ValueKind::Float64)
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Int8 => "int8",
            ValueKind::Int16 => "int16",
            ValueKind::Int32 => "int32",
            ValueKind::Int64 => "int64",
            ValueKind::UInt8 => "uint8",
            ValueKind::UInt16 => "uint16",
            ValueKind::UInt32 => "uint32",
            ValueKind::UInt64 => "uint64",
            ValueKind::Float32 => "float32",
            ValueKind::Float64 => "float64",
            ValueKind::String => "string",
            ValueKind::Raw => "raw",
            ValueKind::Location => "location",
        };
        f.write_str(s)
    }
}

/// Whether a typed read may coerce the stored value to the requested kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convert {
    /// The stored kind must match the requested kind exactly.
    Exact,
    /// Numeric kinds may be coerced when the value is exactly representable
    /// in the target.
    Loose,
}

/// A typed value.
///
/// All payloads are owned; borrowing happens at API boundaries through the
/// `&str` / `&[u8]` accessors. `Null` is a present value with no payload;
/// an *absent* value is an `Option<Value>` that is `None`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// A present-but-empty value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 8-bit integer.
    Int8(i8),
    /// Signed 16-bit integer.
    Int16(i16),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 8-bit integer.
    UInt8(u8),
    /// Unsigned 16-bit integer.
    UInt16(u16),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Unsigned 64-bit integer.
    UInt64(u64),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Raw(Vec<u8>),
    /// Geographic position.
    Location(Location),
}

impl Value {
    /// The type tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int8(_) => ValueKind::Int8,
            Value::Int16(_) => ValueKind::Int16,
            Value::Int32(_) => ValueKind::Int32,
            Value::Int64(_) => ValueKind::Int64,
            Value::UInt8(_) => ValueKind::UInt8,
            Value::UInt16(_) => ValueKind::UInt16,
            Value::UInt32(_) => ValueKind::UInt32,
            Value::UInt64(_) => ValueKind::UInt64,
            Value::Float32(_) => ValueKind::Float32,
            Value::Float64(_) => ValueKind::Float64,
            Value::String(_) => ValueKind::String,
            Value::Raw(_) => ValueKind::Raw,
            Value::Location(_) => ValueKind::Location,
        }
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the raw payload, if this is raw bytes.
    pub fn as_raw(&self) -> Option<&[u8]> {
        match self {
            Value::Raw(b) => Some(b),
            _ => None,
        }
    }

    /// The integer payload widened to `i128`, for any integer kind.
    fn as_int(&self) -> Option<i128> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::Int64(v) => Some(v.into()),
            Value::UInt8(v) => Some(v.into()),
            Value::UInt16(v) => Some(v.into()),
            Value::UInt32(v) => Some(v.into()),
            Value::UInt64(v) => Some(v.into()),
            _ => None,
        }
    }

    /// The payload as an `f64` that represents it exactly, for any numeric
    /// kind. Integers too large for 53 bits of mantissa yield `None`.
    fn as_exact_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v.into()),
            Value::Float64(v) => Some(v),
            _ => {
                let int = self.as_int()?;
                let float = int as f64;
                (float as i128 == int).then_some(float)
            }
        }
    }

    /// Coerce this value to `target`, succeeding only when the payload is
    /// exactly representable there.
    ///
    /// Integer↔integer works across widths and signedness when the value
    /// fits; integer↔float works when no precision is lost; `f64`→`f32`
    /// works when the narrowing round-trips. `Bool`, `String`, `Raw`,
    /// `Location`, and `Null` never coerce.
    ///
    /// # Errors
    ///
    /// Returns [`Status::BadRequest`] for any non-representable or
    /// non-numeric conversion.
    pub fn convert(&self, target: ValueKind) -> Result<Value, Status> {
        if self.kind() == target {
            return Ok(self.clone());
        }
        let converted = if target.is_integer() {
            match self.as_int() {
                Some(int) => integer_value(target, int),
                // Float source: exact only when the fractional part is zero
                // and the integral part fits. The i128 cast saturates, which
                // the equality check then rejects.
                None => self.as_exact_f64().and_then(|float| {
                    let int = float as i128;
                    (int as f64 == float).then(|| integer_value(target, int)).flatten()
                }),
            }
        } else {
            match target {
                ValueKind::Float64 => self.as_exact_f64().map(Value::Float64),
                ValueKind::Float32 => self.as_exact_f64().and_then(|float| {
                    let narrowed = float as f32;
                    (f64::from(narrowed) == float).then_some(Value::Float32(narrowed))
                }),
                _ => None,
            }
        };
        converted.ok_or(Status::BadRequest)
    }

    /// Typed extraction with optional coercion.
    ///
    /// # Errors
    ///
    /// Returns [`Status::BadRequest`] when the stored kind differs from
    /// `T::KIND` and either `convert` is [`Convert::Exact`] or the value is
    /// not exactly representable as `T`.
    pub fn extract<T: FromValue>(&self, convert: Convert) -> Result<T, Status> {
        if self.kind() == T::KIND {
            return T::from_value(self).ok_or(Status::BadRequest);
        }
        match convert {
            Convert::Exact => Err(Status::BadRequest),
            Convert::Loose => {
                let coerced = self.convert(T::KIND)?;
                T::from_value(&coerced).ok_or(Status::BadRequest)
            }
        }
    }
}

/// Build an integer [`Value`] of the requested width, when `int` fits.
fn integer_value(kind: ValueKind, int: i128) -> Option<Value> {
    match kind {
        ValueKind::Int8 => i8::try_from(int).ok().map(Value::Int8),
        ValueKind::Int16 => i16::try_from(int).ok().map(Value::Int16),
        ValueKind::Int32 => i32::try_from(int).ok().map(Value::Int32),
        ValueKind::Int64 => i64::try_from(int).ok().map(Value::Int64),
        ValueKind::UInt8 => u8::try_from(int).ok().map(Value::UInt8),
        ValueKind::UInt16 => u16::try_from(int).ok().map(Value::UInt16),
        ValueKind::UInt32 => u32::try_from(int).ok().map(Value::UInt32),
        ValueKind::UInt64 => u64::try_from(int).ok().map(Value::UInt64),
        _ => None,
    }
}

/// Typed extraction from a [`Value`].
///
/// Implemented for every scalar plus `String`, `Vec<u8>`, and
/// [`Location`]. `from_value` matches the exact variant only; coercion is
/// [`Value::convert`]'s job.
pub trait FromValue: Sized {
    /// The kind this type extracts from.
    const KIND: ValueKind;

    /// Extract from the matching variant.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($ty:ty, $kind:ident) => {
        impl FromValue for $ty {
            const KIND: ValueKind = ValueKind::$kind;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$kind(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Value {
                Value::$kind(v)
            }
        }
    };
}

impl_from_value!(bool, Bool);
impl_from_value!(i8, Int8);
impl_from_value!(i16, Int16);
impl_from_value!(i32, Int32);
impl_from_value!(i64, Int64);
impl_from_value!(u8, UInt8);
impl_from_value!(u16, UInt16);
impl_from_value!(u32, UInt32);
impl_from_value!(u64, UInt64);
impl_from_value!(f32, Float32);
impl_from_value!(f64, Float64);
impl_from_value!(String, String);
impl_from_value!(Vec<u8>, Raw);
impl_from_value!(Location, Location);

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(v.to_owned())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Value {
        Value::Raw(v.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Value::Null.kind(), ValueKind::Null);
        assert_eq!(Value::from(true).kind(), ValueKind::Bool);
        assert_eq!(Value::from(1u16).kind(), ValueKind::UInt16);
        assert_eq!(Value::from("x").kind(), ValueKind::String);
    }

    #[test]
    fn exact_extraction_returns_the_stored_value() {
        let v = Value::from(-42i32);
        assert_eq!(v.extract::<i32>(Convert::Exact), Ok(-42));
        assert_eq!(v.extract::<i64>(Convert::Exact), Err(Status::BadRequest));
    }

    #[test]
    fn loose_extraction_coerces_representable_integers() {
        let v = Value::from(42u8);
        assert_eq!(v.extract::<i64>(Convert::Loose), Ok(42i64));
        assert_eq!(v.extract::<u64>(Convert::Loose), Ok(42u64));
        assert_eq!(v.extract::<i8>(Convert::Loose), Ok(42i8));
    }

    #[test]
    fn unrepresentable_integers_are_rejected() {
        assert_eq!(Value::from(300u16).extract::<u8>(Convert::Loose), Err(Status::BadRequest));
        assert_eq!(Value::from(-1i8).extract::<u64>(Convert::Loose), Err(Status::BadRequest));
    }

    #[test]
    fn integer_float_coercion_is_lossless_only() {
        assert_eq!(Value::from(23i32).extract::<f32>(Convert::Loose), Ok(23.0f32));
        assert_eq!(Value::from(2.0f64).extract::<i32>(Convert::Loose), Ok(2));
        assert_eq!(Value::from(2.5f64).extract::<i32>(Convert::Loose), Err(Status::BadRequest));
        // 2^53 + 1 is not representable in f64.
        let v = Value::from((1i64 << 53) + 1);
        assert_eq!(v.extract::<f64>(Convert::Loose), Err(Status::BadRequest));
    }

    #[test]
    fn float_narrowing_requires_roundtrip() {
        assert_eq!(Value::from(1.5f64).extract::<f32>(Convert::Loose), Ok(1.5f32));
        assert_eq!(Value::from(0.1f64).extract::<f32>(Convert::Loose), Err(Status::BadRequest));
        assert_eq!(Value::from(1.5f32).extract::<f64>(Convert::Loose), Ok(1.5f64));
    }

    #[test]
    fn non_numeric_kinds_never_coerce() {
        assert_eq!(Value::from(true).extract::<i32>(Convert::Loose), Err(Status::BadRequest));
        assert_eq!(Value::from("1").extract::<i32>(Convert::Loose), Err(Status::BadRequest));
        assert_eq!(Value::Null.extract::<bool>(Convert::Loose), Err(Status::BadRequest));
        assert_eq!(
            Value::from(vec![1u8]).extract::<String>(Convert::Loose),
            Err(Status::BadRequest)
        );
    }

    #[test]
    fn null_is_present_but_empty() {
        assert!(Value::Null.is_null());
        assert!(!Value::from(0i32).is_null());
    }

    #[test]
    fn string_and_raw_accessors_borrow() {
        let v = Value::from("hello");
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_raw(), None);
        let v = Value::from(&b"\x01\x02"[..]);
        assert_eq!(v.as_raw(), Some(&b"\x01\x02"[..]));
    }

    #[test]
    fn serde_roundtrip() {
        let v = Value::from(23.5f32);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }
}
