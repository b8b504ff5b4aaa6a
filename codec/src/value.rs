//! Slot values and primitive normalization.

use bytestream::{ByteReader, ByteWriter, Number};
use schema::PrimitiveType;

use crate::error::{CodecResult, ValueReason};
use crate::limits::CodecLimits;
use crate::types::NodeId;

/// The content of a field, collection slot or map entry.
///
/// Primitive assignments are normalized against the declared kind, so two
/// values that encode to the same bytes compare equal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    /// A structural child, by arena handle.
    Ref(NodeId),
}

impl Value {
    /// Returns a short name of the value kind for diagnostics.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Ref(_) => "structure",
        }
    }

    /// Returns the child handle if this value is a structure.
    #[must_use]
    pub const fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Ref(node) => Some(*node),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as a signed integer if it is an integer that fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::UInt(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Returns the value as a float for any numeric kind.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::UInt(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<NodeId> for Value {
    fn from(node: NodeId) -> Self {
        Self::Ref(node)
    }
}

/// 2^63, the first float outside the `i64` range.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

const fn is_signed(primitive: PrimitiveType) -> bool {
    matches!(
        primitive,
        PrimitiveType::Int8
            | PrimitiveType::Int16
            | PrimitiveType::Int32
            | PrimitiveType::Int64
            | PrimitiveType::BigInt64
            | PrimitiveType::VarInt
    )
}

/// Checks `value` against `primitive` and returns its canonical form.
///
/// `target` names the slot in diagnostics and is only evaluated on NaN.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn normalize(
    primitive: PrimitiveType,
    value: Value,
    target: &dyn Fn() -> String,
) -> Result<Value, ValueReason> {
    let mismatch = |value: &Value| ValueReason::KindMismatch {
        expected: primitive,
        found: value.kind_name(),
    };
    match primitive {
        PrimitiveType::String => match value {
            Value::String(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PrimitiveType::CString => match value {
            Value::String(ref text) if text.contains('\0') => Err(ValueReason::InteriorNul),
            Value::String(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PrimitiveType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        PrimitiveType::Float32 | PrimitiveType::Float64 => {
            let float = value.as_f64().ok_or_else(|| mismatch(&value))?;
            if float.is_nan() {
                tracing::warn!(slot = %target(), kind = primitive.name(), "NaN assigned to numeric field");
            }
            if primitive == PrimitiveType::Float32 {
                Ok(Value::Float(f64::from(float as f32)))
            } else {
                Ok(Value::Float(float))
            }
        }
        PrimitiveType::Number => match value {
            Value::Int(_) => Ok(value),
            Value::UInt(raw) => Ok(i64::try_from(raw).map_or(Value::UInt(raw), Value::Int)),
            Value::Float(float) if float.is_nan() => {
                tracing::warn!(slot = %target(), kind = primitive.name(), "NaN assigned to numeric field");
                Ok(value)
            }
            Value::Float(float) => {
                if float.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&float) {
                    Ok(Value::Int(float as i64))
                } else {
                    Ok(value)
                }
            }
            other => Err(mismatch(&other)),
        },
        _ => {
            let wide = match value {
                Value::Int(raw) => i128::from(raw),
                Value::UInt(raw) => i128::from(raw),
                Value::Float(float) if float.is_nan() => {
                    tracing::warn!(slot = %target(), kind = primitive.name(), "NaN assigned to numeric field");
                    0
                }
                Value::Float(float) if float.is_finite() && float.fract() == 0.0 => float as i128,
                Value::Float(_) => return Err(ValueReason::NotIntegral { expected: primitive }),
                other => return Err(mismatch(&other)),
            };
            let (min, max) = primitive.integer_range().unwrap_or((i128::MIN, i128::MAX));
            if wide < min || wide > max {
                return Err(ValueReason::OutOfRange {
                    expected: primitive,
                    value: wide,
                });
            }
            if is_signed(primitive) {
                Ok(Value::Int(wide as i64))
            } else {
                Ok(Value::UInt(wide as u64))
            }
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn int_of(value: &Value) -> i64 {
    match value {
        Value::Int(raw) => *raw,
        Value::UInt(raw) => *raw as i64,
        _ => 0,
    }
}

#[allow(clippy::cast_sign_loss)]
const fn uint_of(value: &Value) -> u64 {
    match value {
        Value::UInt(raw) => *raw,
        Value::Int(raw) => *raw as u64,
        _ => 0,
    }
}

fn float_of(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

/// Writes a normalized primitive.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn write_primitive(writer: &mut ByteWriter, primitive: PrimitiveType, value: &Value) {
    match primitive {
        PrimitiveType::String => writer.write_string(value.as_str().unwrap_or_default()),
        PrimitiveType::CString => writer.write_cstring(value.as_str().unwrap_or_default()),
        PrimitiveType::Boolean => writer.write_bool(value.as_bool().unwrap_or_default()),
        PrimitiveType::Number => {
            let number = match value {
                Value::Int(raw) => Number::Int(*raw),
                Value::UInt(raw) => Number::from(*raw),
                Value::Float(float) if float.is_nan() => Number::Int(0),
                Value::Float(float) => Number::Float(*float),
                _ => Number::Int(0),
            };
            writer.write_number(number);
        }
        PrimitiveType::Int8 => writer.write_i8(int_of(value) as i8),
        PrimitiveType::UInt8 => writer.write_u8(uint_of(value) as u8),
        PrimitiveType::Int16 => writer.write_i16(int_of(value) as i16),
        PrimitiveType::UInt16 => writer.write_u16(uint_of(value) as u16),
        PrimitiveType::Int32 => writer.write_i32(int_of(value) as i32),
        PrimitiveType::UInt32 => writer.write_u32(uint_of(value) as u32),
        PrimitiveType::Int64 | PrimitiveType::BigInt64 => writer.write_i64(int_of(value)),
        PrimitiveType::UInt64 | PrimitiveType::BigUInt64 => writer.write_u64(uint_of(value)),
        PrimitiveType::Float32 => writer.write_f32(float_of(value) as f32),
        PrimitiveType::Float64 => writer.write_f64(float_of(value)),
        PrimitiveType::VarInt => writer.write_vars64(int_of(value)),
        PrimitiveType::VarUInt => writer.write_varu64(uint_of(value)),
    }
}

/// Reads a primitive of the declared kind.
pub(crate) fn read_primitive(
    reader: &mut ByteReader<'_>,
    primitive: PrimitiveType,
    limits: &CodecLimits,
) -> CodecResult<Value> {
    let value = match primitive {
        PrimitiveType::String => Value::String(reader.read_string_limited(limits.max_string_bytes)?),
        PrimitiveType::CString => {
            let text = reader.read_cstring()?;
            if text.len() > limits.max_string_bytes {
                return Err(bytestream::ByteError::LengthOverflow {
                    length: text.len() as u64,
                }
                .into());
            }
            Value::String(text)
        }
        PrimitiveType::Boolean => Value::Bool(reader.read_bool()?),
        PrimitiveType::Number => match reader.read_number()? {
            Number::Int(raw) => Value::Int(raw),
            Number::UInt(raw) => Value::UInt(raw),
            Number::Float(float) => Value::Float(float),
        },
        PrimitiveType::Int8 => Value::Int(i64::from(reader.read_i8()?)),
        PrimitiveType::UInt8 => Value::UInt(u64::from(reader.read_u8()?)),
        PrimitiveType::Int16 => Value::Int(i64::from(reader.read_i16()?)),
        PrimitiveType::UInt16 => Value::UInt(u64::from(reader.read_u16()?)),
        PrimitiveType::Int32 => Value::Int(i64::from(reader.read_i32()?)),
        PrimitiveType::UInt32 => Value::UInt(u64::from(reader.read_u32()?)),
        PrimitiveType::Int64 | PrimitiveType::BigInt64 => Value::Int(reader.read_i64()?),
        PrimitiveType::UInt64 | PrimitiveType::BigUInt64 => Value::UInt(reader.read_u64()?),
        PrimitiveType::Float32 => Value::Float(f64::from(reader.read_f32()?)),
        PrimitiveType::Float64 => Value::Float(reader.read_f64()?),
        PrimitiveType::VarInt => Value::Int(reader.read_vars64()?),
        PrimitiveType::VarUInt => Value::UInt(reader.read_varu64()?),
    };
    Ok(value)
}
