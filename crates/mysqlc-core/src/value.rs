//! Dynamic SQL values.

use serde::{Deserialize, Serialize};

/// A dynamically-typed SQL value.
///
/// Column bytes coming off the wire are converted into this enum by the
/// driver's converter table; when no converter is registered for a column
/// type, the raw bytes pass through unchanged as [`Value::Bytes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// 8-bit signed integer (TINYINT)
    TinyInt(i8),

    /// 16-bit signed integer (SMALLINT, YEAR)
    SmallInt(i16),

    /// 32-bit signed integer (INT, MEDIUMINT)
    Int(i32),

    /// 64-bit signed integer (BIGINT)
    BigInt(i64),

    /// 8-bit unsigned integer (TINYINT UNSIGNED)
    UTinyInt(u8),

    /// 16-bit unsigned integer (SMALLINT UNSIGNED)
    USmallInt(u16),

    /// 32-bit unsigned integer (INT UNSIGNED)
    UInt(u32),

    /// 64-bit unsigned integer (BIGINT UNSIGNED)
    UBigInt(u64),

    /// 32-bit floating point (FLOAT)
    Float(f32),

    /// 64-bit floating point (DOUBLE)
    Double(f64),

    /// Arbitrary precision decimal, kept as text to preserve precision
    Decimal(String),

    /// Text string
    Text(String),

    /// Binary data
    Bytes(Vec<u8>),

    /// JSON document
    Json(serde_json::Value),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INT",
            Value::BigInt(_) => "BIGINT",
            Value::UTinyInt(_) => "TINYINT UNSIGNED",
            Value::USmallInt(_) => "SMALLINT UNSIGNED",
            Value::UInt(_) => "INT UNSIGNED",
            Value::UBigInt(_) => "BIGINT UNSIGNED",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Decimal(_) => "DECIMAL",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Json(_) => "JSON",
        }
    }

    /// Try to convert this value to an i64.
    ///
    /// Unsigned values above `i64::MAX` do not fit and return `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::TinyInt(v) => Some(i64::from(*v)),
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            Value::UTinyInt(v) => Some(i64::from(*v)),
            Value::USmallInt(v) => Some(i64::from(*v)),
            Value::UInt(v) => Some(i64::from(*v)),
            Value::UBigInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to convert this value to a u64.
    ///
    /// Negative values return `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UTinyInt(v) => Some(u64::from(*v)),
            Value::USmallInt(v) => Some(u64::from(*v)),
            Value::UInt(v) => Some(u64::from(*v)),
            Value::UBigInt(v) => Some(*v),
            Value::TinyInt(v) => u64::try_from(*v).ok(),
            Value::SmallInt(v) => u64::try_from(*v).ok(),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::BigInt(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Try to convert this value to an f64.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Borrow this value as a string slice, if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow this value as raw bytes (text or binary).
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) | Value::Decimal(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Value::TinyInt(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::SmallInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UBigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_checks() {
        assert!(Value::Null.is_null());
        assert!(!Value::Int(0).is_null());
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn integer_widening() {
        assert_eq!(Value::TinyInt(-5).as_i64(), Some(-5));
        assert_eq!(Value::UBigInt(u64::MAX).as_i64(), None);
        assert_eq!(Value::UBigInt(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(Value::BigInt(-1).as_u64(), None);
    }

    #[test]
    fn text_and_bytes_access() {
        let v = Value::Text("hello".to_string());
        assert_eq!(v.as_str(), Some("hello"));
        assert_eq!(v.as_bytes(), Some(b"hello".as_slice()));
        assert_eq!(Value::Bytes(vec![1, 2]).as_bytes(), Some([1, 2].as_slice()));
        assert_eq!(Value::Int(1).as_str(), None);
    }

    #[test]
    fn float_conversion_covers_integers() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Double(1.5).as_f64(), Some(1.5));
    }
}
