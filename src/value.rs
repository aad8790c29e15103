//! Attribute literals and their comparison rules.

use std::{cmp::Ordering, fmt};

use arrow_schema::{DataType, TimeUnit};
use xxhash_rust::xxh3::Xxh3;

/// A literal compared against attribute values.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
}

impl AttributeValue {
    /// Arrow type of the literal, used to check it against the attribute schema.
    pub fn data_type(&self) -> DataType {
        match self {
            AttributeValue::Boolean(_) => DataType::Boolean,
            AttributeValue::Int64(_) => DataType::Int64,
            AttributeValue::Float64(_) => DataType::Float64,
            AttributeValue::Utf8(_) => DataType::Utf8,
            AttributeValue::Timestamp(_) => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }

    /// Compare two literals.
    ///
    /// Integers and floats compare numerically with each other. Any other pair of
    /// different types is incomparable and yields `None`.
    pub fn compare(&self, other: &AttributeValue) -> Option<Ordering> {
        match (self, other) {
            (AttributeValue::Boolean(a), AttributeValue::Boolean(b)) => Some(a.cmp(b)),
            (AttributeValue::Int64(a), AttributeValue::Int64(b)) => Some(a.cmp(b)),
            (AttributeValue::Float64(a), AttributeValue::Float64(b)) => a.partial_cmp(b),
            (AttributeValue::Int64(a), AttributeValue::Float64(b)) => (*a as f64).partial_cmp(b),
            (AttributeValue::Float64(a), AttributeValue::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (AttributeValue::Utf8(a), AttributeValue::Utf8(b)) => Some(a.cmp(b)),
            (AttributeValue::Timestamp(a), AttributeValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// String content, if this is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Utf8(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn hash_into(&self, hasher: &mut Xxh3) {
        match self {
            AttributeValue::Boolean(v) => {
                hasher.update(&[0, *v as u8]);
            }
            AttributeValue::Int64(v) => {
                hasher.update(&[1]);
                hasher.update(&v.to_le_bytes());
            }
            AttributeValue::Float64(v) => {
                hasher.update(&[2]);
                hasher.update(&v.to_bits().to_le_bytes());
            }
            AttributeValue::Utf8(v) => {
                hasher.update(&[3]);
                hasher.update(&(v.len() as u64).to_le_bytes());
                hasher.update(v.as_bytes());
            }
            AttributeValue::Timestamp(v) => {
                hasher.update(&[4]);
                hasher.update(&v.to_le_bytes());
            }
        }
    }
}

impl PartialOrd for AttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Boolean(v) => write!(f, "{}", v),
            AttributeValue::Int64(v) => write!(f, "{}", v),
            AttributeValue::Float64(v) => write!(f, "{}", v),
            AttributeValue::Utf8(v) => write!(f, "'{}'", v),
            AttributeValue::Timestamp(v) => write!(f, "@{}", v),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Boolean(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int64(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int64(value as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float64(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Utf8(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Utf8(value)
    }
}

/// Returns true when a literal of `value_type` can be compared with an attribute
/// declared as `declared`.
pub(crate) fn is_assignable(value_type: &DataType, declared: &DataType) -> bool {
    if value_type == declared {
        return true;
    }
    matches!(
        (value_type, declared),
        (
            DataType::Int64,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Float32 | DataType::Float64
        ) | (DataType::Float64, DataType::Float32 | DataType::Int64)
            | (DataType::Utf8, DataType::LargeUtf8 | DataType::Utf8View)
            | (DataType::Timestamp(_, _), DataType::Timestamp(_, _))
    )
}

/// A language tag such as `en` or `cs-CZ`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Locale(String);

impl Locale {
    pub fn new(tag: impl Into<String>) -> Self {
        Locale(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locale {
    fn from(value: &str) -> Self {
        Locale::new(value)
    }
}
