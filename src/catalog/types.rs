use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Application-side type of a column, as declared by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Double,
    Ipv4,
    Ipv6,
    Text,
    Binary,
}

/// Storage type used when generating DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    SmallInt,
    Integer,
    BigInt,
    Double,
    Varchar,
    Binary,
}

impl DbType {
    pub fn sql_name(self, array_size: usize) -> String {
        match self {
            DbType::SmallInt => "SMALLINT".into(),
            DbType::Integer => "INTEGER".into(),
            DbType::BigInt => "BIGINT".into(),
            DbType::Double => "DOUBLE PRECISION".into(),
            DbType::Varchar => format!("VARCHAR({array_size})"),
            DbType::Binary => "BLOB".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(CompactString),
    Blob(Vec<u8>),
}

impl Value {
    pub fn text(s: &str) -> Self {
        Value::Text(CompactString::from(s))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::text(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "'{v}'"),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl AppType {
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            AppType::Uint8
                | AppType::Int8
                | AppType::Uint16
                | AppType::Int16
                | AppType::Uint32
                | AppType::Int32
                | AppType::Uint64
                | AppType::Int64
                | AppType::Ipv4
        )
    }

    fn integral_range(self) -> Option<(i128, i128)> {
        let range = match self {
            AppType::Uint8 => (0, u8::MAX as i128),
            AppType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            AppType::Uint16 => (0, u16::MAX as i128),
            AppType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            AppType::Uint32 | AppType::Ipv4 => (0, u32::MAX as i128),
            AppType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            AppType::Uint64 => (0, i64::MAX as i128),
            AppType::Int64 => (i64::MIN as i128, i64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }

    /// Checks that `value` fits this type with `array_size` elements and
    /// returns its effective length in bytes.
    pub fn check_value(self, value: &Value, array_size: usize) -> Result<usize, String> {
        if array_size == 0 {
            return Err("array size must be greater than zero".into());
        }
        match (self, value) {
            (_, Value::Null) => Ok(0),
            (ty, Value::Integer(v)) if ty.is_integral() => {
                let (lo, hi) = ty.integral_range().unwrap_or((0, 0));
                let v = i128::from(*v);
                if v < lo || v > hi {
                    return Err(format!("value {v} out of range for {ty:?}"));
                }
                Ok(ty.element_size())
            }
            (AppType::Double, Value::Real(_)) => Ok(8),
            (AppType::Double, Value::Integer(_)) => Ok(8),
            (AppType::Text, Value::Text(s)) => {
                if s.len() > array_size {
                    return Err(format!(
                        "text of {} bytes exceeds array size {array_size}",
                        s.len()
                    ));
                }
                Ok(s.len())
            }
            (AppType::Ipv6, Value::Blob(b)) => {
                if b.len() != 16 {
                    return Err(format!("ipv6 value must be 16 bytes, got {}", b.len()));
                }
                Ok(16)
            }
            (AppType::Binary, Value::Blob(b)) => {
                if b.len() > array_size {
                    return Err(format!(
                        "blob of {} bytes exceeds array size {array_size}",
                        b.len()
                    ));
                }
                Ok(b.len())
            }
            (ty, v) => Err(format!("{} value does not match {ty:?}", v.kind())),
        }
    }

    fn element_size(self) -> usize {
        match self {
            AppType::Uint8 | AppType::Int8 => 1,
            AppType::Uint16 | AppType::Int16 => 2,
            AppType::Uint32 | AppType::Int32 | AppType::Ipv4 => 4,
            AppType::Uint64 | AppType::Int64 | AppType::Double => 8,
            AppType::Ipv6 => 16,
            AppType::Text | AppType::Binary => 1,
        }
    }
}
