//! Field values and the logical storage types they map onto.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::BigDecimal;

/// Logical storage type inferred for an extension field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    ShortText,
    LongText,
    Integer,
    LongInteger,
    Double,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    Time,
    EnumText,
    /// JSON-serialized fallback for anything without a native mapping.
    OpaqueText,
}

impl StorageType {
    /// PostgreSQL column type for this storage type.
    pub fn sql_type(&self) -> &'static str {
        match self {
            StorageType::ShortText => "VARCHAR(255)",
            StorageType::LongText => "TEXT",
            StorageType::Integer => "INTEGER",
            StorageType::LongInteger => "BIGINT",
            StorageType::Double => "DOUBLE PRECISION",
            StorageType::Decimal => "DECIMAL(19,2)",
            StorageType::Boolean => "BOOLEAN",
            StorageType::Timestamp => "TIMESTAMPTZ",
            StorageType::Date => "DATE",
            StorageType::Time => "TIME",
            StorageType::EnumText => "VARCHAR(50)",
            StorageType::OpaqueText => "TEXT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::ShortText => "short_text",
            StorageType::LongText => "long_text",
            StorageType::Integer => "integer",
            StorageType::LongInteger => "long_integer",
            StorageType::Double => "double",
            StorageType::Decimal => "decimal",
            StorageType::Boolean => "boolean",
            StorageType::Timestamp => "timestamp",
            StorageType::Date => "date",
            StorageType::Time => "time",
            StorageType::EnumText => "enum_text",
            StorageType::OpaqueText => "opaque_text",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dynamically typed field value read from or written to a record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i32),
    Long(i64),
    Double(f64),
    Decimal(BigDecimal),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Enum(String),
    Json(Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert a JSON value captured at the call boundary.
    ///
    /// Integers land in the narrowest integer variant that holds them.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => FieldValue::Integer(small),
                        Err(_) => FieldValue::Long(i),
                    }
                } else {
                    FieldValue::Double(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => FieldValue::Json(value.clone()),
        }
    }

    /// Render as JSON for full-record serialization.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Text(s) | FieldValue::Enum(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Long(i) => Value::from(*i),
            FieldValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Decimal(d) => {
                let text = d.to_string();
                text.parse::<serde_json::Number>()
                    .map(Value::Number)
                    .unwrap_or(Value::String(text))
            }
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            FieldValue::Time(t) => Value::String(t.to_string()),
            FieldValue::Json(v) => v.clone(),
        }
    }

    /// Plain-text rendering of scalar values, `None` for null and structured values.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null | FieldValue::Json(_) => None,
            FieldValue::Text(s) | FieldValue::Enum(s) => Some(s.clone()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Long(i) => Some(i.to_string()),
            FieldValue::Double(d) => Some(d.to_string()),
            FieldValue::Decimal(d) => Some(d.to_string()),
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Timestamp(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            FieldValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            FieldValue::Time(t) => Some(t.to_string()),
        }
    }
}

/// A Rust type usable as an extension field.
///
/// Conversion from a [`FieldValue`] is lenient: numeric widths, text
/// encodings of numbers and dates, and decimals are coerced where the
/// result is unambiguous. `None` means the value does not fit and the
/// field is left untouched.
pub trait FieldKind: Sized {
    fn storage_type() -> StorageType {
        StorageType::OpaqueText
    }

    fn to_field_value(&self) -> FieldValue;

    fn from_field_value(value: &FieldValue) -> Option<Self>;
}

/// Free text stored in an unbounded column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LongText(pub String);

impl From<&str> for LongText {
    fn from(s: &str) -> Self {
        LongText(s.to_string())
    }
}

impl From<String> for LongText {
    fn from(s: String) -> Self {
        LongText(s)
    }
}

impl fmt::Display for LongText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn text_of(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Json(Value::String(s)) => Some(s.clone()),
        other => other.as_text(),
    }
}

impl FieldKind for String {
    fn storage_type() -> StorageType {
        StorageType::ShortText
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Text(self.clone())
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        text_of(value)
    }
}

impl FieldKind for LongText {
    fn storage_type() -> StorageType {
        StorageType::LongText
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Text(self.0.clone())
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Json(v @ (Value::Array(_) | Value::Object(_))) => {
                Some(LongText(v.to_string()))
            }
            other => text_of(other).map(LongText),
        }
    }
}

impl FieldKind for i32 {
    fn storage_type() -> StorageType {
        StorageType::Integer
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Integer(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Long(i) => i32::try_from(*i).ok(),
            FieldValue::Double(d) if d.fract() == 0.0 => i64_from_f64(*d)
                .and_then(|i| i32::try_from(i).ok()),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FieldKind for i64 {
    fn storage_type() -> StorageType {
        StorageType::LongInteger
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Long(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Integer(i) => Some(i64::from(*i)),
            FieldValue::Long(i) => Some(*i),
            FieldValue::Double(d) if d.fract() == 0.0 => i64_from_f64(*d),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn i64_from_f64(d: f64) -> Option<i64> {
    if d.is_finite() && d >= i64::MIN as f64 && d <= i64::MAX as f64 {
        Some(d as i64)
    } else {
        None
    }
}

fn f64_of(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Integer(i) => Some(f64::from(*i)),
        FieldValue::Long(i) => Some(*i as f64),
        FieldValue::Double(d) => Some(*d),
        FieldValue::Decimal(d) => d.to_string().parse().ok(),
        FieldValue::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl FieldKind for f64 {
    fn storage_type() -> StorageType {
        StorageType::Double
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Double(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        f64_of(value)
    }
}

impl FieldKind for f32 {
    fn storage_type() -> StorageType {
        StorageType::Double
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Double(f64::from(*self))
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        f64_of(value).map(|d| d as f32)
    }
}

impl FieldKind for bool {
    fn storage_type() -> StorageType {
        StorageType::Boolean
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Boolean(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Boolean(b) => Some(*b),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FieldKind for BigDecimal {
    fn storage_type() -> StorageType {
        StorageType::Decimal
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Decimal(self.clone())
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Decimal(d) => Some(d.clone()),
            FieldValue::Integer(i) => Some(BigDecimal::from(*i)),
            FieldValue::Long(i) => Some(BigDecimal::from(*i)),
            // Shortest round-trip text keeps 9.99 as 9.99 rather than its binary expansion.
            FieldValue::Double(d) if d.is_finite() => BigDecimal::from_str(&d.to_string()).ok(),
            FieldValue::Text(s) => BigDecimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }
}

impl FieldKind for DateTime<Utc> {
    fn storage_type() -> StorageType {
        StorageType::Timestamp
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Timestamp(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Timestamp(ts) => Some(*ts),
            FieldValue::Long(ms) => Utc.timestamp_millis_opt(*ms).single(),
            FieldValue::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| parse_naive_datetime(s).map(|ndt| ndt.and_utc())),
            _ => None,
        }
    }
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

impl FieldKind for NaiveDateTime {
    fn storage_type() -> StorageType {
        StorageType::Timestamp
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Timestamp(self.and_utc())
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(s) => parse_naive_datetime(s),
            other => DateTime::<Utc>::from_field_value(other).map(|ts| ts.naive_utc()),
        }
    }
}

impl FieldKind for NaiveDate {
    fn storage_type() -> StorageType {
        StorageType::Date
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Date(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Date(d) => Some(*d),
            FieldValue::Timestamp(ts) => Some(ts.date_naive()),
            FieldValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl FieldKind for NaiveTime {
    fn storage_type() -> StorageType {
        StorageType::Time
    }

    fn to_field_value(&self) -> FieldValue {
        FieldValue::Time(*self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Time(t) => Some(*t),
            FieldValue::Timestamp(ts) => Some(ts.time()),
            FieldValue::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").ok(),
            _ => None,
        }
    }
}

impl FieldKind for Value {
    fn to_field_value(&self) -> FieldValue {
        FieldValue::Json(self.clone())
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        Some(value.to_json())
    }
}

fn opaque_to_value<T: Serialize>(v: &T) -> FieldValue {
    FieldValue::Json(serde_json::to_value(v).unwrap_or_default())
}

fn opaque_from_value<T: DeserializeOwned>(value: &FieldValue) -> Option<T> {
    serde_json::from_value(value.to_json()).ok()
}

impl<T: Serialize + DeserializeOwned> FieldKind for Vec<T> {
    fn to_field_value(&self) -> FieldValue {
        opaque_to_value(self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        opaque_from_value(value)
    }
}

impl<V: Serialize + DeserializeOwned> FieldKind for HashMap<String, V> {
    fn to_field_value(&self) -> FieldValue {
        opaque_to_value(self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        opaque_from_value(value)
    }
}

impl<V: Serialize + DeserializeOwned> FieldKind for BTreeMap<String, V> {
    fn to_field_value(&self) -> FieldValue {
        opaque_to_value(self)
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        opaque_from_value(value)
    }
}

/// Optional fields store `Null` when unset and share the inner type's storage.
impl<T: FieldKind> FieldKind for Option<T> {
    fn storage_type() -> StorageType {
        T::storage_type()
    }

    fn to_field_value(&self) -> FieldValue {
        match self {
            Some(v) => v.to_field_value(),
            None => FieldValue::Null,
        }
    }

    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Null => Some(None),
            other => T::from_field_value(other).map(Some),
        }
    }
}

/// Implement [`FieldKind`] for enums stored as their text form.
///
/// The type must implement `Display` and `FromStr`.
#[macro_export]
macro_rules! enum_field_kind {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::FieldKind for $ty {
                fn storage_type() -> $crate::StorageType {
                    $crate::StorageType::EnumText
                }

                fn to_field_value(&self) -> $crate::FieldValue {
                    $crate::FieldValue::Enum(self.to_string())
                }

                fn from_field_value(value: &$crate::FieldValue) -> Option<Self> {
                    match value {
                        $crate::FieldValue::Enum(s) | $crate::FieldValue::Text(s) => s.parse().ok(),
                        _ => None,
                    }
                }
            }
        )+
    };
}
