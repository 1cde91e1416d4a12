use crate::RowpackError;
use jiff::civil::{Date, DateTime, Time};
use ordered_float::OrderedFloat;
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

const DATE_TAG: &str = "__date__";
const TIME_TAG: &str = "__time__";
const DATETIME_TAG: &str = "__datetime__";
const VALUE_KEY: &str = "value";

/// One cell of a row
///
/// The batch encoding has no native temporal type, so dates and times travel
/// as tagged maps of their decomposed fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowValue {
    Null,
    Boolean(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(Arc<str>),
    Date(Date),
    Time(Time),
    DateTime(DateTime),
}

/// A row, positionally aligned with the schema's column order
pub type Row = Vec<RowValue>;

impl RowValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }

    /// Get the type name of the value
    pub fn type_name(&self) -> &'static str {
        match self {
            RowValue::Null => "Null",
            RowValue::Boolean(_) => "Boolean",
            RowValue::Int(_) => "Int",
            RowValue::Float(_) => "Float",
            RowValue::String(_) => "String",
            RowValue::Date(_) => "Date",
            RowValue::Time(_) => "Time",
            RowValue::DateTime(_) => "DateTime",
        }
    }

    /// Store an arbitrary object by its rendered form
    pub fn rendered<T: fmt::Display + ?Sized>(value: &T) -> Self {
        RowValue::String(Arc::from(value.to_string()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RowValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to `f64`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RowValue::Int(i) => Some(*i as f64),
            RowValue::Float(f) => Some(f.0),
            _ => None,
        }
    }
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValue::Null => Ok(()),
            RowValue::Boolean(b) => write!(f, "{}", b),
            RowValue::Int(i) => write!(f, "{}", i),
            RowValue::Float(v) => write!(f, "{}", v.0),
            RowValue::String(s) => f.write_str(s),
            RowValue::Date(d) => write!(f, "{}", d),
            RowValue::Time(t) => write!(f, "{}", t),
            RowValue::DateTime(dt) => write!(f, "{}", dt),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for RowValue {
            fn from(v: $t) -> Self {
                RowValue::Int(v as i64)
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for RowValue {
    fn from(v: f64) -> Self {
        RowValue::Float(OrderedFloat(v))
    }
}

impl From<f32> for RowValue {
    fn from(v: f32) -> Self {
        RowValue::Float(OrderedFloat(v as f64))
    }
}

impl From<bool> for RowValue {
    fn from(v: bool) -> Self {
        RowValue::Boolean(v)
    }
}

impl From<&str> for RowValue {
    fn from(v: &str) -> Self {
        RowValue::String(Arc::from(v))
    }
}

impl From<String> for RowValue {
    fn from(v: String) -> Self {
        RowValue::String(Arc::from(v))
    }
}

impl From<Date> for RowValue {
    fn from(v: Date) -> Self {
        RowValue::Date(v)
    }
}

impl From<Time> for RowValue {
    fn from(v: Time) -> Self {
        RowValue::Time(v)
    }
}

impl From<DateTime> for RowValue {
    fn from(v: DateTime) -> Self {
        RowValue::DateTime(v)
    }
}

impl<T: Into<RowValue>> From<Option<T>> for RowValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(RowValue::Null, Into::into)
    }
}

impl TryFrom<serde_json::Value> for RowValue {
    type Error = RowpackError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => RowValue::Null,
            Value::Bool(b) => RowValue::Boolean(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RowValue::Int(i),
                None => RowValue::from(n.as_f64().ok_or_else(|| {
                    RowpackError::encode(format!("Number {} is out of range", n))
                })?),
            },
            Value::String(s) => RowValue::from(s),
            other @ (Value::Array(_) | Value::Object(_)) => {
                return Err(RowpackError::encode(format!(
                    "Cannot represent nested value as a cell: {}",
                    other
                )))
            }
        })
    }
}

fn time_fields(t: Time) -> Vec<i64> {
    let mut fields = vec![t.hour() as i64, t.minute() as i64, t.second() as i64];
    if t.subsec_nanosecond() != 0 {
        fields.push(t.subsec_nanosecond() as i64);
    }
    fields
}

fn date_fields(d: Date) -> Vec<i64> {
    vec![d.year() as i64, d.month() as i64, d.day() as i64]
}

impl Serialize for RowValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (tag, fields) = match self {
            RowValue::Null => return serializer.serialize_unit(),
            RowValue::Boolean(b) => return serializer.serialize_bool(*b),
            RowValue::Int(i) => return serializer.serialize_i64(*i),
            RowValue::Float(f) => return serializer.serialize_f64(f.0),
            RowValue::String(s) => return serializer.serialize_str(s),
            RowValue::Date(d) => (DATE_TAG, date_fields(*d)),
            RowValue::Time(t) => (TIME_TAG, time_fields(*t)),
            RowValue::DateTime(dt) => {
                let mut fields = date_fields(dt.date());
                fields.extend(time_fields(dt.time()));
                (DATETIME_TAG, fields)
            }
        };

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(tag, &true)?;
        map.serialize_entry(VALUE_KEY, &fields)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for RowValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RowValueVisitor)
    }
}

struct RowValueVisitor;

fn narrow<T: TryFrom<i64>, E: de::Error>(fields: &[i64], idx: usize, what: &str) -> Result<T, E> {
    let raw = fields
        .get(idx)
        .copied()
        .ok_or_else(|| E::custom(format!("missing {} field", what)))?;
    T::try_from(raw).map_err(|_| E::custom(format!("{} field out of range: {}", what, raw)))
}

fn build_time<E: de::Error>(fields: &[i64]) -> Result<Time, E> {
    let nanos = if fields.len() > 3 {
        narrow(fields, 3, "subsec_nanosecond")?
    } else {
        0
    };
    Time::new(
        narrow(fields, 0, "hour")?,
        narrow(fields, 1, "minute")?,
        narrow(fields, 2, "second")?,
        nanos,
    )
    .map_err(E::custom)
}

fn build_date<E: de::Error>(fields: &[i64]) -> Result<Date, E> {
    Date::new(
        narrow(fields, 0, "year")?,
        narrow(fields, 1, "month")?,
        narrow(fields, 2, "day")?,
    )
    .map_err(E::custom)
}

impl<'de> Visitor<'de> for RowValueVisitor {
    type Value = RowValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a scalar cell value or a tagged temporal map")
    }

    fn visit_unit<E: de::Error>(self) -> Result<RowValue, E> {
        Ok(RowValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<RowValue, E> {
        Ok(RowValue::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RowValue, E> {
        Ok(RowValue::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RowValue, E> {
        Ok(RowValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RowValue, E> {
        i64::try_from(v)
            .map(RowValue::Int)
            .map_err(|_| E::custom(format!("integer {} does not fit in i64", v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RowValue, E> {
        Ok(RowValue::Float(OrderedFloat(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RowValue, E> {
        Ok(RowValue::String(Arc::from(v)))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<RowValue, E> {
        std::str::from_utf8(v)
            .map(|s| RowValue::String(Arc::from(s)))
            .map_err(E::custom)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, _seq: A) -> Result<RowValue, A::Error> {
        Err(de::Error::custom("nested arrays are not valid cell values"))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RowValue, A::Error> {
        let mut tag: Option<String> = None;
        let mut fields: Option<Vec<i64>> = None;

        while let Some(key) = map.next_key::<String>()? {
            if key == VALUE_KEY {
                fields = Some(map.next_value()?);
            } else if key.starts_with("__") && key.ends_with("__") {
                let _: serde::de::IgnoredAny = map.next_value()?;
                tag = Some(key);
            } else {
                return Err(de::Error::custom(format!("unexpected key in tagged value: {}", key)));
            }
        }

        let tag = tag.ok_or_else(|| de::Error::custom("untagged map is not a valid cell value"))?;
        let fields = fields.ok_or_else(|| de::Error::custom(format!("{} without value", tag)))?;

        match tag.as_str() {
            DATE_TAG => Ok(RowValue::Date(build_date(&fields)?)),
            TIME_TAG => Ok(RowValue::Time(build_time(&fields)?)),
            DATETIME_TAG => {
                if fields.len() < 6 {
                    return Err(de::Error::custom("datetime needs at least 6 fields"));
                }
                let date = build_date(&fields[..3])?;
                let time = build_time(&fields[3..])?;
                Ok(RowValue::DateTime(date.to_datetime(time)))
            }
            other => Err(de::Error::custom(format!("unknown value tag: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::civil::{date, datetime, time};

    fn roundtrip(value: &RowValue) -> RowValue {
        let bytes = rmp_serde::to_vec(value).unwrap();
        rmp_serde::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_value_creation() {
        let v = RowValue::from(42);
        assert_eq!(v, RowValue::Int(42));
        assert!(!v.is_null());
        assert_eq!(v.type_name(), "Int");
        assert_eq!(RowValue::from(None::<i64>), RowValue::Null);
    }

    #[test]
    fn test_scalars_survive_encoding() {
        for value in [
            RowValue::Null,
            RowValue::Boolean(true),
            RowValue::Int(-7),
            RowValue::Int(u32::MAX as i64 + 1),
            RowValue::from(2.5),
            RowValue::from("hello"),
        ] {
            assert_eq!(roundtrip(&value), value);
        }
    }

    #[test]
    fn test_nan_equality() {
        let v = RowValue::from(f64::NAN);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_temporal_values_are_tagged() {
        let d = RowValue::from(date(2016, 2, 29));
        let bytes = rmp_serde::to_vec(&d).unwrap();
        let generic: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(generic["__date__"], serde_json::json!(true));
        assert_eq!(generic["value"], serde_json::json!([2016, 2, 29]));
        assert_eq!(roundtrip(&d), d);

        let t = RowValue::from(time(13, 5, 59, 0));
        assert_eq!(roundtrip(&t), t);

        let dt = RowValue::from(datetime(1999, 12, 31, 23, 59, 58, 125_000_000));
        assert_eq!(roundtrip(&dt), dt);
    }

    #[test]
    fn test_unknown_tag_fails() {
        let bytes = rmp_serde::to_vec_named(&serde_json::json!({
            "__interval__": true,
            "value": [1, 2]
        }))
        .unwrap();
        let err = rmp_serde::from_slice::<RowValue>(&bytes).unwrap_err();
        assert!(err.to_string().contains("unknown value tag"));
    }

    #[test]
    fn test_nested_json_cannot_be_encoded() {
        let err = RowValue::try_from(serde_json::json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, RowpackError::Encode(_)));

        let v = RowValue::try_from(serde_json::json!(12)).unwrap();
        assert_eq!(v, RowValue::Int(12));
    }

    #[test]
    fn test_rendered_fallback() {
        let v = RowValue::rendered(&std::net::Ipv4Addr::LOCALHOST);
        assert_eq!(v.as_str(), Some("127.0.0.1"));
    }

    #[test]
    fn test_hash_consistency() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(RowValue::Int(42));
        set.insert(RowValue::from("hello"));

        assert!(set.contains(&RowValue::Int(42)));
        assert!(set.contains(&RowValue::from("hello")));
        assert!(!set.contains(&RowValue::Int(43)));
    }
}
