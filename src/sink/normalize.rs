//! Payload normalization
//!
//! Callers hand the sink whatever shape is convenient: a keyed map, a ready-made
//! JSON object, or a flat key/value list. Everything is reduced to one ordered
//! field map before it becomes a record.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Number, Value};

use crate::error::NormalizeError;

/// Ordered field name to value mapping of a single record
pub type Fields = Map<String, Value>;

/// Value given to a dangling key at the end of an odd-length keyed list
pub const BAD_KEY_VALUE: &str = "!BADKEY";

/// A scalar field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl FieldValue {
    /// Coerce a dynamic value by its kind
    ///
    /// Strings, integers and floats are kept; every other kind yields `None`.
    pub fn coerce(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            // u64 values beyond i64 range fall through to a float
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(FieldValue::Int(i)),
                None => n.as_f64().map(FieldValue::Float),
            },
            _ => None,
        }
    }

    fn into_json(self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s),
            FieldValue::Int(i) => Value::Number(i.into()),
            // NaN and infinities have no JSON form
            FieldValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        FieldValue::Text(s.clone())
    }
}

macro_rules! int_field_value {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::Int(i64::from(v))
            }
        })*
    };
}

int_field_value!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(f64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

/// The accepted payload shapes
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Field names mapped to scalar values, in insertion order
    KeyedMap(Vec<(String, FieldValue)>),
    /// A JSON document that must hold an object
    JsonText(Vec<u8>),
    /// Alternating keys and values: `[k0, v0, k1, v1, ...]`
    KeyedList(Vec<FieldValue>),
}

impl Payload {
    /// Classify a dynamic value into one of the payload shapes
    ///
    /// Objects become keyed maps with their values coerced; entries of an
    /// unsupported kind are dropped. Arrays become keyed lists, paired by
    /// position before coercion so that a dropped pair never shifts the ones
    /// after it. A string is taken as JSON text. Anything else is rejected.
    pub fn classify(value: Value) -> Result<Self, NormalizeError> {
        match value {
            Value::Object(map) => Ok(Payload::KeyedMap(
                map.into_iter()
                    .filter_map(|(k, v)| FieldValue::coerce(&v).map(|v| (k, v)))
                    .collect(),
            )),
            Value::String(s) => Ok(Payload::JsonText(s.into_bytes())),
            Value::Array(items) => Ok(Payload::KeyedList(coerce_keyed_list(&items))),
            _ => Err(NormalizeError::UnsupportedShape),
        }
    }
}

/// Coerce `[k0, v0, k1, v1, ...]` pair by pair
///
/// A pair with an unsupported key or value is dropped whole. A dangling final
/// key is kept so it still gets its placeholder value.
fn coerce_keyed_list(items: &[Value]) -> Vec<FieldValue> {
    let mut list = Vec::with_capacity(items.len());
    for pair in items.chunks(2) {
        let Some(key) = FieldValue::coerce(&pair[0]) else {
            continue;
        };
        match pair.get(1) {
            Some(value) => {
                if let Some(value) = FieldValue::coerce(value) {
                    list.push(key);
                    list.push(value);
                }
            }
            None => list.push(key),
        }
    }
    list
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::JsonText(s.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::JsonText(s.into_bytes())
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::JsonText(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::JsonText(bytes)
    }
}

impl From<Vec<FieldValue>> for Payload {
    fn from(items: Vec<FieldValue>) -> Self {
        Payload::KeyedList(items)
    }
}

impl<K, V> FromIterator<(K, V)> for Payload
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Payload::KeyedMap(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V> From<HashMap<K, V>> for Payload
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from(map: HashMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K, V> From<BTreeMap<K, V>> for Payload
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl TryFrom<Value> for Payload {
    type Error = NormalizeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Payload::classify(value)
    }
}

/// Reduce a payload to the fields of one record
pub fn normalize(payload: &Payload) -> Result<Fields, NormalizeError> {
    match payload {
        Payload::KeyedMap(entries) => Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().into_json()))
            .collect()),
        Payload::JsonText(bytes) => Ok(serde_json::from_slice::<Fields>(bytes)?),
        Payload::KeyedList(items) => Ok(pair_keyed_list(items)),
    }
}

fn pair_keyed_list(items: &[FieldValue]) -> Fields {
    let mut fields = Fields::new();
    for pair in items.chunks(2) {
        // Only text can name a field
        let FieldValue::Text(key) = &pair[0] else {
            continue;
        };
        let value = match pair.get(1) {
            Some(v) => v.clone().into_json(),
            None => Value::String(BAD_KEY_VALUE.to_string()),
        };
        fields.insert(key.clone(), value);
    }
    fields
}
