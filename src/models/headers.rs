use std::collections::{BTreeMap, btree_map};

use serde_json::{Map, Number, Value as JsonValue};

use crate::error::StoreError;

/// A single header value. Integer widths are kept distinct because producers
/// (and the broker's own dead-lettering) disagree on which width they use.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    F32(f32),
    F64(f64),
    Timestamp(u64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<HeaderValue>),
    Table(Headers),
    Void,
}

impl HeaderValue {
    /// Integer view of the value, regardless of the width it arrived in.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            HeaderValue::I8(v) => Some(v.into()),
            HeaderValue::U8(v) => Some(v.into()),
            HeaderValue::I16(v) => Some(v.into()),
            HeaderValue::U16(v) => Some(v.into()),
            HeaderValue::I32(v) => Some(v.into()),
            HeaderValue::U32(v) => Some(v.into()),
            HeaderValue::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            HeaderValue::Bool(v) => JsonValue::Bool(*v),
            HeaderValue::I8(_)
            | HeaderValue::U8(_)
            | HeaderValue::I16(_)
            | HeaderValue::U16(_)
            | HeaderValue::I32(_)
            | HeaderValue::U32(_)
            | HeaderValue::I64(_) => self.as_i64().map(JsonValue::from).unwrap_or(JsonValue::Null),
            HeaderValue::F32(v) => float_to_json(f64::from(*v)),
            HeaderValue::F64(v) => float_to_json(*v),
            HeaderValue::Timestamp(v) => JsonValue::from(*v),
            HeaderValue::String(v) => JsonValue::String(v.clone()),
            HeaderValue::Bytes(v) => JsonValue::String(String::from_utf8_lossy(v).into_owned()),
            HeaderValue::Array(values) => {
                JsonValue::Array(values.iter().map(HeaderValue::to_json).collect())
            }
            HeaderValue::Table(table) => table.to_json(),
            HeaderValue::Void => JsonValue::Null,
        }
    }

    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => HeaderValue::Void,
            JsonValue::Bool(v) => HeaderValue::Bool(*v),
            JsonValue::Number(n) => {
                if let Some(v) = n.as_i64() {
                    HeaderValue::I64(v)
                } else if let Some(v) = n.as_u64() {
                    HeaderValue::Timestamp(v)
                } else {
                    HeaderValue::F64(n.as_f64().unwrap_or_default())
                }
            }
            JsonValue::String(v) => HeaderValue::String(v.clone()),
            JsonValue::Array(values) => {
                HeaderValue::Array(values.iter().map(HeaderValue::from_json).collect())
            }
            JsonValue::Object(map) => HeaderValue::Table(Headers::from_json_map(map)),
        }
    }
}

fn float_to_json(v: f64) -> JsonValue {
    Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::I32(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::I64(value)
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

/// Message headers, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(BTreeMap<String, HeaderValue>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HeaderValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<HeaderValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, HeaderValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of these headers with `key` dropped.
    pub fn without(&self, key: &str) -> Self {
        let mut copy = self.clone();
        copy.remove(key);
        copy
    }

    pub fn to_json(&self) -> JsonValue {
        let map = self
            .0
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect::<Map<_, _>>();

        JsonValue::Object(map)
    }

    /// Decodes a stored header blob. Only a JSON object is a valid header set.
    pub fn from_json(value: &JsonValue) -> Result<Self, StoreError> {
        match value {
            JsonValue::Object(map) => Ok(Self::from_json_map(map)),
            other => Err(StoreError::Decode(format!(
                "expected a JSON object for headers, found {}",
                json_kind(other)
            ))),
        }
    }

    fn from_json_map(map: &Map<String, JsonValue>) -> Self {
        Self(
            map.iter()
                .map(|(key, value)| (key.clone(), HeaderValue::from_json(value)))
                .collect(),
        )
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

impl<K: Into<String>, V: Into<HeaderValue>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = (&'a String, &'a HeaderValue);
    type IntoIter = btree_map::Iter<'a, String, HeaderValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Headers> for HeaderValue {
    fn from(value: Headers) -> Self {
        HeaderValue::Table(value)
    }
}
