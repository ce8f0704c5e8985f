//! Opaque structured payloads carried by every envelope.
//!
//! A [`Message`] wraps one JSON value behind an [`Arc`], so clones are cheap
//! and writes copy only when the value is shared. Reads never fail: absent
//! keys and out-of-range indices read as `null`, and the [`Field`] view
//! coerces scalars the way message consumers expect.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

static NULL: Value = Value::Null;

/// A copy-on-write structured message payload.
#[derive(Clone, PartialEq)]
pub struct Message {
    value: Arc<Value>,
}

impl Default for Message {
    fn default() -> Self {
        Self::from(Value::Object(Map::new()))
    }
}

impl Message {
    /// Creates an empty object message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrows the underlying value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consumes the message, cloning the value only when it is shared.
    #[must_use]
    pub fn into_value(self) -> Value {
        Arc::try_unwrap(self.value).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Read-only view of the field stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Field<'_> {
        Field(&self[key])
    }

    /// Read-only view of the element at `index` when the root is an array.
    #[must_use]
    pub fn at(&self, index: usize) -> Field<'_> {
        Field(&self[index])
    }

    /// Returns `true` when `key` is present at the root.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.value
            .as_object()
            .is_some_and(|object| object.contains_key(key))
    }

    /// Stores `value` under `key`, turning a non-object root into an object.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name: String = key.into();
        *self.slot_mut(&name) = value.into();
        self
    }

    /// Removes `key` from the root object, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        match Arc::make_mut(&mut self.value) {
            Value::Object(object) => object.remove(key),
            _ => None,
        }
    }

    /// Builder-style variant of [`Message::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    fn slot_mut(&mut self, key: &str) -> &mut Value {
        let root = Arc::make_mut(&mut self.value);
        if !root.is_object() {
            *root = Value::Null;
        }
        // Indexing a null value promotes it to an object.
        &mut root[key]
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Self {
            value: Arc::new(value),
        }
    }
}

impl From<Message> for Value {
    fn from(message: Message) -> Self {
        message.into_value()
    }
}

impl Index<&str> for Message {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.value.get(key).unwrap_or(&NULL)
    }
}

impl Index<usize> for Message {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        self.value.get(index).unwrap_or(&NULL)
    }
}

impl IndexMut<&str> for Message {
    fn index_mut(&mut self, key: &str) -> &mut Value {
        self.slot_mut(key)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("Message").field(&*self.value).finish()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.value, formatter)
    }
}

/// Borrowed view of one value inside a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'a>(&'a Value);

impl<'a> Field<'a> {
    /// Wraps a borrowed value.
    #[must_use]
    pub fn new(value: &'a Value) -> Self {
        Self(value)
    }

    /// The raw value.
    #[must_use]
    pub fn value(self) -> &'a Value {
        self.0
    }

    /// Nested field under `key`; `null` when absent or not an object.
    #[must_use]
    pub fn get(self, key: &str) -> Field<'a> {
        Field(self.0.get(key).unwrap_or(&NULL))
    }

    /// Nested element at `index`; `null` when absent or not an array.
    #[must_use]
    pub fn at(self, index: usize) -> Field<'a> {
        Field(self.0.get(index).unwrap_or(&NULL))
    }

    /// Number of elements or entries; zero for scalars.
    #[must_use]
    pub fn len(self) -> usize {
        match self.0 {
            Value::Array(items) => items.len(),
            Value::Object(entries) => entries.len(),
            _ => 0,
        }
    }

    /// Returns `true` when [`Field::len`] is zero.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Returns `true` for `null`, including absent fields.
    #[must_use]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    /// Iterates array elements; scalars and objects yield nothing.
    pub fn iter(self) -> impl Iterator<Item = Field<'a>> {
        self.0
            .as_array()
            .into_iter()
            .flat_map(|items| items.iter().map(Field))
    }

    /// Borrowed string when the value is a string.
    #[must_use]
    pub fn as_str(self) -> Option<&'a str> {
        self.0.as_str()
    }

    /// Integer coercion. Floats truncate, booleans map to 0/1, numeric
    /// strings parse, anything else reads as zero.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self.0 {
            Value::Number(number) => number
                .as_i64()
                .or_else(|| number.as_u64().map(|value| i64::try_from(value).unwrap_or(i64::MAX)))
                .or_else(|| number.as_f64().map(truncate))
                .unwrap_or_default(),
            Value::Bool(flag) => i64::from(*flag),
            Value::String(text) => parse_integer(text),
            _ => 0,
        }
    }

    /// Floating-point coercion following the same rules as [`Field::as_i64`].
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self.0 {
            Value::Number(number) => number.as_f64().unwrap_or_default(),
            Value::Bool(flag) => f64::from(u8::from(*flag)),
            Value::String(text) => text.trim().parse().unwrap_or_default(),
            _ => 0.0,
        }
    }

    /// Boolean coercion: non-zero numbers and `"true"` are true.
    #[must_use]
    pub fn as_bool(self) -> bool {
        match self.0 {
            Value::Bool(flag) => *flag,
            Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
            Value::String(text) => text.eq_ignore_ascii_case("true") || parse_integer(text) != 0,
            _ => false,
        }
    }

    /// String coercion: strings verbatim, `null` as empty, scalars and
    /// containers in their JSON form.
    #[must_use]
    pub fn as_string(self) -> String {
        match self.0 {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Owned message holding a copy of this value.
    #[must_use]
    pub fn to_message(self) -> Message {
        Message::from(self.0.clone())
    }
}

impl fmt::Display for Field<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.0, formatter)
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "integer coercion truncates toward zero and saturates"
)]
fn truncate(value: f64) -> i64 {
    value as i64
}

fn parse_integer(text: &str) -> i64 {
    let trimmed = text.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().map(truncate))
        .unwrap_or_default()
}
