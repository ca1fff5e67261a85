use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Field that holds the input line on a freshly created event.
pub const MESSAGE_FIELD: &str = "message";

/// A field value carried by an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Normalized instant; only produced by stages, never parsed from config.
    #[serde(skip_deserializing)]
    Timestamp(DateTime<Utc>),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => {
                write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::List(_) | Value::Map(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                write!(f, "{}", json)
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

/// One structured log record moving through the pipeline.
///
/// Events are always moved, never shared: whoever holds the value is the only
/// party allowed to mutate it. Serializes as a flat JSON object of its fields
/// plus a `tags` array when any tag is set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub fields: IndexMap<String, Value>,
    /// The unparsed input line, kept until a stage takes it.
    pub raw: Option<String>,
    pub tags: IndexSet<String>,
}

const TAGS_KEY: &str = "tags";

/// A field named `tags` and the event's tag set share one key: the field's
/// value comes first, then the tags. Each key appears once.
impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let tags_field = self.fields.contains_key(TAGS_KEY);
        let extra = usize::from(!self.tags.is_empty() && !tags_field);
        let mut map = serializer.serialize_map(Some(self.fields.len() + extra))?;
        for (key, value) in &self.fields {
            if key == TAGS_KEY && !self.tags.is_empty() {
                let mut merged = match value {
                    Value::List(items) => items.clone(),
                    other => vec![other.clone()],
                };
                merged.extend(self.tags.iter().cloned().map(Value::Text));
                map.serialize_entry(key, &merged)?;
            } else {
                map.serialize_entry(key, value)?;
            }
        }
        if extra == 1 {
            map.serialize_entry(TAGS_KEY, &self.tags)?;
        }
        map.end()
    }
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap one input line. The line is kept as `raw` and copied into the
    /// `message` field.
    pub fn from_line(line: impl Into<String>) -> Self {
        let line = line.into();
        let mut fields = IndexMap::new();
        fields.insert(MESSAGE_FIELD.to_string(), Value::Text(line.clone()));
        Event {
            fields,
            raw: Some(line),
            tags: IndexSet::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Remove a field, keeping the order of the remaining ones.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn take_raw(&mut self) -> Option<String> {
        self.raw.take()
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.insert(tag.into());
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.shift_remove(tag)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
