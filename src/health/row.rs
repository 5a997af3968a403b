//! Typed replication status row
//!
//! Raw status values arrive as text. Anything that parses as a base-10
//! `i64` becomes `Integer`, everything else stays `Text` verbatim, so lag
//! counters come out as JSON numbers and state strings as JSON strings.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};

/// One status column value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusValue {
    Integer(i64),
    Text(String),
}

impl StatusValue {
    /// Parse from raw text-protocol bytes; SQL NULL becomes empty text
    pub fn from_raw(raw: Option<&[u8]>) -> Self {
        let text = String::from_utf8_lossy(raw.unwrap_or_default());
        match text.parse::<i64>() {
            Ok(i) => StatusValue::Integer(i),
            Err(_) => StatusValue::Text(text.into_owned()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StatusValue::Integer(i) => Some(*i),
            StatusValue::Text(_) => None,
        }
    }
}

impl fmt::Display for StatusValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusValue::Integer(i) => write!(f, "{}", i),
            StatusValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for StatusValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StatusValue::Integer(i) => serializer.serialize_i64(*i),
            StatusValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Column name -> value, in result set order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRow {
    columns: Vec<(String, StatusValue)>,
}

impl StatusRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a column, replacing the value of an existing column in place
    pub fn insert(&mut self, name: impl Into<String>, value: StatusValue) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StatusValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatusValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Serialize for StatusRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Build a typed row from column names and raw values
///
/// Columns beyond the shorter of the two inputs are ignored.
pub fn normalize<N, V>(columns: &[N], raw_values: &[Option<V>]) -> StatusRow
where
    N: AsRef<str>,
    V: AsRef<[u8]>,
{
    let mut row = StatusRow::new();
    for (name, raw) in columns.iter().zip(raw_values) {
        row.insert(
            name.as_ref(),
            StatusValue::from_raw(raw.as_ref().map(|v| v.as_ref())),
        );
    }
    row
}
