use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum MergeMode {
    /// A finished job's result document becomes the whole result set.
    #[default]
    Replace,
    /// Each finished job's result entries are added after the existing ones.
    Append,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

/// One design in a result set. The payload is opaque apart from the `links`
/// array that save runs maintain on object entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultEntry(pub Value);

impl ResultEntry {
    pub fn links(&self) -> Vec<&str> {
        self.0
            .get("links")
            .and_then(Value::as_array)
            .map(|links| links.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Records `link` unless it is already present. Returns whether the entry
    /// changed; entries that are not JSON objects cannot carry links.
    pub fn add_link(&mut self, link: &str) -> bool {
        let Value::Object(object) = &mut self.0 else {
            return false;
        };

        let links = object
            .entry("links")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !links.is_array() {
            *links = Value::Array(Vec::new());
        }
        let Value::Array(links) = links else {
            return false;
        };

        if links.iter().any(|existing| existing.as_str() == Some(link)) {
            return false;
        }
        links.push(Value::String(link.to_string()));
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    entries: Vec<ResultEntry>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrays contribute one entry per element, `null` contributes nothing and
    /// any other document is a single entry.
    pub fn from_document(document: Value) -> Self {
        let entries = match document {
            Value::Null => Vec::new(),
            Value::Array(items) => items.into_iter().map(ResultEntry).collect(),
            other => vec![ResultEntry(other)],
        };
        Self { entries }
    }

    pub fn extend(&mut self, other: ResultSet) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ResultEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.entries.iter().map(|entry| entry.0.clone()).collect())
    }
}
