use serde::ser::{Serialize, SerializeMap, Serializer};

/// The value of one extracted field
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// The selector matched nothing
    Missing,
    Text(String),
    List(Vec<String>),
    /// Records produced by a nested schema, page metadata or images
    Records(Vec<Record>),
    /// Structured data embedded in the page (JSON-LD)
    Json(serde_json::Value),
}

impl FieldValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Returns the text of a `Text` value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// An extracted record: field names mapped to values, in schema order
///
/// Records are immutable once produced; annotation builds a new record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Shortcut for `get(name)` on a text value
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// Field names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Returns a copy of this record with `leading` fields placed first
    ///
    /// Existing fields with the same names are dropped.
    pub fn prefixed(self, leading: Vec<(String, FieldValue)>) -> Self {
        let mut fields = leading;
        for (name, value) in self.fields {
            if !fields.iter().any(|(existing, _)| *existing == name) {
                fields.push((name, value));
            }
        }
        Self { fields }
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
