//! Harvested item data structures.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single extracted field value.
///
/// Extraction always yields text; transforms may narrow a field to a count
/// or a flag at merge time. Serialized untagged so exports read naturally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Count(u64),
    Text(String),
}

impl FieldValue {
    /// Borrow the text content, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content, if this is a count.
    pub fn as_count(&self) -> Option<u64> {
        match self {
            FieldValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// Render for tabular output.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Count(n) => n.to_string(),
            FieldValue::Flag(b) => b.to_string(),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

/// An item as returned by the extraction script, before any processing.
///
/// The script emits one object per rendered container with a `_index`
/// position and a string value per configured field; fields whose selector
/// matched nothing are simply absent.
#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    #[serde(rename = "_index")]
    pub index: usize,

    #[serde(flatten)]
    pub fields: IndexMap<String, String>,
}

impl RawItem {
    /// Raw value of a field, if extracted.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// A harvested item after identity normalization, transforms, and filtering.
///
/// Immutable once merged into the collection state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Position in the DOM at extraction time. Only meaningful within the
    /// extraction round that produced it; virtualization reshuffles indices.
    #[serde(rename = "_index")]
    pub index: usize,

    /// Field name to value, in template declaration order.
    #[serde(flatten)]
    pub fields: IndexMap<String, FieldValue>,
}

impl Item {
    /// Look up a field value.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text content of a field, empty if missing or non-text.
    pub fn text(&self, name: &str) -> &str {
        self.field(name).and_then(FieldValue::as_text).unwrap_or("")
    }

    /// Count content of a field, zero if missing or non-numeric.
    pub fn count(&self, name: &str) -> u64 {
        self.field(name).and_then(FieldValue::as_count).unwrap_or(0)
    }

    /// Render a field for tabular output, empty if missing.
    pub fn render_field(&self, name: &str) -> String {
        self.field(name).map(FieldValue::render).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_item_deserializes_from_script_shape() {
        let json = r#"{"_index": 3, "id": "/u/status/42", "text": "hello", "likes": "1,204"}"#;
        let raw: RawItem = serde_json::from_str(json).unwrap();
        assert_eq!(raw.index, 3);
        assert_eq!(raw.field("id"), Some("/u/status/42"));
        assert_eq!(raw.field("likes"), Some("1,204"));
        assert_eq!(raw.field("missing"), None);
    }

    #[test]
    fn field_value_untagged_roundtrip() {
        let values = vec![
            FieldValue::Text("a".into()),
            FieldValue::Count(42),
            FieldValue::Flag(true),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"["a",42,true]"#);
        let back: Vec<FieldValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn item_field_accessors() {
        let mut fields = IndexMap::new();
        fields.insert("text".to_string(), FieldValue::Text("body".into()));
        fields.insert("likes".to_string(), FieldValue::Count(7));
        let item = Item { index: 0, fields };

        assert_eq!(item.text("text"), "body");
        assert_eq!(item.count("likes"), 7);
        assert_eq!(item.count("text"), 0);
        assert_eq!(item.render_field("likes"), "7");
        assert_eq!(item.render_field("absent"), "");
    }
}
