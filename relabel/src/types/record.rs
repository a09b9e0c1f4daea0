use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the attribute appended to a record's first tag when relabeling.
pub const USERNAME_ATTRIBUTE: &str = "username";

/// Store-assigned identifier of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl RecordId {
    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        RecordId(value)
    }
}

/// A stored entity with an ordered set of tags and named attributes.
///
/// Tags keep insertion order, so the first tag is always `tags[0]`. Adding a tag that is
/// already present and removing one that is absent are both no-ops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            tags: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn first_tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Adds `tag` at the end of the tag list. Returns `false` if it was already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if self.has_tag(&tag) {
            return false;
        }

        self.tags.push(tag);
        true
    }

    /// Removes `tag`. Returns `false` if it was not present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    /// Renders an attribute for use inside a tag.
    ///
    /// Strings render as their raw contents, other values as JSON text. `null` counts as absent.
    pub fn render_attribute(&self, name: &str) -> Option<String> {
        match self.attributes.get(name)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(value) => Some(value.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tags_behave_as_an_ordered_set() {
        let mut record = Record::new(RecordId(1)).with_tag("Person").with_tag("Admin");

        assert!(!record.add_tag("Person"));
        assert_eq!(record.tags, vec!["Person", "Admin"]);
        assert_eq!(record.first_tag(), Some("Person"));

        assert!(record.remove_tag("Person"));
        assert!(!record.remove_tag("Person"));
        assert_eq!(record.first_tag(), Some("Admin"));
    }

    #[test]
    fn renders_attributes_as_text() {
        let record = Record::new(RecordId(1))
            .with_attribute("username", "person_1")
            .with_attribute("age", 42)
            .with_attribute("active", true)
            .with_attribute("nickname", json!(null));

        assert_eq!(record.render_attribute("username").as_deref(), Some("person_1"));
        assert_eq!(record.render_attribute("age").as_deref(), Some("42"));
        assert_eq!(record.render_attribute("active").as_deref(), Some("true"));
        assert_eq!(record.render_attribute("nickname"), None);
        assert_eq!(record.render_attribute("missing"), None);
    }
}
