//! A [`Record`] backed by a JSON attribute map.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use crate::schema::Schema;
use crate::visibility::{Record, RelatedMut};

/// A loaded relation value.
#[derive(Debug, Clone)]
pub enum Related {
    One(Box<Row>),
    Many(Vec<Row>),
    Null,
}

impl Related {
    pub fn to_json(&self) -> JsonValue {
        match self {
            Related::One(row) => row.to_json(),
            Related::Many(rows) => JsonValue::Array(rows.iter().map(Row::to_json).collect()),
            Related::Null => JsonValue::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    attributes: Map<String, JsonValue>,
    relations: BTreeMap<String, Related>,
    visible: Option<Vec<String>>,
    appends: Vec<String>,
}

impl Row {
    /// A row from a fetched JSON object. Non-object values give an empty
    /// row.
    pub fn new(schema: Arc<Schema>, attributes: JsonValue) -> Self {
        let attributes = match attributes {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            schema,
            attributes,
            relations: BTreeMap::new(),
            visible: None,
            appends: Vec::new(),
        }
    }

    pub fn with_relation(mut self, name: impl Into<String>, related: Related) -> Self {
        self.relations.insert(name.into(), related);
        self
    }

    pub fn attributes(&self) -> &Map<String, JsonValue> {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.attributes.get(key)
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn visible(&self) -> Option<&[String]> {
        self.visible.as_deref()
    }

    pub fn appends(&self) -> &[String] {
        &self.appends
    }

    fn is_visible(&self, key: &str) -> bool {
        match &self.visible {
            Some(visible) => visible.iter().any(|v| v == key),
            None => true,
        }
    }

    /// Visible attributes, computed appends and loaded relations.
    pub fn to_json(&self) -> JsonValue {
        let mut out = Map::new();
        for (key, value) in &self.attributes {
            if self.is_visible(key) {
                out.insert(key.clone(), value.clone());
            }
        }
        for append in &self.appends {
            if !self.is_visible(append) {
                continue;
            }
            match self.schema.accessor(append) {
                Some(accessor) => {
                    out.insert(append.clone(), accessor(&self.attributes));
                }
                None => tracing::debug!(schema = self.schema.name(), append, "append has no accessor"),
            }
        }
        for (name, related) in &self.relations {
            if self.is_visible(name) {
                out.insert(name.clone(), related.to_json());
            }
        }
        JsonValue::Object(out)
    }
}

impl Record for Row {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn set_visible(&mut self, fields: Vec<String>) {
        self.visible = Some(fields);
    }

    fn set_appends(&mut self, appends: Vec<String>) {
        self.appends = appends;
    }

    fn related_mut(&mut self, relation: &str) -> Option<RelatedMut<'_>> {
        match self.relations.get_mut(relation)? {
            Related::One(row) => Some(RelatedMut::One(row.as_mut())),
            Related::Many(rows) => Some(RelatedMut::Many(
                rows.iter_mut().map(|row| row as &mut dyn Record).collect(),
            )),
            Related::Null => None,
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Arc<Schema> {
        Schema::builder("record-test-user", "users")
            .append_with("full_name", ["first", "last"], |attrs| {
                let part = |k: &str| attrs.get(k).and_then(JsonValue::as_str).unwrap_or_default().to_string();
                json!(format!("{} {}", part("first"), part("last")))
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_unrestricted_row_serializes_everything_loaded() {
        let row = Row::new(schema(), json!({"first": "Ada", "last": "Lovelace"}));
        assert_eq!(row.to_json(), json!({"first": "Ada", "last": "Lovelace"}));
        assert_eq!(serde_json::to_value(&row).unwrap(), row.to_json());
    }

    #[test]
    fn test_appends_are_computed_when_set() {
        let mut row = Row::new(schema(), json!({"first": "Ada", "last": "Lovelace"}));
        row.set_appends(vec!["full_name".to_string()]);
        row.set_visible(vec!["full_name".to_string()]);
        assert_eq!(row.to_json(), json!({"full_name": "Ada Lovelace"}));
    }

    #[test]
    fn test_non_object_attributes() {
        let row = Row::new(schema(), json!([1, 2]));
        assert!(row.attributes().is_empty());
        assert_eq!(row.get("first"), None);
    }

    #[test]
    fn test_related_access() {
        let mut row = Row::new(schema(), json!({"id": 1}))
            .with_relation("manager", Related::Null)
            .with_relation("friends", Related::Many(vec![Row::new(schema(), json!({"id": 2}))]));
        assert!(row.related_mut("manager").is_none());
        assert!(row.related_mut("missing").is_none());
        assert!(matches!(row.related_mut("friends"), Some(RelatedMut::Many(v)) if v.len() == 1));
        assert!(matches!(row.relation("manager"), Some(Related::Null)));
    }
}
