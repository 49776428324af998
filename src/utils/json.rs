use std::fs;
use std::path::Path;

use mongodb::bson::{Bson, Document};
use serde_json::Value;

use crate::error::{Error, Result};

/// Convert a JSON value (relaxed or canonical extended JSON) to a document
pub fn json_to_document(value: Value) -> Result<Document> {
    match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(Error::Fixture(format!(
            "expected a JSON object, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(Error::Fixture(e.to_string())),
    }
}

/// Convert a document back to relaxed extended JSON
pub fn document_to_json(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

/// Parse a fixture: a JSON array of flight records.
pub fn parse_fixture(content: &str) -> Result<Vec<Document>> {
    let value: Value =
        serde_json::from_str(content).map_err(|e| Error::Fixture(format!("invalid JSON: {}", e)))?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                json_to_document(item)
                    .map_err(|e| Error::Fixture(format!("record {}: {}", i, e)))
            })
            .collect(),
        _ => Err(Error::Fixture(
            "fixture must be a JSON array of records".to_string(),
        )),
    }
}

pub fn load_fixture(path: &Path) -> Result<Vec<Document>> {
    let content = fs::read_to_string(path)?;
    parse_fixture(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde_json::json;

    #[test]
    fn fixture_numbers_keep_their_types() {
        let docs = parse_fixture(r#"[{"year": 2020, "arr_delay": 12.5, "dest": {"code": "SFO"}}]"#)
            .unwrap();
        assert_eq!(
            docs,
            vec![doc! {"year": 2020, "arr_delay": 12.5, "dest": {"code": "SFO"}}]
        );
    }

    #[test]
    fn non_array_fixture_is_rejected() {
        let err = parse_fixture(r#"{"year": 2020}"#).unwrap_err();
        assert!(err.to_string().contains("JSON array"));
    }

    #[test]
    fn non_object_record_reports_its_index() {
        let err = parse_fixture(r#"[{"a": 1}, 5]"#).unwrap_err();
        assert!(err.to_string().contains("record 1"));
    }

    #[test]
    fn document_back_to_json() {
        assert_eq!(
            document_to_json(doc! {"airline": "UA", "n": 3}),
            json!({"airline": "UA", "n": 3})
        );
    }
}
