//! Labeled query sets.
//!
//! File format:
//! `{"test_queries": [{"query": "...", "query_type": "...", "relevant_ids": [...], "relevant_names": [...]}]}`
//! where `query_type` and `relevant_names` are optional and ids may be
//! strings or integers.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{EvalError, Result};

/// One query with the ids a correct search should return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledQuery {
    pub query: String,
    #[serde(default = "unknown_type")]
    pub query_type: String,
    #[serde(deserialize_with = "ids")]
    pub relevant_ids: Vec<String>,
    #[serde(default)]
    pub relevant_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetFile {
    #[serde(default)]
    test_queries: Vec<LabeledQuery>,
}

fn unknown_type() -> String {
    "unknown".to_string()
}

fn ids<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Num(i64),
    }
    let raw: Vec<Id> = Vec::deserialize(d)?;
    Ok(raw
        .into_iter()
        .map(|id| match id {
            Id::Text(s) => s.trim().to_string(),
            Id::Num(n) => n.to_string(),
        })
        .collect())
}

/// Parses a dataset from JSON text.
pub fn parse_dataset(text: &str) -> Result<Vec<LabeledQuery>> {
    let file: DatasetFile = serde_json::from_str(text)?;
    for (i, q) in file.test_queries.iter().enumerate() {
        if q.query.trim().is_empty() {
            return Err(EvalError::Dataset(format!("test_queries[{i}]: empty query")));
        }
    }
    Ok(file.test_queries)
}

/// Reads and parses a dataset file.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<LabeledQuery>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| EvalError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_dataset(&text)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_optional_fields_and_numeric_ids() {
        let qs = parse_dataset(
            r#"{"test_queries": [
                {"query": "vase noir", "query_type": "color", "relevant_ids": ["p1", 42], "relevant_names": ["Vase noir"]},
                {"query": "lampe", "relevant_ids": []}
            ]}"#,
        )
        .unwrap();

        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].relevant_ids, vec!["p1", "42"]);
        assert_eq!(qs[1].query_type, "unknown");
        assert!(qs[1].relevant_names.is_empty());
    }

    #[test]
    fn empty_file_object_is_an_empty_set() {
        assert!(parse_dataset("{}").unwrap().is_empty());
    }

    #[test]
    fn blank_query_is_rejected() {
        let err = parse_dataset(r#"{"test_queries": [{"query": " ", "relevant_ids": []}]}"#).unwrap_err();
        assert!(matches!(err, EvalError::Dataset(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"test_queries": [{{"query": "vase", "relevant_ids": ["a"]}}]}}"#).unwrap();
        assert_eq!(load_dataset(f.path()).unwrap().len(), 1);
        assert!(matches!(load_dataset("/nonexistent/set.json"), Err(EvalError::Io { .. })));
    }
}
