//! Product document model read from Qdrant payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::StoreError;

/// One `{key, value}` element of a product's attribute sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub key: String,
    pub value: String,
}

/// Product as stored in the collection (embedding excluded).
///
/// Invariant: `attributes` holds at most one record per key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub id: String,
    pub name: String,
    pub brand: Option<String>,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub attributes: Vec<AttributeRecord>,
    /// Full payload, for fields the typed view does not cover.
    #[serde(skip)]
    pub payload: Value,
}

/// Search hit: document plus similarity score.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredDocument {
    pub score: f32,
    pub doc: ProductDocument,
}

impl ProductDocument {
    /// Builds the typed view of a payload.
    ///
    /// `point_id` is used when the payload has no `id`. The `attributes`
    /// field may be an array of `{key, value}` objects or a flat object;
    /// repeated keys keep their first value.
    ///
    /// # Errors
    /// [`StoreError::Payload`] when the payload is not a JSON object.
    pub fn from_payload(point_id: &str, mut payload: Value) -> Result<Self, StoreError> {
        let obj = payload
            .as_object_mut()
            .ok_or_else(|| StoreError::Payload(format!("point {point_id}: payload is not an object")))?;
        obj.retain(|k, _| !k.starts_with("embedding"));

        let id = obj
            .get("id")
            .and_then(scalar_string)
            .unwrap_or_else(|| point_id.to_string());
        let name = obj.get("name").and_then(scalar_string).unwrap_or_default();
        let brand = obj.get("brand").and_then(scalar_string);
        let categories = obj.get("categories").map(strings).unwrap_or_default();
        let keywords = obj.get("keywords").map(strings).unwrap_or_default();
        let (price, currency) = match obj.get("price") {
            Some(Value::Object(p)) => (
                p.get("amount").and_then(Value::as_f64),
                p.get("currency").and_then(scalar_string),
            ),
            Some(v) => (v.as_f64(), obj.get("currency").and_then(scalar_string)),
            None => (None, obj.get("currency").and_then(scalar_string)),
        };
        let attributes = obj
            .get("attributes")
            .map(|a| attribute_records(&id, a))
            .unwrap_or_default();

        Ok(Self {
            id,
            name,
            brand,
            categories,
            keywords,
            price,
            currency,
            attributes,
            payload,
        })
    }

    /// Value stored under attribute `key`, if any.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }

    /// String values found at a dotted payload path (scalars or arrays).
    pub fn values_at(&self, path: &str) -> Vec<String> {
        lookup(&self.payload, path).map(strings).unwrap_or_default()
    }

    /// Numeric value at a dotted payload path.
    pub fn number_at(&self, path: &str) -> Option<f64> {
        lookup(&self.payload, path).and_then(Value::as_f64)
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |v, seg| v.get(seg))
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn strings(v: &Value) -> Vec<String> {
    match v {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

fn attribute_records(doc_id: &str, v: &Value) -> Vec<AttributeRecord> {
    let pairs: Vec<(String, String)> = match v {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let key = item.get("key").and_then(scalar_string)?;
                let value = item.get("value").and_then(|v| strings(v).into_iter().next())?;
                Some((key, value))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(k, v)| Some((k.clone(), strings(v).into_iter().next()?)))
            .collect(),
        _ => Vec::new(),
    };

    let mut out: Vec<AttributeRecord> = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        if out.iter().any(|a| a.key == key) {
            warn!(target: "product_store::record", doc = %doc_id, %key, "duplicate attribute key; keeping first");
            continue;
        }
        out.push(AttributeRecord { key, value });
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_attribute_pattern_payload() {
        let doc = ProductDocument::from_payload(
            "0b4c",
            json!({
                "id": "vase-ceramique-noir",
                "name": "VASE EN CERAMIQUE NOIR",
                "brand": "orca deco",
                "categories": ["Vase"],
                "keywords": ["Céramique", "Noir"],
                "price": {"amount": 12500, "currency": "XOF"},
                "attributes": [
                    {"key": "couleur", "value": "Noir"},
                    {"key": "materiau", "value": "Céramique"},
                    {"key": "couleur", "value": "Doré"}
                ],
                "embedding_gemini_004": [0.1, 0.2]
            }),
        )
        .unwrap();

        assert_eq!(doc.id, "vase-ceramique-noir");
        assert_eq!(doc.price, Some(12500.0));
        assert_eq!(doc.currency.as_deref(), Some("XOF"));
        assert_eq!(doc.attributes.len(), 2);
        assert_eq!(doc.attribute("couleur"), Some("Noir"));
        assert!(doc.payload.get("embedding_gemini_004").is_none());
        assert_eq!(doc.values_at("categories"), vec!["Vase".to_string()]);
        assert_eq!(doc.number_at("price.amount"), Some(12500.0));
    }

    #[test]
    fn flat_attribute_object_takes_first_array_value() {
        let doc = ProductDocument::from_payload(
            "7",
            json!({"name": "Lampe", "attributes": {"color": ["Blanc", "Doré"], "material": "Métal"}}),
        )
        .unwrap();

        assert_eq!(doc.id, "7");
        assert_eq!(doc.attribute("color"), Some("Blanc"));
        assert_eq!(doc.attribute("material"), Some("Métal"));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        assert!(ProductDocument::from_payload("1", json!([1, 2])).is_err());
    }
}
