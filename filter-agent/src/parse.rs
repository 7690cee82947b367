//! Lenient parsing of model output into a validated [`FilterSchema`].
//!
//! The contract is strict about structure (`semantic_query` string,
//! `confidence` number, optional `filters` object) and tolerant about values:
//! a value may be a string, a number or an array whose first usable element
//! is taken. Values that fail vocabulary validation are dropped and reported,
//! never propagated.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::errors::ParseError;
use crate::schema::{FilterSchema, PriceRange, SchemaField};
use crate::vocabulary::{AttributeVocabulary, normalize};

/// A value removed during validation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DroppedValue {
    pub field: String,
    pub value: String,
    pub reason: &'static str,
}

/// Parsed schema plus the values validation removed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExtraction {
    pub schema: FilterSchema,
    pub dropped: Vec<DroppedValue>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    semantic_query: Value,
    #[serde(default)]
    filters: Option<Value>,
    confidence: Value,
}

/// Strips markdown code fences around a JSON body.
pub fn cleanup_json_like(s: &str) -> &str {
    let mut t = s.trim();
    if let Some(rest) = t.strip_prefix("```") {
        t = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(pos) = t.rfind("```") {
            t = &t[..pos];
        }
    }
    t.trim()
}

/// Parses `raw` and validates every value against `vocab`.
///
/// # Errors
/// [`ParseError`] when the text is not a JSON object honouring the contract;
/// callers treat this like a provider failure.
pub fn parse_completion(
    raw: &str,
    vocab: &AttributeVocabulary,
    query: &str,
) -> Result<ParsedExtraction, ParseError> {
    let body = cleanup_json_like(raw);
    let raw: RawExtraction =
        serde_json::from_str(body).map_err(|e| ParseError::NotJson(e.to_string()))?;

    let semantic_query = match &raw.semantic_query {
        Value::String(s) => s.split_whitespace().collect::<Vec<_>>().join(" "),
        _ => return Err(ParseError::Contract("`semantic_query` must be a string".into())),
    };
    let confidence = match raw.confidence.as_f64() {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0) as f32,
        _ => return Err(ParseError::Contract("`confidence` must be a number".into())),
    };
    let filters = match raw.filters {
        None | Some(Value::Null) => serde_json::Map::new(),
        Some(Value::Object(m)) => m,
        Some(_) => return Err(ParseError::Contract("`filters` must be an object".into())),
    };

    let mut schema = FilterSchema {
        semantic_query: if semantic_query.is_empty() {
            query.trim().to_string()
        } else {
            semantic_query
        },
        confidence,
        ..FilterSchema::default()
    };
    let mut dropped = Vec::new();
    let mut extras: BTreeMap<String, String> = BTreeMap::new();

    for (name, value) in filters {
        let key = normalize(&name);
        if let Some(field) = SchemaField::ALL.into_iter().find(|f| f.as_str() == key) {
            let Some(text) = scalar_text(&value) else {
                continue;
            };
            match vocab.binding(field) {
                Some(binding) => match binding.canonicalize(&text) {
                    Some(v) => schema.set_field(field, Some(v)),
                    None => dropped.push(DroppedValue {
                        field: field.to_string(),
                        value: text,
                        reason: "not in allowed values",
                    }),
                },
                // Unbound fields stay in the schema; the assembler counts and drops them.
                None => schema.set_field(field, Some(text)),
            }
        } else if key == "price" {
            match price_range(&value) {
                Some(r) => schema.price = Some(r),
                None if !value.is_null() => dropped.push(DroppedValue {
                    field: "price".into(),
                    value: value.to_string(),
                    reason: "no usable numeric bound",
                }),
                None => {}
            }
        } else if key == "attributes" {
            if let Value::Object(m) = value {
                for (n, v) in m {
                    if let Some(text) = scalar_text(&v) {
                        extras.insert(normalize(&n), text);
                    }
                }
            }
        } else if let Some(text) = scalar_text(&value) {
            extras.insert(key, text);
        }
    }
    schema.attributes = extras;

    for d in &dropped {
        warn!(
            target: "filter_agent::validate",
            field = %d.field,
            value = %d.value,
            reason = d.reason,
            "extracted value dropped"
        );
    }

    Ok(ParsedExtraction { schema, dropped })
}

/// Coerces a JSON value into trimmed, non-empty text.
fn scalar_text(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.split_whitespace().collect::<Vec<_>>().join(" "),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => return items.iter().find_map(scalar_text),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .parse()
            .ok(),
        _ => None,
    }
}

fn price_range(v: &Value) -> Option<PriceRange> {
    match v {
        Value::Object(m) => {
            // (name, exclusive); inclusive spellings win when both are present.
            let pick = |names: &[(&str, bool)]| {
                names
                    .iter()
                    .find_map(|(n, strict)| m.get(*n).and_then(number).map(|x| (Some(x), *strict)))
                    .unwrap_or((None, false))
            };
            PriceRange::bounded(
                pick(&[("min", false), ("gte", false), ("gt", true)]),
                pick(&[("max", false), ("lte", false), ("lt", true)]),
            )
        }
        other => number(other).and_then(|x| PriceRange::new(Some(x), Some(x))),
    }
}
