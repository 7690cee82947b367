//! Per-deployment binding of schema fields to catalogue keys.
//!
//! One vocabulary feeds both the extraction prompt (which fields exist, which
//! values are allowed, few-shot examples) and the query assembler (which key
//! or payload field a schema field is matched against). It is immutable once
//! a pipeline is built; wrap it in an `Arc` to share.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::VocabularyError;
use crate::schema::SchemaField;

const FRENCH_PRESET: &str = include_str!("../vocabularies/french.yaml");
const ENGLISH_PRESET: &str = include_str!("../vocabularies/english.yaml");

/// Where a bound field lives in a product document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldTarget {
    /// An element of the `attributes: [{key, value}]` array.
    Attribute,
    /// A top-level payload field (string or array of strings).
    Field,
}

/// Binding of one [`SchemaField`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub target: FieldTarget,
    /// Attribute key (for [`FieldTarget::Attribute`]) or payload path.
    pub key: String,
    /// Closed value set; empty means any non-empty value is accepted.
    #[serde(default)]
    pub allowed_values: Vec<String>,
    /// Example values shown to the model.
    #[serde(default)]
    pub hints: Vec<String>,
}

impl FieldBinding {
    /// Canonical spelling of `value` if it is allowed.
    ///
    /// Comparison is case-insensitive and whitespace-tolerant; open bindings
    /// return the trimmed input.
    pub fn canonicalize(&self, value: &str) -> Option<String> {
        let wanted = normalize(value);
        if wanted.is_empty() {
            return None;
        }
        if self.allowed_values.is_empty() {
            return Some(collapse_ws(value));
        }
        self.allowed_values
            .iter()
            .find(|allowed| normalize(allowed) == wanted)
            .cloned()
    }
}

/// Few-shot example: a query and the expected JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub query: String,
    pub output: serde_json::Value,
}

/// Attribute vocabulary of one deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeVocabulary {
    pub name: String,
    /// Language of the catalogue values, used as a hint in the prompt.
    pub language: String,
    /// Currency of the price field.
    pub currency: String,
    /// Payload path of the numeric price.
    pub price_path: String,
    pub fields: BTreeMap<SchemaField, FieldBinding>,
    /// Extra attribute names the model may emit, mapped to their stored keys.
    #[serde(default)]
    pub extra_attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub examples: Vec<FewShotExample>,
}

impl AttributeVocabulary {
    /// Built-in vocabulary with English attribute keys.
    pub fn english() -> Result<Self, VocabularyError> {
        Self::from_yaml_str(ENGLISH_PRESET)
    }

    /// Built-in vocabulary with French attribute keys (`couleur`, `materiau`, `forme`).
    pub fn french() -> Result<Self, VocabularyError> {
        Self::from_yaml_str(FRENCH_PRESET)
    }

    /// Resolves a preset name (`english`, `en`, `french`, `fr`) or a YAML file path.
    pub fn load(name_or_path: &str) -> Result<Self, VocabularyError> {
        match name_or_path.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Self::english(),
            "french" | "fr" => Self::french(),
            _ => Self::from_yaml_file(name_or_path.trim()),
        }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, VocabularyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| VocabularyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, VocabularyError> {
        let vocab: Self = serde_yml::from_str(text)?;
        vocab.validate()?;
        Ok(vocab)
    }

    /// Checks that keys are non-empty and unique per target.
    pub fn validate(&self) -> Result<(), VocabularyError> {
        if self.price_path.trim().is_empty() {
            return Err(VocabularyError::Invalid("price_path must not be empty".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for (field, binding) in &self.fields {
            if binding.key.trim().is_empty() {
                return Err(VocabularyError::Invalid(format!("empty key for field `{field}`")));
            }
            if !seen.insert((binding.target == FieldTarget::Attribute, binding.key.as_str())) {
                return Err(VocabularyError::Invalid(format!(
                    "key `{}` is bound more than once",
                    binding.key
                )));
            }
        }
        for (name, key) in &self.extra_attributes {
            if name.trim().is_empty() || key.trim().is_empty() {
                return Err(VocabularyError::Invalid("empty extra attribute mapping".into()));
            }
            if !seen.insert((true, key.as_str())) {
                return Err(VocabularyError::Invalid(format!(
                    "key `{key}` is bound more than once"
                )));
            }
        }
        Ok(())
    }

    pub fn binding(&self, field: SchemaField) -> Option<&FieldBinding> {
        self.fields.get(&field)
    }

    /// Stored attribute key for an extra attribute emitted by the model.
    pub fn extra_key(&self, name: &str) -> Option<&str> {
        let wanted = normalize(name);
        self.extra_attributes
            .iter()
            .find(|(n, _)| normalize(n) == wanted)
            .map(|(_, k)| k.as_str())
    }
}

/// Case-folded, trimmed, whitespace-collapsed form used for comparisons.
pub fn normalize(value: &str) -> String {
    collapse_ws(value).to_lowercase()
}

fn collapse_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_parse_and_bind_language_specific_keys() {
        let fr = AttributeVocabulary::french().unwrap();
        assert_eq!(fr.binding(SchemaField::Color).unwrap().key, "couleur");
        assert_eq!(fr.binding(SchemaField::Material).unwrap().key, "materiau");
        assert_eq!(fr.currency, "XOF");

        let en = AttributeVocabulary::english().unwrap();
        assert_eq!(en.binding(SchemaField::Color).unwrap().key, "color");
        assert_eq!(en.binding(SchemaField::Category).unwrap().target, FieldTarget::Field);
    }

    #[test]
    fn closed_binding_returns_canonical_spelling() {
        let fr = AttributeVocabulary::french().unwrap();
        let cat = fr.binding(SchemaField::Category).unwrap();
        assert_eq!(cat.canonicalize("  vase "), Some("Vase".into()));
        assert_eq!(cat.canonicalize("sacs  à main"), Some("Sacs à Main".into()));
        assert_eq!(cat.canonicalize("Spaceship"), None);
    }

    #[test]
    fn open_binding_accepts_any_non_empty_value() {
        let fr = AttributeVocabulary::french().unwrap();
        let color = fr.binding(SchemaField::Color).unwrap();
        assert_eq!(color.canonicalize(" Bleu  nuit "), Some("Bleu nuit".into()));
        assert_eq!(color.canonicalize("   "), None);
    }

    #[test]
    fn loads_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.yaml");
        std::fs::write(
            &path,
            "name: t\nlanguage: English\ncurrency: EUR\nprice_path: price\nfields:\n  color:\n    target: attribute\n    key: colour\n",
        )
        .unwrap();

        let v = AttributeVocabulary::load(path.to_str().unwrap()).unwrap();
        assert_eq!(v.binding(SchemaField::Color).unwrap().key, "colour");
        assert!(v.binding(SchemaField::Shape).is_none());
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let yaml = "name: t\nlanguage: x\ncurrency: EUR\nprice_path: price\nfields:\n  color:\n    target: attribute\n    key: k\n  shape:\n    target: attribute\n    key: k\n";
        assert!(matches!(
            AttributeVocabulary::from_yaml_str(yaml),
            Err(VocabularyError::Invalid(_))
        ));
    }

    #[test]
    fn extra_key_lookup_is_case_insensitive() {
        let fr = AttributeVocabulary::french().unwrap();
        assert_eq!(fr.extra_key("Style"), Some("style"));
        assert_eq!(fr.extra_key("finish"), None);
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            AttributeVocabulary::load("/nonexistent/vocab.yaml"),
            Err(VocabularyError::Io { .. })
        ));
    }
}
