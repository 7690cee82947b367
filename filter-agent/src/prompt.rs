//! Extraction prompt built from the active vocabulary.

use std::fmt::Write as _;

use crate::schema::SchemaField;
use crate::vocabulary::{AttributeVocabulary, FieldTarget};

/// Prompt pair sent to a completion slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const SYSTEM: &str = "You extract search filters and a semantic query from shopping requests \
for a product catalogue. Reply with ONE JSON object and nothing else: no markdown, no prose.";

/// Builds the prompt for `query`.
///
/// Only fields bound in `vocab` are offered to the model, together with their
/// allowed values or value hints, the price currency and the vocabulary's
/// few-shot examples.
pub fn build_prompt(vocab: &AttributeVocabulary, query: &str) -> Prompt {
    let mut p = String::with_capacity(4096);

    let _ = writeln!(p, "Catalogue language: {}. Prices are in {}.", vocab.language, vocab.currency);
    p.push('\n');
    p.push_str("FILTER FIELDS (omit a field when the request does not state it):\n");
    for field in SchemaField::ALL {
        let Some(binding) = vocab.binding(field) else {
            continue;
        };
        let _ = write!(p, "- {}: {}", field, describe(field));
        if !binding.allowed_values.is_empty() {
            let _ = write!(p, " MUST be one of: {}.", binding.allowed_values.join(", "));
        } else if !binding.hints.is_empty() {
            let _ = write!(p, " e.g. {}.", binding.hints.join(", "));
        }
        if binding.target == FieldTarget::Attribute {
            p.push_str(" Write the value in the catalogue language.");
        }
        p.push('\n');
    }
    let _ = writeln!(
        p,
        "- price: {{\"min\": number, \"max\": number}} in {}; either bound may be omitted. Numbers only, no currency text.",
        vocab.currency
    );
    if !vocab.extra_attributes.is_empty() {
        let names: Vec<&str> = vocab.extra_attributes.keys().map(String::as_str).collect();
        let _ = writeln!(
            p,
            "- attributes: object for other explicit attributes; known names: {}.",
            names.join(", ")
        );
    }

    p.push_str(
        "\nPRICE WORDING:\n\
         - \"between X and Y\" -> {\"min\": X, \"max\": Y}\n\
         - \"under X\", \"at most X\", \"not more than X\" -> {\"max\": X}\n\
         - \"from X\", \"at least X\", \"more than X\" -> {\"min\": X}\n\
         - vague wording (\"cheap\", \"luxury\") sets no price bound\n",
    );

    p.push_str(
        "\nOUTPUT FORMAT:\n\
         {\"semantic_query\": \"<what the shopper looks for, enriched for vector search>\", \
         \"filters\": {<only the fields above>}, \"confidence\": <0..1>}\n",
    );

    if !vocab.examples.is_empty() {
        p.push_str("\nEXAMPLES:\n");
        for ex in &vocab.examples {
            let _ = writeln!(p, "Query: {:?}", ex.query);
            let _ = writeln!(p, "{}", ex.output);
        }
    }

    p.push_str(
        "\nRULES:\n\
         1. Never invent a filter the request does not mention.\n\
         2. When a field has a closed list, use the exact spelling from the list or omit the field.\n\
         3. If the request is only about price or brand, use a generic semantic_query such as the product type.\n",
    );

    let _ = write!(p, "\nUSER QUERY: {:?}\n", query.trim());

    Prompt {
        system: SYSTEM.to_string(),
        user: p,
    }
}

fn describe(field: SchemaField) -> &'static str {
    match field {
        SchemaField::Color => "main colour of the product.",
        SchemaField::Material => "main material.",
        SchemaField::Shape => "shape or silhouette.",
        SchemaField::Category => "product category.",
        SchemaField::Brand => "brand name exactly as written by the shopper.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_bound_fields_and_examples() {
        let vocab = AttributeVocabulary::french().unwrap();
        let p = build_prompt(&vocab, "vase noir");

        assert!(p.user.contains("- color:"));
        assert!(p.user.contains("Vase"));
        assert!(p.user.contains("XOF"));
        assert!(p.user.contains("vase noir en céramique"));
        assert!(p.user.ends_with("USER QUERY: \"vase noir\"\n"));
        assert!(p.system.contains("JSON"));
    }

    #[test]
    fn unbound_fields_are_not_offered() {
        let yaml = "name: t\nlanguage: English\ncurrency: EUR\nprice_path: price\nfields:\n  color:\n    target: attribute\n    key: colour\n";
        let vocab = AttributeVocabulary::from_yaml_str(yaml).unwrap();
        let p = build_prompt(&vocab, "red lamp");

        assert!(p.user.contains("- color:"));
        assert!(!p.user.contains("- shape:"));
        assert!(!p.user.contains("- attributes:"));
        assert!(!p.user.contains("EXAMPLES"));
    }
}
