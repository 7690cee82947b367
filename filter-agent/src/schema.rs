//! Structured representation of a shopping query.
//!
//! The schema is language-neutral: fields are named `color`, `material`, ...
//! regardless of the attribute keys the catalogue stores. Binding to concrete
//! keys happens later, through an [`crate::AttributeVocabulary`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Scalar fields a query can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaField {
    Color,
    Material,
    Shape,
    Category,
    Brand,
}

impl SchemaField {
    pub const ALL: [SchemaField; 5] = [
        SchemaField::Color,
        SchemaField::Material,
        SchemaField::Shape,
        SchemaField::Category,
        SchemaField::Brand,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaField::Color => "color",
            SchemaField::Material => "material",
            SchemaField::Shape => "shape",
            SchemaField::Category => "category",
            SchemaField::Brand => "brand",
        }
    }
}

impl fmt::Display for SchemaField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price bounds; at least one bound is always present.
///
/// Bounds are inclusive unless flagged exclusive ("more than 5000").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub min_exclusive: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub max_exclusive: bool,
}

impl PriceRange {
    /// Normalizes raw inclusive bounds.
    ///
    /// Non-finite or negative bounds are discarded, inverted bounds are
    /// swapped, and `None` is returned when nothing usable remains.
    pub fn new(min: Option<f64>, max: Option<f64>) -> Option<Self> {
        Self::bounded((min, false), (max, false))
    }

    /// Same as [`Self::new`], each bound paired with its exclusive flag.
    pub fn bounded(min: (Option<f64>, bool), max: (Option<f64>, bool)) -> Option<Self> {
        let clean = |(v, strict): (Option<f64>, bool)| {
            let v = v.filter(|x| x.is_finite() && *x >= 0.0);
            (v, strict && v.is_some())
        };
        let (mut lo, mut hi) = (clean(min), clean(max));
        if let (Some(a), Some(b)) = (lo.0, hi.0) {
            if a > b {
                std::mem::swap(&mut lo, &mut hi);
            }
        }
        (lo.0.is_some() || hi.0.is_some()).then_some(Self {
            min: lo.0,
            max: hi.0,
            min_exclusive: lo.1,
            max_exclusive: hi.1,
        })
    }

    pub fn contains(&self, price: f64) -> bool {
        let above = self
            .min
            .is_none_or(|lo| if self.min_exclusive { price > lo } else { price >= lo });
        let below = self
            .max
            .is_none_or(|hi| if self.max_exclusive { price < hi } else { price <= hi });
        above && below
    }
}

/// Validated extraction result.
///
/// Invariant: every optional field is either `None` or a trimmed, non-empty
/// value that passed vocabulary validation; `semantic_query` is never empty.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterSchema {
    /// Free-text remainder used for the vector component.
    #[serde(default)]
    pub semantic_query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceRange>,
    /// Additional attributes named by the model (generic name → value).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Model-reported confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f32,
}

impl FilterSchema {
    /// Schema with no structured filters; the query itself drives the vector search.
    pub fn passthrough(query: &str) -> Self {
        Self {
            semantic_query: query.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn field(&self, field: SchemaField) -> Option<&str> {
        match field {
            SchemaField::Color => self.color.as_deref(),
            SchemaField::Material => self.material.as_deref(),
            SchemaField::Shape => self.shape.as_deref(),
            SchemaField::Category => self.category.as_deref(),
            SchemaField::Brand => self.brand.as_deref(),
        }
    }

    pub fn set_field(&mut self, field: SchemaField, value: Option<String>) {
        let slot = match field {
            SchemaField::Color => &mut self.color,
            SchemaField::Material => &mut self.material,
            SchemaField::Shape => &mut self.shape,
            SchemaField::Category => &mut self.category,
            SchemaField::Brand => &mut self.brand,
        };
        *slot = value;
    }

    /// Populated scalar fields in declaration order.
    pub fn populated(&self) -> impl Iterator<Item = (SchemaField, &str)> {
        SchemaField::ALL
            .into_iter()
            .filter_map(|f| self.field(f).map(|v| (f, v)))
    }

    /// `true` when no structured constraint is present.
    pub fn has_no_filters(&self) -> bool {
        self.populated().next().is_none() && self.price.is_none() && self.attributes.is_empty()
    }

    /// Number of structured constraints (scalar fields, price, extra attributes).
    pub fn filter_count(&self) -> usize {
        self.populated().count() + usize::from(self.price.is_some()) + self.attributes.len()
    }

    /// Removes every structured constraint, keeping the semantic remainder.
    pub fn clear_filters(&mut self) {
        for f in SchemaField::ALL {
            self.set_field(f, None);
        }
        self.price = None;
        self.attributes.clear();
    }
}
