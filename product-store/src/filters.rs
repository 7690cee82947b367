//! Product filter expressions and their conversion to Qdrant `Filter`.
//!
//! A [`FilterExpr`] is a conjunction of predicates over the Attribute Pattern
//! (`attributes[]` elements matched on both `key` and `value`), top-level
//! payload fields and numeric ranges. Value comparison is exact after
//! normalization (trim, collapsed whitespace, lowercase).
//!
//! Qdrant keyword matching is case-sensitive and stored values use arbitrary
//! casing ("Sacs à Main", "T-Shirts"), so values never reach the server-side
//! filter. It only narrows on attribute keys and numeric ranges; the caller
//! over-fetches and [`FilterExpr::matches`] decides values.

use qdrant_client::qdrant::{Condition, Filter, Range};
use serde::Serialize;
use tracing::debug;

use crate::record::ProductDocument;

/// Payload field holding the attribute sequence.
pub const ATTRIBUTES_FIELD: &str = "attributes";

/// Single condition of a conjunctive filter.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// Some `attributes[]` element has this key and this value.
    Attribute { key: String, value: String },
    /// Top-level payload field (scalar or array) contains this value.
    Field { path: String, value: String },
    /// Numeric payload field within bounds; `gt`/`lt` exclude the bound.
    Range {
        path: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        gte: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        gt: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lte: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lt: Option<f64>,
    },
}

impl Predicate {
    /// Range with each bound either inclusive or exclusive.
    pub fn range(path: impl Into<String>, min: Option<(f64, bool)>, max: Option<(f64, bool)>) -> Self {
        let split = |b: Option<(f64, bool)>| match b {
            Some((x, true)) => (None, Some(x)),
            Some((x, false)) => (Some(x), None),
            None => (None, None),
        };
        let ((gte, gt), (lte, lt)) = (split(min), split(max));
        Predicate::Range {
            path: path.into(),
            gte,
            gt,
            lte,
            lt,
        }
    }
}

/// Conjunction of [`Predicate`]s; empty means "no restriction".
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FilterExpr {
    pub predicates: Vec<Predicate>,
}

impl FilterExpr {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Client-side evaluation against a fetched document.
    pub fn matches(&self, doc: &ProductDocument) -> bool {
        self.predicates.iter().all(|p| predicate_matches(p, doc))
    }

    /// `{key: stored value}` for every attribute predicate the document satisfies.
    pub fn matched_attributes(&self, doc: &ProductDocument) -> Vec<(String, String)> {
        self.predicates
            .iter()
            .filter_map(|p| match p {
                Predicate::Attribute { key, value } => doc
                    .attributes
                    .iter()
                    .find(|a| &a.key == key && fold(&a.value) == fold(value))
                    .map(|a| (a.key.clone(), a.value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Server-side pre-filter; `None` when nothing can be pushed down.
    ///
    /// Every document [`Self::matches`] accepts passes this filter. Attribute
    /// predicates become a `nested` condition requiring an element with the
    /// key, ranges are sent as-is, field predicates are left to the client.
    pub fn to_qdrant_filter(&self) -> Option<Filter> {
        let must: Vec<Condition> = self
            .predicates
            .iter()
            .filter_map(|p| match p {
                Predicate::Attribute { key, .. } => Some(Condition::nested(
                    ATTRIBUTES_FIELD,
                    Filter::must([Condition::matches("key", key.clone())]),
                )),
                Predicate::Field { .. } => None,
                Predicate::Range {
                    path,
                    gte,
                    gt,
                    lte,
                    lt,
                } => Some(Condition::range(
                    path.as_str(),
                    Range {
                        gte: *gte,
                        gt: *gt,
                        lte: *lte,
                        lt: *lt,
                    },
                )),
            })
            .collect();

        if must.is_empty() {
            return None;
        }
        debug!(
            target: "product_store::filters",
            conditions = must.len(),
            client_only = self.predicates.len() - must.len(),
            "built qdrant filter"
        );
        Some(Filter::must(must))
    }
}

fn predicate_matches(p: &Predicate, doc: &ProductDocument) -> bool {
    match p {
        Predicate::Attribute { key, value } => doc
            .attribute(key)
            .is_some_and(|stored| fold(stored) == fold(value)),
        Predicate::Field { path, value } => {
            let want = fold(value);
            doc.values_at(path).iter().any(|v| fold(v) == want)
        }
        Predicate::Range {
            path,
            gte,
            gt,
            lte,
            lt,
        } => doc.number_at(path).is_some_and(|x| {
            gte.is_none_or(|b| x >= b)
                && gt.is_none_or(|b| x > b)
                && lte.is_none_or(|b| x <= b)
                && lt.is_none_or(|b| x < b)
        }),
    }
}

/// Trim, collapse inner whitespace, lowercase.
pub fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
