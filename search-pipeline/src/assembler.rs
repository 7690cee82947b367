//! Filter Schema + embedding → executable query.
//!
//! Scalar fields bound to attribute keys become Attribute Pattern predicates
//! (`attributes[]` element with `key == bound key` and `value == value`),
//! fields bound to document fields become field predicates, and the price
//! range becomes a range predicate on the vocabulary's price path. All
//! predicates are ANDed. Values are normalized before comparison.
//!
//! Fields and extra attributes the vocabulary does not bind are dropped and
//! counted; they never fail the assembly.

use std::sync::Arc;

use filter_agent::{AttributeVocabulary, FieldTarget, FilterSchema, normalize};
use product_store::{FilterExpr, Predicate, SearchRequest};
use serde::Serialize;
use tracing::debug;

/// Default hits requested from the index before the executor scopes the query.
pub const DEFAULT_LIMIT: usize = 10;
/// Default HNSW candidate list size.
pub const DEFAULT_CANDIDATES: u64 = 150;

/// ANN component of an [`ExecutableQuery`].
#[derive(Clone, Debug, PartialEq)]
pub struct VectorStage {
    pub embedding: Vec<f32>,
    /// Named vector to search; `None` for the collection default.
    pub index_name: Option<String>,
    /// Hits to fetch.
    pub limit: usize,
    /// HNSW candidate list size.
    pub num_candidates: u64,
}

/// What the assembler did with the schema.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AssemblyStats {
    /// Predicates emitted.
    pub predicates: usize,
    /// Fields or attributes with no binding in the vocabulary.
    pub dropped: usize,
}

/// Vector stage plus conjunctive filter; built per request.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutableQuery {
    pub vector: VectorStage,
    pub filter: FilterExpr,
    pub stats: AssemblyStats,
}

impl ExecutableQuery {
    /// Sets fetch size and candidate count.
    pub fn scoped(mut self, limit: usize, num_candidates: u64) -> Self {
        self.vector.limit = limit;
        self.vector.num_candidates = num_candidates.max(limit as u64);
        self
    }

    /// Store request; `server_filter = false` leaves filtering to the caller.
    pub fn to_request(&self, server_filter: bool) -> SearchRequest {
        SearchRequest {
            vector: self.vector.embedding.clone(),
            limit: self.vector.limit,
            hnsw_ef: self.vector.num_candidates,
            filter: (server_filter && !self.filter.is_empty()).then(|| self.filter.clone()),
        }
    }
}

/// Pure translation bound to one vocabulary and one vector index.
#[derive(Clone, Debug)]
pub struct QueryAssembler {
    vocab: Arc<AttributeVocabulary>,
    index_name: Option<String>,
}

impl QueryAssembler {
    pub fn new(vocab: Arc<AttributeVocabulary>, index_name: Option<String>) -> Self {
        Self { vocab, index_name }
    }

    pub fn vocabulary(&self) -> &AttributeVocabulary {
        &self.vocab
    }

    /// Builds the executable query; the embedding is used as is.
    pub fn build(&self, schema: &FilterSchema, embedding: Vec<f32>) -> ExecutableQuery {
        let (filter, stats) = self.filter_for(schema);
        ExecutableQuery {
            vector: VectorStage {
                embedding,
                index_name: self.index_name.clone(),
                limit: DEFAULT_LIMIT,
                num_candidates: DEFAULT_CANDIDATES,
            },
            filter,
            stats,
        }
    }

    /// Filter part of [`Self::build`].
    pub fn filter_for(&self, schema: &FilterSchema) -> (FilterExpr, AssemblyStats) {
        let mut predicates = Vec::with_capacity(schema.filter_count());
        let mut dropped = 0usize;

        for (field, value) in schema.populated() {
            let value = normalize(value);
            if value.is_empty() {
                continue;
            }
            match self.vocab.binding(field) {
                Some(b) => predicates.push(match b.target {
                    FieldTarget::Attribute => Predicate::Attribute {
                        key: b.key.clone(),
                        value,
                    },
                    FieldTarget::Field => Predicate::Field {
                        path: b.key.clone(),
                        value,
                    },
                }),
                None => {
                    debug!(target: "search_pipeline::assemble", %field, %value, "field not bound; dropped");
                    dropped += 1;
                }
            }
        }

        if let Some(price) = schema.price {
            predicates.push(Predicate::range(
                self.vocab.price_path.clone(),
                price.min.map(|x| (x, price.min_exclusive)),
                price.max.map(|x| (x, price.max_exclusive)),
            ));
        }

        for (name, value) in &schema.attributes {
            let value = normalize(value);
            match self.vocab.extra_key(name) {
                Some(key) if !value.is_empty() => predicates.push(Predicate::Attribute {
                    key: key.to_string(),
                    value,
                }),
                _ => {
                    debug!(target: "search_pipeline::assemble", attribute = %name, %value, "attribute not bound; dropped");
                    dropped += 1;
                }
            }
        }

        let stats = AssemblyStats {
            predicates: predicates.len(),
            dropped,
        };
        (FilterExpr::new(predicates), stats)
    }
}

#[cfg(test)]
mod tests {
    use filter_agent::PriceRange;

    use super::*;

    fn french() -> QueryAssembler {
        QueryAssembler::new(
            Arc::new(AttributeVocabulary::french().unwrap()),
            Some("embedding_gemini_004".into()),
        )
    }

    fn english() -> QueryAssembler {
        QueryAssembler::new(Arc::new(AttributeVocabulary::english().unwrap()), None)
    }

    #[test]
    fn empty_schema_yields_empty_filter() {
        let q = french().build(&FilterSchema::passthrough("vase"), vec![0.1, 0.2]);
        assert!(q.filter.is_empty());
        assert_eq!(q.stats, AssemblyStats::default());
        assert_eq!(q.vector.embedding, vec![0.1, 0.2]);
        assert_eq!(q.vector.index_name.as_deref(), Some("embedding_gemini_004"));
        assert!(q.to_request(true).filter.is_none());
    }

    #[test]
    fn color_binds_to_the_vocabulary_key() {
        let schema = FilterSchema {
            semantic_query: "vase".into(),
            color: Some(" Noir ".into()),
            ..FilterSchema::default()
        };
        let fr = french().build(&schema, vec![]);
        assert_eq!(
            fr.filter.predicates,
            vec![Predicate::Attribute {
                key: "couleur".into(),
                value: "noir".into()
            }]
        );

        let en = english().build(&schema, vec![]);
        assert_eq!(
            en.filter.predicates,
            vec![Predicate::Attribute {
                key: "color".into(),
                value: "noir".into()
            }]
        );
    }

    #[test]
    fn one_predicate_per_populated_field() {
        let schema = FilterSchema {
            semantic_query: "vase".into(),
            color: Some("noir".into()),
            material: Some("céramique".into()),
            shape: Some("jarre".into()),
            category: Some("Vase".into()),
            brand: Some("Orca".into()),
            price: PriceRange::new(Some(5_000.0), Some(15_000.0)),
            ..FilterSchema::default()
        };
        let q = french().build(&schema, vec![]);

        assert_eq!(q.stats.predicates, 6);
        assert_eq!(q.stats.dropped, 0);
        assert!(q.filter.predicates.contains(&Predicate::Field {
            path: "categories".into(),
            value: "vase".into()
        }));
        assert!(q.filter.predicates.contains(&Predicate::Range {
            path: "price.amount".into(),
            gte: Some(5_000.0),
            gt: None,
            lte: Some(15_000.0),
            lt: None,
        }));
    }

    #[test]
    fn exclusive_price_bound_becomes_strict_range() {
        let schema = FilterSchema {
            semantic_query: "lampe".into(),
            price: PriceRange::bounded((Some(5_000.0), true), (None, false)),
            ..FilterSchema::default()
        };
        let q = french().build(&schema, vec![]);

        assert_eq!(
            q.filter.predicates,
            vec![Predicate::range("price.amount", Some((5_000.0, true)), None)]
        );
        let Predicate::Range { gt, gte, .. } = &q.filter.predicates[0] else {
            panic!("expected a range");
        };
        assert_eq!((*gte, *gt), (None, Some(5_000.0)));
    }

    #[test]
    fn folded_values_still_match_mixed_case_catalogue_entries() {
        let schema = FilterSchema {
            semantic_query: "sac".into(),
            category: Some("Sacs à Main".into()),
            ..FilterSchema::default()
        };
        let q = french().build(&schema, vec![]);
        let doc = product_store::ProductDocument::from_payload(
            "1",
            serde_json::json!({"id": "1", "name": "Sac", "categories": ["Sacs à Main"]}),
        )
        .unwrap();

        assert!(q.filter.matches(&doc));
        // Category values are never pushed into the case-sensitive Qdrant filter.
        assert!(q.filter.to_qdrant_filter().is_none());
    }

    #[test]
    fn unbound_attributes_are_counted_and_dropped() {
        let mut schema = FilterSchema {
            semantic_query: "vase".into(),
            color: Some("noir".into()),
            ..FilterSchema::default()
        };
        schema.attributes.insert("finish".into(), "matte".into());
        schema.attributes.insert("style".into(), "moderne".into());

        let q = french().build(&schema, vec![]);

        assert_eq!(q.stats.dropped, 1);
        assert_eq!(q.stats.predicates, 2);
        assert!(q.filter.predicates.contains(&Predicate::Attribute {
            key: "style".into(),
            value: "moderne".into()
        }));
    }

    #[test]
    fn scoped_query_never_has_fewer_candidates_than_hits() {
        let q = french().build(&FilterSchema::passthrough("vase"), vec![]).scoped(400, 150);
        let req = q.to_request(false);
        assert_eq!(req.limit, 400);
        assert_eq!(req.hnsw_ef, 400);
    }
}
