//! Product catalogue access for hybrid search.
//!
//! - [`record`]: typed view of product payloads (Attribute Pattern included).
//! - [`filters`]: conjunctive filter expressions, converted to Qdrant filters
//!   and re-checked client-side.
//! - [`index`] / [`qdrant_facade`]: the read-only vector index and its Qdrant
//!   implementation.
//! - [`embed`]: query embedding providers.

pub mod config;
pub mod embed;
pub mod errors;
pub mod filters;
pub mod index;
pub mod qdrant_facade;
pub mod record;

pub use config::StoreConfig;
pub use embed::EmbeddingsProvider;
pub use embed::llm::LlmEmbedder;
pub use errors::StoreError;
pub use filters::{FilterExpr, Predicate, fold};
pub use index::{ProductIndex, SearchRequest};
pub use qdrant_facade::{QdrantIndex, StoreHealth};
pub use record::{AttributeRecord, ProductDocument, ScoredDocument};
