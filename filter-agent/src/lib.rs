//! Free-text shopping query → validated [`FilterSchema`].
//!
//! The [`FilterExtractionAgent`] prompts a completion model with the target
//! schema and the deployment's [`AttributeVocabulary`], validates the answer,
//! and falls back to a secondary model when the first one fails.

pub mod agent;
pub mod errors;
pub mod parse;
pub mod prompt;
pub mod schema;
pub mod vocabulary;

pub use agent::{AgentConfig, CompletionSource, Extraction, FilterExtractionAgent};
pub use errors::{ExtractionError, ParseError, VocabularyError};
pub use parse::{DroppedValue, cleanup_json_like, parse_completion};
pub use prompt::{Prompt, build_prompt};
pub use schema::{FilterSchema, PriceRange, SchemaField};
pub use vocabulary::{AttributeVocabulary, FieldBinding, FieldTarget, normalize};
