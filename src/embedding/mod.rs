//! Embedding & Indexing
//!
//! - `EmbeddingProvider` trait with a local FastEmbed implementation
//! - canonical item text and keyword decoding
//! - exact L2 `VectorIndex` persisted to a single file
//! - offline batch jobs that fill in vectors and rebuild the index

mod batch;
mod keywords;
mod provider;
mod text;
mod vector_index;

pub use batch::{BatchResult, EmbeddingJob, IndexBuildReport, IndexBuilder};
pub use keywords::{decode_keywords, keywords_or_empty, Keyword, KeywordError};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use text::canonical_text;
pub use vector_index::{SearchResult, VectorIndex, VectorIndexError};
