//! # Lodestone RAG
//!
//! Retrieval-Augmented Generation pipelines: ingest documents, split them
//! into relationship-linked chunk nodes, embed and index them, then
//! answer queries by retrieving relevant nodes and synthesizing an answer
//! with a language model.
//!
//! The main components are:
//! - Ingestion: [`pipeline::IngestionPipeline`] with splitters, the
//!   embedder transform, the dedup strategies, and the ingestion cache
//! - Retrieval: the [`retriever`] family (vector, fusion, auto-merging,
//!   router)
//! - Synthesis: the [`synthesis`] strategies and the
//!   [`engine::QueryEngine`] binding retrieval to synthesis

pub mod cache;
pub mod docstore;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod retriever;
pub mod splitter;
pub mod synthesis;

pub use cache::{cache_key, IngestionCache};
pub use docstore::{DocumentStore, InMemoryDocumentStore};
pub use engine::QueryEngine;
pub use error::{RagError, Result};
pub use pipeline::{DocstoreStrategy, Embedder, IngestionPipeline, Transform};
pub use retriever::{
    AutoMergingRetriever, FusionMode, FusionRetriever, MultiSelector, Retriever, RetrieverTool,
    RouterRetriever, Selector, SimpleSelector, SingleSelector, VectorRetriever,
};
pub use splitter::{HierarchicalSplitter, SentenceSplitter};
pub use synthesis::{
    AccumulateSynthesizer, CompactAccumulateSynthesizer, EngineResponse, SimpleSynthesizer,
    StreamingEngineResponse, Synthesizer,
};
