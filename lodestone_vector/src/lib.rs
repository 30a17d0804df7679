//! # Lodestone Vector
//!
//! The vector store contract for the Lodestone RAG framework, plus two
//! reference stores: an exact in-memory cosine store and a persistent
//! HNSW store built on `hnsw_rs`.

pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, VectorError};
pub use store::{HnswConfig, HnswVectorStore, MemoryVectorStore, VectorStore};
pub use types::VectorStoreQuery;
