//! # Lodestone
//!
//! Retrieval-Augmented Generation pipelines for Rust: ingest documents,
//! split them into relationship-linked nodes, embed and index them in a
//! vector store, then answer queries by retrieving relevant context and
//! synthesizing an answer with a language model.
//!
//! ## Ingest and query
//! ```rust,no_run
//! use std::sync::Arc;
//! use lodestone::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> lodestone::rag::Result<()> {
//!     let ctx = CancellationToken::new();
//!     let embedder: Arc<dyn EmbeddingModel> = Arc::new(MockEmbeddingModel::new(64));
//!     let llm: Arc<dyn LanguageModel> = Arc::new(MockLanguageModel::empty());
//!
//!     let docstore = Arc::new(InMemoryDocumentStore::new());
//!     let vector_store = Arc::new(MemoryVectorStore::new());
//!
//!     let pipeline = IngestionPipeline::builder()
//!         .with_transform(Arc::new(SentenceSplitter::with_defaults()?))
//!         .with_transform(Arc::new(Embedder::new(embedder.clone())))
//!         .with_docstore(docstore.clone())
//!         .with_vector_store(vector_store.clone())
//!         .build()?;
//!     pipeline
//!         .run(&ctx, vec![Node::document("d1", "Paris is the capital of France.")], vec![])
//!         .await?;
//!
//!     let retriever = Arc::new(VectorRetriever::new(vector_store, embedder, 4));
//!     let engine = QueryEngine::new(retriever, Arc::new(SimpleSynthesizer::new(llm)));
//!     let answer = engine.query(&ctx, "What is the capital of France?").await?;
//!     println!("{}", answer.response);
//!     Ok(())
//! }
//! ```

pub use lodestone_core as core;
pub use lodestone_rag as rag;
pub use lodestone_vector as vector;

/// The commonly used surface, re-exported in one place
pub mod prelude {
    pub use lodestone_core::embedding::{EmbeddingModel, MockEmbeddingModel};
    pub use lodestone_core::llm::{LanguageModel, Message, MockLanguageModel, TokenDelta};
    pub use lodestone_core::{
        Document, Embedding, Metadata, MetadataFilter, MetadataFilters, MetadataMode,
        MetadataValue, Node, NodeRelationship, NodeType, NodeWithScore, QueryBundle,
    };
    pub use lodestone_rag::{
        AccumulateSynthesizer, AutoMergingRetriever, CompactAccumulateSynthesizer,
        DocstoreStrategy, DocumentStore, Embedder, EngineResponse, FusionMode, FusionRetriever,
        HierarchicalSplitter, InMemoryDocumentStore, IngestionCache, IngestionPipeline,
        QueryEngine, Retriever, RetrieverTool, RouterRetriever, SentenceSplitter, SimpleSelector,
        SimpleSynthesizer, SingleSelector, StreamingEngineResponse, Synthesizer, VectorRetriever,
    };
    pub use lodestone_vector::{
        HnswConfig, HnswVectorStore, MemoryVectorStore, VectorStore, VectorStoreQuery,
    };
}
