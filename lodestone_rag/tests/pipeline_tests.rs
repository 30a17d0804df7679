//! End-to-end ingestion pipeline scenarios

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use lodestone_core::embedding::{EmbeddingModel, MockEmbeddingModel};
use lodestone_core::{Node, QueryBundle};
use lodestone_rag::{
    DocstoreStrategy, DocumentStore, Embedder, InMemoryDocumentStore, IngestionCache,
    IngestionPipeline, RagError, Result, SentenceSplitter, Transform,
};
use lodestone_vector::{MemoryVectorStore, VectorStore, VectorStoreQuery};

const DIMENSION: usize = 32;

struct Fixture {
    docstore: Arc<InMemoryDocumentStore>,
    vector_store: Arc<MemoryVectorStore>,
    pipeline: IngestionPipeline,
    embedder: Arc<MockEmbeddingModel>,
    ctx: CancellationToken,
}

fn fixture(strategy: DocstoreStrategy) -> Fixture {
    let docstore = Arc::new(InMemoryDocumentStore::new());
    let vector_store = Arc::new(MemoryVectorStore::new());
    let embedder = Arc::new(MockEmbeddingModel::new(DIMENSION));
    let pipeline = IngestionPipeline::builder()
        .with_transform(Arc::new(SentenceSplitter::new(256, 16).unwrap()))
        .with_transform(Arc::new(Embedder::new(embedder.clone())))
        .with_docstore(docstore.clone())
        .with_vector_store(vector_store.clone())
        .with_strategy(strategy)
        .build()
        .unwrap();
    Fixture {
        docstore,
        vector_store,
        pipeline,
        embedder,
        ctx: CancellationToken::new(),
    }
}

#[tokio::test]
async fn test_round_trip_one_document() {
    let f = fixture(DocstoreStrategy::Upserts);
    let text = "Paris is the capital of France. Berlin is the capital of Germany.";

    let nodes = f
        .pipeline
        .run(&f.ctx, vec![Node::document("d1", text)], vec![])
        .await
        .unwrap();

    // chunk size is large enough to keep the document as one chunk
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].text, text);
    assert_eq!(nodes[0].ref_doc_id(), Some("d1"));

    let hashes = f.docstore.all_document_hashes(&f.ctx).await.unwrap();
    assert_eq!(hashes.len(), 1);
    assert_eq!(f.vector_store.len().await, 1);

    // querying with the chunk's own embedding scores ~1.0
    let embedding = nodes[0].embedding.clone().unwrap();
    let results = f
        .vector_store
        .query(&f.ctx, &VectorStoreQuery::new(embedding, 4))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].node.ref_doc_id(), Some("d1"));
    assert!((results[0].score - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_upserts_second_run_is_empty() {
    let f = fixture(DocstoreStrategy::Upserts);
    let doc = Node::document("d1", "Some stable content.");

    let first = f
        .pipeline
        .run(&f.ctx, vec![doc.clone()], vec![])
        .await
        .unwrap();
    assert!(!first.is_empty());
    let hashes_before = f.docstore.all_document_hashes(&f.ctx).await.unwrap();

    let second = f.pipeline.run(&f.ctx, vec![doc], vec![]).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(
        f.docstore.all_document_hashes(&f.ctx).await.unwrap(),
        hashes_before
    );
    assert_eq!(f.vector_store.len().await, 1);
}

#[tokio::test]
async fn test_upserts_update_replaces_old_version() {
    let f = fixture(DocstoreStrategy::Upserts);

    f.pipeline
        .run(&f.ctx, vec![Node::document("d1", "version one text.")], vec![])
        .await
        .unwrap();
    let v1_embedding = f
        .embedder
        .get_text_embedding(&f.ctx, "version one text.")
        .await
        .unwrap();

    let updated = f
        .pipeline
        .run(&f.ctx, vec![Node::document("d1", "version two text.")], vec![])
        .await
        .unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].text, "version two text.");

    // the docstore tracks only v2
    let hashes = f.docstore.all_document_hashes(&f.ctx).await.unwrap();
    assert_eq!(hashes.len(), 1);
    assert_eq!(hashes["d1"], Node::document("d1", "version two text.").hash());

    // no query returns the v1 chunk any more
    assert_eq!(f.vector_store.len().await, 1);
    let results = f
        .vector_store
        .query(&f.ctx, &VectorStoreQuery::new(v1_embedding, 10))
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.node.text != "version one text."));
}

#[tokio::test]
async fn test_upserts_and_delete_prunes_absent_docs() {
    let f = fixture(DocstoreStrategy::UpsertsAndDelete);
    let docs = |ids: &[&str]| -> Vec<Node> {
        ids.iter()
            .map(|id| Node::document(*id, format!("Document body for {id}.")))
            .collect()
    };

    f.pipeline
        .run(&f.ctx, docs(&["d1", "d2", "d3"]), vec![])
        .await
        .unwrap();
    assert_eq!(f.docstore.all_document_hashes(&f.ctx).await.unwrap().len(), 3);
    assert_eq!(f.vector_store.len().await, 3);

    f.pipeline.run(&f.ctx, docs(&["d1", "d2"]), vec![]).await.unwrap();

    let hashes = f.docstore.all_document_hashes(&f.ctx).await.unwrap();
    assert_eq!(hashes.len(), 2);
    assert!(!hashes.contains_key("d3"));
    assert_eq!(f.vector_store.len().await, 2);

    let d3_embedding = f
        .embedder
        .get_text_embedding(&f.ctx, "Document body for d3.")
        .await
        .unwrap();
    let results = f
        .vector_store
        .query(&f.ctx, &VectorStoreQuery::new(d3_embedding, 10))
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.node.ref_doc_id() != Some("d3")));
}

#[tokio::test]
async fn test_duplicates_only_skips_second_run() {
    let f = fixture(DocstoreStrategy::DuplicatesOnly);
    let docs = vec![
        Node::document("a", "First unique body."),
        Node::document("b", "Second unique body."),
        Node::document("c", "Third unique body."),
    ];

    let first = f.pipeline.run(&f.ctx, docs.clone(), vec![]).await.unwrap();
    assert_eq!(first.len(), 3);
    let hashes_before = f.docstore.all_document_hashes(&f.ctx).await.unwrap();
    let count_before = f.vector_store.len().await;

    let second = f.pipeline.run(&f.ctx, docs, vec![]).await.unwrap();
    assert!(second.is_empty());
    assert_eq!(
        f.docstore.all_document_hashes(&f.ctx).await.unwrap(),
        hashes_before
    );
    assert_eq!(f.vector_store.len().await, count_before);
}

/// Transform that counts how often it actually runs
struct CountingTransform {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transform for CountingTransform {
    fn name(&self) -> &str {
        "counting"
    }

    async fn transform(&self, _ctx: &CancellationToken, nodes: Vec<Node>) -> Result<Vec<Node>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(nodes)
    }
}

#[tokio::test]
async fn test_cache_hit_short_circuits_transform() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(IngestionCache::new());
    let pipeline = IngestionPipeline::builder()
        .with_transform(Arc::new(CountingTransform {
            calls: calls.clone(),
        }))
        .with_cache(cache.clone())
        .build()
        .unwrap();
    let ctx = CancellationToken::new();

    let doc = Node::document("d1", "cacheable content");
    pipeline.run(&ctx, vec![doc.clone()], vec![]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);

    let out = pipeline.run(&ctx, vec![doc], vec![]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(out.len(), 1);
}

/// Transform that always fails, for failure-semantics checks
struct FailingTransform;

#[async_trait]
impl Transform for FailingTransform {
    fn name(&self) -> &str {
        "failing"
    }

    async fn transform(&self, _ctx: &CancellationToken, _nodes: Vec<Node>) -> Result<Vec<Node>> {
        Err(RagError::Internal("transform exploded".to_string()))
    }
}

#[tokio::test]
async fn test_failed_run_is_not_rolled_back_and_rerun_skips() {
    // splitter succeeds, then the failing transform aborts the run; the
    // docstore keeps the dedup bookkeeping, so a re-run drops the doc
    let docstore = Arc::new(InMemoryDocumentStore::new());
    let pipeline = IngestionPipeline::builder()
        .with_transform(Arc::new(SentenceSplitter::new(64, 0).unwrap()))
        .with_transform(Arc::new(FailingTransform))
        .with_docstore(docstore.clone())
        .build()
        .unwrap();
    let ctx = CancellationToken::new();

    let doc = Node::document("d1", "Body text.");
    let err = pipeline.run(&ctx, vec![doc.clone()], vec![]).await.unwrap_err();
    assert!(matches!(err, RagError::Internal(_)));
    assert_eq!(docstore.all_document_hashes(&ctx).await.unwrap().len(), 1);

    // dedup now considers d1 ingested; the failing transform never runs
    let second = pipeline.run(&ctx, vec![doc], vec![]).await.unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn test_query_with_metadata_filters_through_pipeline() {
    let f = fixture(DocstoreStrategy::Upserts);

    f.pipeline
        .run(
            &f.ctx,
            vec![
                Node::document("en1", "The tower stands in Paris.").with_metadata("lang", "en"),
                Node::document("fr1", "La tour est a Paris.").with_metadata("lang", "fr"),
            ],
            vec![],
        )
        .await
        .unwrap();

    let query_embedding = f
        .embedder
        .get_text_embedding(&f.ctx, "Where is the tower?")
        .await
        .unwrap();
    let filters = lodestone_core::MetadataFilters::all(vec![
        lodestone_core::MetadataFilter::eq("lang", "fr"),
    ]);
    let results = f
        .vector_store
        .query(
            &f.ctx,
            &VectorStoreQuery::new(query_embedding, 10).with_filters(filters),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].node.ref_doc_id(), Some("fr1"));
}

#[tokio::test]
async fn test_bundle_query_type_conversion() {
    // QueryBundle is the retrieval-side counterpart the pipeline output
    // feeds into; sanity-check the ergonomic conversion here
    let bundle: QueryBundle = "what is in the store?".into();
    assert_eq!(bundle.query, "what is in the store?");
    assert!(bundle.embedding.is_none());
}
