//! The node data model
//!
//! A [`Node`] is the unit every component handles: a piece of retrievable
//! content with text, metadata, an optional embedding, and relationships
//! linking it to its source document, its neighbors, and its place in a
//! chunk hierarchy. A document is a node of kind [`NodeType::Document`]
//! whose id is the ref-doc id all of its chunks point back to.

pub mod filter;
pub mod metadata;
pub mod query;

pub use filter::{FilterCondition, FilterOperator, MetadataFilter, MetadataFilters};
pub use metadata::{Metadata, MetadataValue};
pub use query::QueryBundle;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Dense embedding vector
pub type Embedding = Vec<f32>;

/// A document is a node of kind `Document`
pub type Document = Node;

/// Separator between rendered metadata lines
const METADATA_SEPARATOR: &str = "\n";

/// Kind of content a node holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Document,
    Text,
    Image,
    Index,
}

/// Relationship kinds between nodes
///
/// `Child` may hold several related nodes; the other kinds hold one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRelationship {
    Source,
    Previous,
    Next,
    Parent,
    Child,
}

/// A reference to a related node, stored by id rather than by pointer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedNodeInfo {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl RelatedNodeInfo {
    /// Create a reference carrying only the node id
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: None,
            metadata: Metadata::new(),
            hash: None,
        }
    }
}

/// Which metadata keys are rendered alongside the text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMode {
    /// Text only
    None,
    /// Keys visible to the language model
    Llm,
    /// Keys visible to the embedding model
    Embed,
    /// Every key
    All,
}

/// The unit handled by every component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier, stable across re-ingestion when derivable from
    /// the source document and chunk index
    pub id: String,

    /// Chunk content
    pub text: String,

    /// Kind of content
    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Ordered metadata; participates in hashing unless excluded
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,

    /// Dense vector, absent until embedded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,

    /// Links to related nodes, keyed by relationship kind
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<NodeRelationship, Vec<RelatedNodeInfo>>,

    /// Metadata keys hidden from the embedding model
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_embed_metadata_keys: BTreeSet<String>,

    /// Metadata keys hidden from the language model
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_llm_metadata_keys: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_char_idx: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_char_idx: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Inline payload for image nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Target index for index-reference nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_id: Option<String>,
}

impl Node {
    /// Create a text node with a generated id
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), text)
    }

    /// Create a text node with an explicit id
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            node_type: NodeType::Text,
            metadata: Metadata::new(),
            embedding: None,
            relationships: BTreeMap::new(),
            excluded_embed_metadata_keys: BTreeSet::new(),
            excluded_llm_metadata_keys: BTreeSet::new(),
            start_char_idx: None,
            end_char_idx: None,
            mime_type: None,
            image: None,
            index_id: None,
        }
    }

    /// Create a document node; its id is the ref-doc id
    pub fn document(id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut node = Self::with_id(id, text);
        node.node_type = NodeType::Document;
        node
    }

    /// Add a metadata field
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<MetadataValue>,
    {
        self.metadata.add(key, value);
        self
    }

    /// Set the embedding
    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Exclude a metadata key from the embedding view
    pub fn with_excluded_embed_key(mut self, key: impl Into<String>) -> Self {
        self.excluded_embed_metadata_keys.insert(key.into());
        self
    }

    /// Exclude a metadata key from the LLM view
    pub fn with_excluded_llm_key(mut self, key: impl Into<String>) -> Self {
        self.excluded_llm_metadata_keys.insert(key.into());
        self
    }

    /// Replace the single related node under `kind`
    pub fn set_relationship(&mut self, kind: NodeRelationship, info: RelatedNodeInfo) {
        self.relationships.insert(kind, vec![info]);
    }

    /// Append a child relationship
    pub fn push_child(&mut self, info: RelatedNodeInfo) {
        self.relationships
            .entry(NodeRelationship::Child)
            .or_default()
            .push(info);
    }

    fn related(&self, kind: NodeRelationship) -> Option<&RelatedNodeInfo> {
        self.relationships.get(&kind).and_then(|infos| infos.first())
    }

    /// The owning document, when linked
    pub fn source_node(&self) -> Option<&RelatedNodeInfo> {
        self.related(NodeRelationship::Source)
    }

    pub fn prev_node(&self) -> Option<&RelatedNodeInfo> {
        self.related(NodeRelationship::Previous)
    }

    pub fn next_node(&self) -> Option<&RelatedNodeInfo> {
        self.related(NodeRelationship::Next)
    }

    pub fn parent_node(&self) -> Option<&RelatedNodeInfo> {
        self.related(NodeRelationship::Parent)
    }

    /// Children in insertion order; empty when none
    pub fn child_nodes(&self) -> &[RelatedNodeInfo] {
        self.relationships
            .get(&NodeRelationship::Child)
            .map(|infos| infos.as_slice())
            .unwrap_or(&[])
    }

    /// Id of the originating document, when the source relationship is set
    pub fn ref_doc_id(&self) -> Option<&str> {
        self.source_node().map(|info| info.node_id.as_str())
    }

    /// Content hash over the text and embed-visible metadata
    ///
    /// Pure function of `(text, metadata - excluded_embed_metadata_keys)`:
    /// equal hashes across ingestion runs mean the embedding is reusable.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        for (key, value) in self.metadata.iter() {
            if self.excluded_embed_metadata_keys.contains(key) {
                continue;
            }
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.to_string().as_bytes());
            hasher.update(b";");
        }
        hex_digest(hasher)
    }

    /// Render the text with the metadata prefix selected by `mode`
    pub fn content(&self, mode: MetadataMode) -> String {
        let metadata_str = self.metadata_str(mode);
        if metadata_str.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", metadata_str, self.text)
        }
    }

    /// Render the metadata prefix alone for the given mode
    pub fn metadata_str(&self, mode: MetadataMode) -> String {
        let excluded: Option<&BTreeSet<String>> = match mode {
            MetadataMode::None => return String::new(),
            MetadataMode::Llm => Some(&self.excluded_llm_metadata_keys),
            MetadataMode::Embed => Some(&self.excluded_embed_metadata_keys),
            MetadataMode::All => None,
        };

        self.metadata
            .iter()
            .filter(|(key, _)| excluded.map_or(true, |set| !set.contains(*key)))
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join(METADATA_SEPARATOR)
    }

    /// Derive the relationship record other nodes use to point at this one
    pub fn as_related_node_info(&self) -> RelatedNodeInfo {
        RelatedNodeInfo {
            node_id: self.id.clone(),
            node_type: Some(self.node_type),
            metadata: self.metadata.clone(),
            hash: Some(self.hash()),
        }
    }

    /// Check structural invariants: metadata shapes and the mime-type
    /// requirement for image payloads
    pub fn validate(&self) -> Result<()> {
        self.metadata.validate()?;
        if self.image.is_some() && self.mime_type.is_none() {
            return Err(Error::Configuration(format!(
                "node {} carries an image payload but no mime_type",
                self.id
            )));
        }
        Ok(())
    }
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// A retrieval result: a node and its similarity score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeWithScore {
    pub node: Node,
    pub score: f32,
}

impl NodeWithScore {
    pub fn new(node: Node, score: f32) -> Self {
        Self { node, score }
    }
}

/// Sort scored nodes by descending score, breaking ties by node hash
pub fn sort_by_score_desc(results: &mut [NodeWithScore]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node.hash().cmp(&b.node.hash()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_tracks_visible_content() {
        let a = Node::with_id("n1", "some text").with_metadata("author", "hugo");
        let b = Node::with_id("n2", "some text").with_metadata("author", "hugo");
        assert_eq!(a.hash(), b.hash());

        let c = Node::with_id("n3", "some text").with_metadata("author", "ada");
        assert_ne!(a.hash(), c.hash());

        let d = Node::with_id("n4", "other text").with_metadata("author", "hugo");
        assert_ne!(a.hash(), d.hash());
    }

    #[test]
    fn test_hash_ignores_excluded_embed_keys() {
        let a = Node::with_id("n1", "text")
            .with_metadata("file_path", "/tmp/a.txt")
            .with_excluded_embed_key("file_path");
        let b = Node::with_id("n2", "text")
            .with_metadata("file_path", "/tmp/b.txt")
            .with_excluded_embed_key("file_path");
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_content_modes() {
        let node = Node::with_id("n1", "body")
            .with_metadata("title", "T")
            .with_metadata("secret", "S")
            .with_excluded_llm_key("secret");

        assert_eq!(node.content(MetadataMode::None), "body");
        assert_eq!(node.content(MetadataMode::Llm), "title: T\n\nbody");
        assert_eq!(node.content(MetadataMode::All), "secret: S\ntitle: T\n\nbody");
    }

    #[test]
    fn test_relationship_accessors() {
        let doc = Node::document("d1", "full text");
        let mut chunk = Node::with_id("d1:0", "full");
        chunk.set_relationship(NodeRelationship::Source, doc.as_related_node_info());
        chunk.push_child(RelatedNodeInfo::new("leaf-a"));
        chunk.push_child(RelatedNodeInfo::new("leaf-b"));

        assert_eq!(chunk.ref_doc_id(), Some("d1"));
        assert_eq!(chunk.child_nodes().len(), 2);
        assert!(chunk.prev_node().is_none());
    }

    #[test]
    fn test_image_requires_mime_type() {
        let mut node = Node::with_id("img", "");
        node.node_type = NodeType::Image;
        node.image = Some("base64data".to_string());
        assert!(node.validate().is_err());

        node.mime_type = Some("image/png".to_string());
        assert!(node.validate().is_ok());
    }

    #[test]
    fn test_node_json_round_trip() {
        let doc = Node::document("d1", "source text");
        let mut node = Node::with_id("d1:0", "chunk text")
            .with_metadata("lang", "en")
            .with_embedding(vec![0.1, 0.2])
            .with_excluded_embed_key("lang");
        node.set_relationship(NodeRelationship::Source, doc.as_related_node_info());
        node.start_char_idx = Some(0);
        node.end_char_idx = Some(10);

        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
        assert_eq!(node.hash(), back.hash());
    }
}
