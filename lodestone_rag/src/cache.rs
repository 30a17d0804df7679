//! Ingestion cache
//!
//! Content-addressed memoization of per-transform outputs. The key is a
//! digest of the transform name and the ordered input node hashes, so a
//! re-run over unchanged input skips the transform entirely. The cache is
//! advisory: clearing it never loses user data.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use lodestone_core::Node;

use crate::error::{RagError, Result};

/// Format tag written into the persistence envelope
const PERSIST_FORMAT: &str = "lodestone.cache.v1";

/// Default collection name
pub const DEFAULT_CACHE_COLLECTION: &str = "ingest_cache";

/// Cache key for running `transform_name` over `nodes`
pub fn cache_key(transform_name: &str, nodes: &[Node]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(transform_name.as_bytes());
    hasher.update(b"\n");
    for node in nodes {
        hasher.update(node.hash().as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    transform: String,
    nodes: Vec<Node>,
}

/// One persisted entry; self-describing so loads can be validated
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    collection: String,
    transform: String,
    key: String,
    nodes: Vec<Node>,
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    format: String,
    saved_at: DateTime<Utc>,
    collection: String,
    entries: Vec<PersistedEntry>,
}

/// Thread-safe transform-output cache
///
/// At most one stored value per key; last write wins. Hits return the
/// stored nodes byte-for-byte.
pub struct IngestionCache {
    collection: String,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl IngestionCache {
    pub fn new() -> Self {
        Self::with_collection(DEFAULT_CACHE_COLLECTION)
    }

    pub fn with_collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Stored output for `key`, if any
    pub fn get(&self, key: &str) -> Option<Vec<Node>> {
        self.entries.read().get(key).map(|e| e.nodes.clone())
    }

    /// Store the output of `transform` under `key`
    pub fn put(&self, key: impl Into<String>, transform: impl Into<String>, nodes: Vec<Node>) {
        let key = key.into();
        debug!(key = %key, count = nodes.len(), "cache put");
        self.entries.write().insert(
            key,
            CacheEntry {
                transform: transform.into(),
                nodes,
            },
        );
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write the cache to `path` as a self-describing JSON envelope
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let entries = self.entries.read();
        let envelope = PersistedCache {
            format: PERSIST_FORMAT.to_string(),
            saved_at: Utc::now(),
            collection: self.collection.clone(),
            entries: entries
                .iter()
                .map(|(key, entry)| PersistedEntry {
                    collection: self.collection.clone(),
                    transform: entry.transform.clone(),
                    key: key.clone(),
                    nodes: entry.nodes.clone(),
                })
                .collect(),
        };
        let file = File::create(path.as_ref())?;
        serde_json::to_writer(BufWriter::new(file), &envelope)?;
        info!(
            entries = envelope.entries.len(),
            path = %path.as_ref().display(),
            "ingestion cache persisted"
        );
        Ok(())
    }

    /// Load a cache persisted with [`persist`](Self::persist)
    ///
    /// The format tag and every entry's collection name are validated;
    /// a mismatch is a configuration error rather than a silent partial
    /// load.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let envelope: PersistedCache = serde_json::from_reader(BufReader::new(file))?;
        if envelope.format != PERSIST_FORMAT {
            return Err(RagError::Configuration(format!(
                "unknown cache format '{}', expected '{}'",
                envelope.format, PERSIST_FORMAT
            )));
        }

        let mut entries = HashMap::with_capacity(envelope.entries.len());
        for entry in envelope.entries {
            if entry.collection != envelope.collection {
                return Err(RagError::Configuration(format!(
                    "cache entry for collection '{}' found in collection '{}'",
                    entry.collection, envelope.collection
                )));
            }
            entries.insert(
                entry.key,
                CacheEntry {
                    transform: entry.transform,
                    nodes: entry.nodes,
                },
            );
        }

        Ok(Self {
            collection: envelope.collection,
            entries: RwLock::new(entries),
        })
    }
}

impl Default for IngestionCache {
    fn default() -> Self {
        Self::new()
    }
}
