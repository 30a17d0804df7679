//! Sentence-aware text splitting
//!
//! [`SentenceSplitter`] cuts text into token-budgeted chunks, preferring
//! sentence boundaries, then paragraph breaks, then whitespace, then a
//! hard token cut. [`HierarchicalSplitter`] layers it into a parent/child
//! forest for auto-merging retrieval. Both are pipeline transforms.

pub mod hierarchical;

pub use hierarchical::{leaf_nodes, root_nodes, HierarchicalSplitter};

use async_trait::async_trait;
use regex::Regex;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::cancellation::ensure_active;
use lodestone_core::{MetadataMode, Node, NodeRelationship, NodeType};

use crate::error::{RagError, Result};
use crate::pipeline::Transform;

/// Token counter over the cl100k_base BPE vocabulary
pub struct Tokenizer {
    bpe: CoreBPE,
}

impl Tokenizer {
    pub fn cl100k() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| RagError::Internal(format!("tokenizer init: {e}")))?;
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    pub fn encode(&self, text: &str) -> Vec<usize> {
        self.bpe.encode_ordinary(text)
    }

    pub fn decode(&self, ids: &[usize]) -> Result<String> {
        self.bpe
            .decode(ids.to_vec())
            .map_err(|e| RagError::Internal(format!("token decode: {e}")))
    }
}

/// Sentence-aware splitter bounded by a token budget
///
/// A pure function of its input: the same text always produces the same
/// chunks. Adjacent chunks share roughly `chunk_overlap` tokens, carried
/// over at sentence boundaries where possible.
pub struct SentenceSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    tokenizer: Tokenizer,
    sentence_re: Regex,
    paragraph_re: Regex,
}

impl SentenceSplitter {
    /// Default chunk size in tokens
    pub const DEFAULT_CHUNK_SIZE: usize = 512;
    /// Default overlap in tokens
    pub const DEFAULT_CHUNK_OVERLAP: usize = 64;

    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Configuration("chunk_size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            tokenizer: Tokenizer::cl100k()?,
            sentence_re: Regex::new(r"[^.!?]*[.!?]+\s*")
                .map_err(|e| RagError::Internal(e.to_string()))?,
            paragraph_re: Regex::new(r"\n{2,}").map_err(|e| RagError::Internal(e.to_string()))?,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(Self::DEFAULT_CHUNK_SIZE, Self::DEFAULT_CHUNK_OVERLAP)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into chunks within the full token budget
    pub fn split_text(&self, text: &str) -> Result<Vec<String>> {
        Ok(self
            .split_spans(text, self.chunk_size)?
            .into_iter()
            .map(|(s, e)| text[s..e].to_string())
            .collect())
    }

    /// Split a node's text into chunk nodes linked back to their source
    ///
    /// The token budget shrinks by the node's embed-mode metadata
    /// preamble, so rendered chunks stay within `chunk_size`.
    pub fn split_node(&self, node: &Node) -> Result<Vec<Node>> {
        let spans = self.chunk_spans(node)?;
        let source = node
            .source_node()
            .cloned()
            .unwrap_or_else(|| node.as_related_node_info());

        let mut chunks: Vec<Node> = Vec::with_capacity(spans.len());
        for (i, (s, e)) in spans.iter().copied().enumerate() {
            let mut chunk = Node::with_id(format!("{}:{}", node.id, i), node.text[s..e].to_string());
            chunk.node_type = NodeType::Text;
            chunk.metadata = node.metadata.clone();
            chunk.excluded_embed_metadata_keys = node.excluded_embed_metadata_keys.clone();
            chunk.excluded_llm_metadata_keys = node.excluded_llm_metadata_keys.clone();
            chunk.start_char_idx = Some(s);
            chunk.end_char_idx = Some(e);
            chunk.set_relationship(NodeRelationship::Source, source.clone());
            chunks.push(chunk);
        }
        chain_siblings(&mut chunks);
        Ok(chunks)
    }

    /// Chunk spans for a node's text, with the budget shrunk by its
    /// metadata preamble
    pub(crate) fn chunk_spans(&self, node: &Node) -> Result<Vec<(usize, usize)>> {
        let preamble = node.metadata_str(MetadataMode::Embed);
        let budget = self.budget_for_preamble(&preamble)?;
        self.split_spans(&node.text, budget)
    }

    fn budget_for_preamble(&self, preamble: &str) -> Result<usize> {
        if preamble.is_empty() {
            return Ok(self.chunk_size);
        }
        let preamble_tokens = self.tokenizer.count(preamble);
        if preamble_tokens >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "metadata preamble ({preamble_tokens} tokens) exceeds chunk_size ({})",
                self.chunk_size
            )));
        }
        Ok(self.chunk_size - preamble_tokens)
    }

    /// Sentence spans covering the whole text in order
    fn sentence_spans(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut last = 0;
        for m in self.sentence_re.find_iter(text) {
            if m.start() > last {
                spans.push((last, m.start()));
            }
            spans.push((m.start(), m.end()));
            last = m.end();
        }
        if last < text.len() {
            spans.push((last, text.len()));
        }
        spans
    }

    fn split_spans(&self, text: &str, budget: usize) -> Result<Vec<(usize, usize)>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let spans = self.sentence_spans(text);
        let mut chunks: Vec<(usize, usize)> = Vec::new();
        let mut chunk_start = spans[0].0;
        let mut cur_tokens = 0usize;
        let mut has_sentences = false;
        let mut prev_end = spans[0].0;

        for idx in 0..spans.len() {
            let (s, e) = spans[idx];
            let tokens = self.tokenizer.count(&text[s..e]);

            if tokens > budget {
                if has_sentences {
                    chunks.push((chunk_start, prev_end));
                }
                self.split_oversize(text, (s, e), budget, &mut chunks)?;
                has_sentences = false;
                cur_tokens = 0;
                chunk_start = e;
                prev_end = e;
                continue;
            }

            if has_sentences && cur_tokens + tokens > budget {
                chunks.push((chunk_start, prev_end));
                // The overlap is capped so the triggering sentence still
                // fits inside the budget of the chunk it seeds.
                let max_overlap = self.chunk_overlap.min(budget - tokens);
                let overlap_start = self.overlap_start(text, &spans[..idx], max_overlap);
                chunk_start = overlap_start;
                cur_tokens = if overlap_start < prev_end {
                    self.tokenizer.count(&text[overlap_start..prev_end])
                } else {
                    0
                };
                has_sentences = false;
            }

            cur_tokens += tokens;
            prev_end = e;
            has_sentences = true;
        }

        if has_sentences {
            chunks.push((chunk_start, prev_end));
        }
        Ok(chunks)
    }

    /// Start offset of the overlap region ending at the last span
    fn overlap_start(&self, text: &str, spans: &[(usize, usize)], max_overlap: usize) -> usize {
        let Some(&(last_s, last_e)) = spans.last() else {
            return 0;
        };
        if max_overlap == 0 {
            return last_e;
        }

        let mut start = last_e;
        let mut tokens = 0usize;
        for &(s, e) in spans.iter().rev() {
            let t = self.tokenizer.count(&text[s..e]);
            if tokens + t > max_overlap {
                break;
            }
            tokens += t;
            start = s;
        }

        if tokens == 0 {
            // No whole sentence fits; fall back to a token suffix of the
            // final sentence.
            let ids = self.tokenizer.encode(&text[last_s..last_e]);
            if ids.len() <= max_overlap {
                return last_s;
            }
            if let Ok(suffix) = self.tokenizer.decode(&ids[ids.len() - max_overlap..]) {
                if text[last_s..last_e].ends_with(suffix.as_str()) {
                    return last_e - suffix.len();
                }
            }
        }
        start
    }

    /// A single sentence over the budget: paragraphs, then whitespace,
    /// then a hard token cut
    fn split_oversize(
        &self,
        text: &str,
        (s, e): (usize, usize),
        budget: usize,
        out: &mut Vec<(usize, usize)>,
    ) -> Result<()> {
        let seg = &text[s..e];

        let mut parts: Vec<(usize, usize)> = Vec::new();
        let mut last = 0;
        for m in self.paragraph_re.find_iter(seg) {
            parts.push((last, m.end()));
            last = m.end();
        }
        if last < seg.len() {
            parts.push((last, seg.len()));
        }

        if parts.len() > 1 {
            for (ps, pe) in parts {
                let abs = (s + ps, s + pe);
                if self.tokenizer.count(&seg[ps..pe]) <= budget {
                    out.push(abs);
                } else {
                    self.split_whitespace(text, abs, budget, out)?;
                }
            }
            Ok(())
        } else {
            self.split_whitespace(text, (s, e), budget, out)
        }
    }

    fn split_whitespace(
        &self,
        text: &str,
        (s, e): (usize, usize),
        budget: usize,
        out: &mut Vec<(usize, usize)>,
    ) -> Result<()> {
        let seg = &text[s..e];

        // Word spans with trailing whitespace attached, covering `seg`
        let mut words: Vec<(usize, usize)> = Vec::new();
        let mut word_start = 0;
        let mut in_whitespace = false;
        for (i, ch) in seg.char_indices() {
            if ch.is_whitespace() {
                in_whitespace = true;
            } else if in_whitespace {
                words.push((word_start, i));
                word_start = i;
                in_whitespace = false;
            }
        }
        if word_start < seg.len() {
            words.push((word_start, seg.len()));
        }

        let mut chunk_start: Option<usize> = None;
        let mut cur_tokens = 0usize;
        for (ws, we) in words {
            let t = self.tokenizer.count(&seg[ws..we]);
            if t > budget {
                if let Some(cs) = chunk_start.take() {
                    out.push((s + cs, s + ws));
                }
                self.hard_cut(text, (s + ws, s + we), budget, out)?;
                cur_tokens = 0;
                continue;
            }
            match chunk_start {
                None => {
                    chunk_start = Some(ws);
                    cur_tokens = t;
                }
                Some(cs) => {
                    if cur_tokens + t > budget {
                        out.push((s + cs, s + ws));
                        chunk_start = Some(ws);
                        cur_tokens = t;
                    } else {
                        cur_tokens += t;
                    }
                }
            }
        }
        if let Some(cs) = chunk_start {
            out.push((s + cs, e));
        }
        Ok(())
    }

    /// Last resort: budget-sized token windows
    fn hard_cut(
        &self,
        text: &str,
        (s, e): (usize, usize),
        budget: usize,
        out: &mut Vec<(usize, usize)>,
    ) -> Result<()> {
        let seg = &text[s..e];
        let ids = self.tokenizer.encode(seg);
        let mut i = 0;
        let mut offset = s;
        while i < ids.len() {
            let mut end = (i + budget).min(ids.len());
            let decoded = loop {
                match self.tokenizer.decode(&ids[i..end]) {
                    Ok(d) => break d,
                    // shrink the window off a partial UTF-8 sequence
                    Err(_) if end > i + 1 => end -= 1,
                    Err(err) => return Err(err),
                }
            };
            out.push((offset, offset + decoded.len()));
            offset += decoded.len();
            i = end;
        }
        Ok(())
    }
}

/// Link consecutive chunks with previous/next relationships
pub(crate) fn chain_siblings(chunks: &mut [Node]) {
    let infos: Vec<_> = chunks.iter().map(|c| c.as_related_node_info()).collect();
    for i in 0..chunks.len() {
        if i > 0 {
            chunks[i].set_relationship(NodeRelationship::Previous, infos[i - 1].clone());
        }
        if i + 1 < chunks.len() {
            chunks[i].set_relationship(NodeRelationship::Next, infos[i + 1].clone());
        }
    }
}

#[async_trait]
impl Transform for SentenceSplitter {
    fn name(&self) -> &str {
        "sentence_splitter"
    }

    async fn transform(&self, ctx: &CancellationToken, nodes: Vec<Node>) -> Result<Vec<Node>> {
        ensure_active(ctx)?;
        let mut out = Vec::new();
        for node in &nodes {
            let chunks = self.split_node(node)?;
            debug!(node = %node.id, chunks = chunks.len(), "split node");
            out.extend(chunks);
        }
        Ok(out)
    }
}
