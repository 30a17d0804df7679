//! Router retriever
//!
//! Holds a set of named retriever tools and a selector that decides which
//! of them a query goes to. The bundled selectors are deterministic;
//! LLM-driven selection plugs in behind the same [`Selector`] trait.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use lodestone_core::node::sort_by_score_desc;
use lodestone_core::{NodeWithScore, QueryBundle};

use crate::error::{RagError, Result};
use crate::retriever::Retriever;

/// A retriever with a name and description the selector can inspect
pub struct RetrieverTool {
    pub retriever: Arc<dyn Retriever>,
    pub name: String,
    pub description: String,
}

impl RetrieverTool {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            retriever,
            name: name.into(),
            description: description.into(),
        }
    }

    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

/// The part of a tool a selector sees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
}

/// One routing decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub reason: String,
}

/// Chooses which tools handle a query
#[async_trait]
pub trait Selector: Send + Sync {
    async fn select(
        &self,
        ctx: &CancellationToken,
        tools: &[ToolMetadata],
        query: &QueryBundle,
    ) -> Result<Vec<Selection>>;
}

/// Routes to every tool
pub struct SimpleSelector;

#[async_trait]
impl Selector for SimpleSelector {
    async fn select(
        &self,
        _ctx: &CancellationToken,
        tools: &[ToolMetadata],
        _query: &QueryBundle,
    ) -> Result<Vec<Selection>> {
        Ok((0..tools.len())
            .map(|index| Selection {
                index,
                reason: "routing to all tools".to_string(),
            })
            .collect())
    }
}

/// Routes to exactly one tool; this implementation always picks the first
pub struct SingleSelector;

#[async_trait]
impl Selector for SingleSelector {
    async fn select(
        &self,
        _ctx: &CancellationToken,
        tools: &[ToolMetadata],
        _query: &QueryBundle,
    ) -> Result<Vec<Selection>> {
        let first = tools.first().ok_or_else(|| {
            RagError::Configuration("single selector over an empty tool list".to_string())
        })?;
        Ok(vec![Selection {
            index: 0,
            reason: format!("defaulting to first tool '{}'", first.name),
        }])
    }
}

/// Routes to a bounded subset of tools, in declaration order
pub struct MultiSelector {
    max_outputs: usize,
}

impl MultiSelector {
    pub fn new(max_outputs: usize) -> Self {
        Self { max_outputs }
    }
}

#[async_trait]
impl Selector for MultiSelector {
    async fn select(
        &self,
        _ctx: &CancellationToken,
        tools: &[ToolMetadata],
        _query: &QueryBundle,
    ) -> Result<Vec<Selection>> {
        Ok((0..tools.len().min(self.max_outputs))
            .map(|index| Selection {
                index,
                reason: format!("within the first {} tools", self.max_outputs),
            })
            .collect())
    }
}

/// Retriever that fans a query out to selector-chosen tools
pub struct RouterRetriever {
    tools: Vec<RetrieverTool>,
    selector: Arc<dyn Selector>,
}

impl std::fmt::Debug for RouterRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterRetriever")
            .field("tools_len", &self.tools.len())
            .finish()
    }
}

impl RouterRetriever {
    pub fn new(tools: Vec<RetrieverTool>, selector: Arc<dyn Selector>) -> Result<Self> {
        if tools.is_empty() {
            return Err(RagError::Configuration(
                "router retriever needs at least one tool".to_string(),
            ));
        }
        Ok(Self { tools, selector })
    }
}

#[async_trait]
impl Retriever for RouterRetriever {
    async fn retrieve(
        &self,
        ctx: &CancellationToken,
        query: &QueryBundle,
    ) -> Result<Vec<NodeWithScore>> {
        let metadata: Vec<ToolMetadata> = self.tools.iter().map(|t| t.metadata()).collect();
        let selections = self.selector.select(ctx, &metadata, query).await?;

        let mut seen_hashes: HashSet<String> = HashSet::new();
        let mut combined: Vec<NodeWithScore> = Vec::new();
        for selection in selections {
            let tool = self.tools.get(selection.index).ok_or_else(|| {
                RagError::Internal(format!(
                    "selector chose tool index {} of {}",
                    selection.index,
                    self.tools.len()
                ))
            })?;
            debug!(tool = %tool.name, reason = %selection.reason, "routing query");

            let results = tool.retriever.retrieve(ctx, query).await?;
            for result in results {
                // first-seen score wins for duplicate content
                if seen_hashes.insert(result.node.hash()) {
                    combined.push(result);
                }
            }
        }

        sort_by_score_desc(&mut combined);
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodestone_core::Node;

    struct FixedRetriever {
        results: Vec<NodeWithScore>,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(
            &self,
            _ctx: &CancellationToken,
            _query: &QueryBundle,
        ) -> Result<Vec<NodeWithScore>> {
            Ok(self.results.clone())
        }
    }

    fn tool(name: &str, results: &[(&str, f32)]) -> RetrieverTool {
        RetrieverTool::new(
            Arc::new(FixedRetriever {
                results: results
                    .iter()
                    .map(|(text, score)| NodeWithScore::new(Node::with_id(*text, *text), *score))
                    .collect(),
            }),
            name,
            format!("tool {name}"),
        )
    }

    #[tokio::test]
    async fn test_empty_tools_is_configuration_error() {
        let err = RouterRetriever::new(Vec::new(), Arc::new(SingleSelector)).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_single_selector_routes_to_first() {
        let router = RouterRetriever::new(
            vec![tool("first", &[("a", 0.9)]), tool("second", &[("b", 0.8)])],
            Arc::new(SingleSelector),
        )
        .unwrap();
        let ctx = CancellationToken::new();

        let results = router.retrieve(&ctx, &QueryBundle::new("q")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node.id, "a");
    }

    #[tokio::test]
    async fn test_simple_selector_fans_out_to_all() {
        let router = RouterRetriever::new(
            vec![tool("first", &[("a", 0.4)]), tool("second", &[("b", 0.9)])],
            Arc::new(SimpleSelector),
        )
        .unwrap();
        let ctx = CancellationToken::new();

        let results = router.retrieve(&ctx, &QueryBundle::new("q")).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].node.id, "b");
    }

    #[tokio::test]
    async fn test_multi_selector_takes_subset() {
        let router = RouterRetriever::new(
            vec![
                tool("first", &[("a", 0.4)]),
                tool("second", &[("b", 0.9)]),
                tool("third", &[("c", 0.7)]),
            ],
            Arc::new(MultiSelector::new(2)),
        )
        .unwrap();
        let ctx = CancellationToken::new();

        let results = router.retrieve(&ctx, &QueryBundle::new("q")).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.node.id.as_str()).collect();
        assert!(ids.contains(&"a") && ids.contains(&"b"));
        assert!(!ids.contains(&"c"));
    }

    #[tokio::test]
    async fn test_duplicate_content_keeps_first_seen_score() {
        let router = RouterRetriever::new(
            vec![
                tool("first", &[("same text", 0.4)]),
                tool("second", &[("same text", 0.9)]),
            ],
            Arc::new(SimpleSelector),
        )
        .unwrap();
        let ctx = CancellationToken::new();

        let results = router.retrieve(&ctx, &QueryBundle::new("q")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 0.4).abs() < 1e-6);
    }
}
