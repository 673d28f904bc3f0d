//! StateGraph builder DSL.
//!
//! Nodes are registered by id, wired with direct or conditional edges, then
//! validated and compiled into a [`CompiledGraph`] that the executor drives.
//! Every node must have exactly one outgoing transition.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, GraphBuildError, GraphError, RouteError};
use crate::llm::TokenUsage;
use crate::router::RouteDecision;
use crate::state::{ConversationState, Message};
use crate::tools::ChartArtifact;

/// Sentinel source of the entry edge.
pub const START: &str = "START";

/// Sentinel target for terminal edges.
pub const END: &str = "END";

/// What a node contributes in one visit
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    /// Messages to append, trailing message last
    pub messages: Vec<Message>,
    pub artifacts: Vec<ChartArtifact>,
    pub usage: Option<TokenUsage>,
}

impl NodeOutput {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// A graph vertex
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &ConversationState) -> Result<NodeOutput, AgentError>;
}

pub type DynNode = Arc<dyn Node>;

pub type RouterFn = Arc<dyn Fn(&ConversationState) -> Result<RouteDecision, RouteError> + Send + Sync>;

#[derive(Clone)]
enum Transition {
    Direct(String),
    Conditional {
        router: RouterFn,
        branches: HashMap<RouteDecision, String>,
    },
}

impl Transition {
    fn targets(&self) -> Vec<&str> {
        match self {
            Transition::Direct(to) => vec![to.as_str()],
            Transition::Conditional { branches, .. } => branches.values().map(String::as_str).collect(),
        }
    }
}

/// Builder for constructing graphs with fluent API.
///
/// ```rust,ignore
/// let graph = StateGraph::new()
///     .node("researcher", researcher)
///     .node("chart_generator", chart_generator)
///     .entry("researcher")
///     .conditional_edges("researcher", route, vec![
///         (RouteDecision::Continue, "chart_generator"),
///         (RouteDecision::Terminate, END),
///     ])
///     .conditional_edges("chart_generator", route, vec![
///         (RouteDecision::Continue, "researcher"),
///         (RouteDecision::Terminate, END),
///     ])
///     .compile()?;
/// ```
#[derive(Default)]
pub struct StateGraph {
    nodes: Vec<(String, DynNode)>,
    transitions: Vec<(String, Transition)>,
    entry_point: Option<String>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, id: impl Into<String>, node: DynNode) -> Self {
        self.nodes.push((id.into(), node));
        self
    }

    /// Set the node the `START` edge points to.
    pub fn entry(mut self, id: impl Into<String>) -> Self {
        self.entry_point = Some(id.into());
        self
    }

    /// Add a direct edge between nodes.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions.push((from.into(), Transition::Direct(to.into())));
        self
    }

    /// Route from a node by decision.
    pub fn conditional_edges<F>(
        mut self,
        from: impl Into<String>,
        router: F,
        branches: Vec<(RouteDecision, &str)>,
    ) -> Self
    where
        F: Fn(&ConversationState) -> Result<RouteDecision, RouteError> + Send + Sync + 'static,
    {
        let branches = branches
            .into_iter()
            .map(|(decision, target)| (decision, target.to_string()))
            .collect();
        self.transitions.push((
            from.into(),
            Transition::Conditional {
                router: Arc::new(router),
                branches,
            },
        ));
        self
    }

    /// Validate and compile the graph.
    pub fn compile(self) -> Result<CompiledGraph, GraphBuildError> {
        let entry_point = self.entry_point.ok_or(GraphBuildError::NoEntryPoint)?;

        let mut nodes: HashMap<String, DynNode> = HashMap::new();
        for (id, node) in self.nodes {
            if id == START || id == END || nodes.contains_key(&id) {
                return Err(GraphBuildError::DuplicateNode(id));
            }
            nodes.insert(id, node);
        }

        if !nodes.contains_key(&entry_point) {
            return Err(GraphBuildError::UnknownNode(entry_point));
        }

        let mut transitions: HashMap<String, Transition> = HashMap::new();
        for (from, transition) in self.transitions {
            if !nodes.contains_key(&from) {
                return Err(GraphBuildError::UnknownNode(from));
            }
            if let Some(target) = transition
                .targets()
                .into_iter()
                .find(|to| *to != END && !nodes.contains_key(*to))
            {
                return Err(GraphBuildError::UnknownNode(target.to_string()));
            }
            if let Transition::Conditional { branches, .. } = &transition {
                for decision in [RouteDecision::Continue, RouteDecision::Terminate] {
                    if !branches.contains_key(&decision) {
                        return Err(GraphBuildError::UncoveredDecision {
                            node: from,
                            decision: decision.to_string(),
                        });
                    }
                }
            }
            if transitions.contains_key(&from) {
                return Err(GraphBuildError::DuplicateEdge(from));
            }
            transitions.insert(from, transition);
        }

        let mut ids: Vec<&String> = nodes.keys().collect();
        ids.sort();
        if let Some(id) = ids.into_iter().find(|id| !transitions.contains_key(*id)) {
            return Err(GraphBuildError::MissingEdge(id.clone()));
        }

        Ok(CompiledGraph {
            inner: Arc::new(GraphInner {
                nodes,
                transitions,
                entry_point,
            }),
        })
    }
}

struct GraphInner {
    nodes: HashMap<String, DynNode>,
    transitions: HashMap<String, Transition>,
    entry_point: String,
}

/// Validated graph, cheap to clone
#[derive(Clone)]
pub struct CompiledGraph {
    inner: Arc<GraphInner>,
}

impl CompiledGraph {
    pub fn entry_point(&self) -> &str {
        &self.inner.entry_point
    }

    pub fn node(&self, id: &str) -> Option<&DynNode> {
        self.inner.nodes.get(id)
    }

    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.inner.nodes.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Node to visit after `from`, or [`END`].
    pub fn next_node(&self, from: &str, state: &ConversationState) -> Result<String, GraphError> {
        let transition = self
            .inner
            .transitions
            .get(from)
            .ok_or_else(|| GraphError::UnknownNode(from.to_string()))?;

        match transition {
            Transition::Direct(to) => Ok(to.clone()),
            Transition::Conditional { router, branches } => {
                let decision = router(state)?;
                branches
                    .get(&decision)
                    .cloned()
                    .ok_or_else(|| GraphError::UnknownNode(format!("{from} -> {decision}")))
            }
        }
    }
}

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("entry_point", &self.inner.entry_point)
            .field("nodes", &self.node_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::route;

    struct Echo;

    #[async_trait]
    impl Node for Echo {
        async fn run(&self, _state: &ConversationState) -> Result<NodeOutput, AgentError> {
            Ok(NodeOutput::messages(vec![Message::assistant("echo")]))
        }
    }

    fn echo() -> DynNode {
        Arc::new(Echo)
    }

    fn two_node_graph() -> StateGraph {
        StateGraph::new()
            .node("a", echo())
            .node("b", echo())
            .entry("a")
            .conditional_edges("a", route, vec![
                (RouteDecision::Continue, "b"),
                (RouteDecision::Terminate, END),
            ])
    }

    #[test]
    fn test_compile_and_route() {
        let graph = two_node_graph().edge("b", "a").compile().unwrap();

        assert_eq!(graph.entry_point(), "a");
        assert_eq!(graph.node_ids(), vec!["a", "b"]);

        let working = ConversationState::from_user_input("go");
        assert_eq!(graph.next_node("a", &working).unwrap(), "b");
        assert_eq!(graph.next_node("b", &working).unwrap(), "a");

        let done = ConversationState::with_messages(vec![Message::assistant("FINAL ANSWER: 1")]);
        assert_eq!(graph.next_node("a", &done).unwrap(), END);
    }

    #[test]
    fn test_routing_empty_state_is_error() {
        let graph = two_node_graph().edge("b", "a").compile().unwrap();
        let err = graph.next_node("a", &ConversationState::new()).unwrap_err();
        assert!(matches!(err, GraphError::EmptyState));
    }

    #[test]
    fn test_missing_entry() {
        let result = StateGraph::new().node("a", echo()).edge("a", END).compile();
        assert_eq!(result.unwrap_err(), GraphBuildError::NoEntryPoint);
    }

    #[test]
    fn test_unknown_target() {
        let result = StateGraph::new()
            .node("a", echo())
            .entry("a")
            .edge("a", "missing")
            .compile();
        assert_eq!(result.unwrap_err(), GraphBuildError::UnknownNode("missing".to_string()));
    }

    #[test]
    fn test_node_without_edge() {
        let result = two_node_graph().compile();
        assert_eq!(result.unwrap_err(), GraphBuildError::MissingEdge("b".to_string()));
    }

    #[test]
    fn test_duplicate_edge() {
        let result = two_node_graph().edge("b", "a").edge("a", END).compile();
        assert_eq!(result.unwrap_err(), GraphBuildError::DuplicateEdge("a".to_string()));
    }

    #[test]
    fn test_duplicate_and_reserved_node_ids() {
        let result = StateGraph::new()
            .node("a", echo())
            .node("a", echo())
            .entry("a")
            .edge("a", END)
            .compile();
        assert_eq!(result.unwrap_err(), GraphBuildError::DuplicateNode("a".to_string()));

        let result = StateGraph::new().node(END, echo()).entry(END).compile();
        assert_eq!(result.unwrap_err(), GraphBuildError::DuplicateNode(END.to_string()));
    }

    #[test]
    fn test_conditional_edges_must_cover_both_decisions() {
        let result = StateGraph::new()
            .node("a", echo())
            .entry("a")
            .conditional_edges("a", route, vec![(RouteDecision::Continue, "a")])
            .compile();
        assert_eq!(
            result.unwrap_err(),
            GraphBuildError::UncoveredDecision {
                node: "a".to_string(),
                decision: "terminate".to_string(),
            }
        );
    }
}
