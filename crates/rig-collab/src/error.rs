//! Error types
//!
//! Tool failures stay inside the conversation (the agent loop turns them into
//! tool-result text). Everything else aborts the current run.

use thiserror::Error;

/// Tool execution error
///
/// Never reaches the graph: [`crate::agent::ReactAgent`] converts it into a
/// `"Tool error: ..."` message so the model can react to it.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution error: {0}")]
    Execution(String),
}

/// Agent invocation error
#[derive(Error, Debug)]
pub enum AgentError {
    /// The reasoning backend failed (network, auth, rate limit, bad response).
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Agent '{agent}' did not finish within {limit} model calls")]
    MaxIterations { agent: String, limit: usize },
}

/// Routing error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("cannot route an empty conversation")]
    EmptyState,
}

/// Errors that can occur while compiling a graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphBuildError {
    #[error("graph entry point not set")]
    NoEntryPoint,

    #[error("unknown node id: {0}")]
    UnknownNode(String),

    #[error("node '{0}' is registered twice")]
    DuplicateNode(String),

    #[error("node '{0}' has no outgoing edge")]
    MissingEdge(String),

    #[error("node '{0}' has more than one outgoing edge")]
    DuplicateEdge(String),

    #[error("conditional edges from '{node}' do not cover '{decision}'")]
    UncoveredDecision { node: String, decision: String },
}

/// Errors surfaced by a graph run.
///
/// The step stream ends after yielding one of these.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("cannot run the graph on an empty conversation")]
    EmptyState,

    #[error("Recursion limit of {limit} reached without hitting END")]
    RecursionLimitExceeded { limit: usize },

    #[error("node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: AgentError,
    },

    #[error("unknown node id: {0}")]
    UnknownNode(String),
}

impl From<RouteError> for GraphError {
    fn from(e: RouteError) -> Self {
        match e {
            RouteError::EmptyState => GraphError::EmptyState,
        }
    }
}

impl GraphError {
    /// Name of the failing node, if the error came from a node.
    pub fn node(&self) -> Option<&str> {
        match self {
            GraphError::Node { node, .. } => Some(node),
            _ => None,
        }
    }
}
