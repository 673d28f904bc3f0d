//! Graph execution
//!
//! A run is a lazy stream of [`StepRecord`]s, one per node visit. Nothing
//! happens until the caller polls; dropping the stream stops the run. The
//! stream ends at `END`, or after the first error.
//!
//! The recursion limit counts node visits: with a limit of `N` the stream
//! yields at most `N` records, and a run that has not reached `END` by then
//! fails with [`GraphError::RecursionLimitExceeded`].

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::error::GraphError;
use crate::graph::{CompiledGraph, END};
use crate::llm::TokenUsage;
use crate::router::Completion;
use crate::state::{ConversationState, Message};
use crate::tools::ChartArtifact;

/// Default bound on node visits per run
pub const DEFAULT_RECURSION_LIMIT: usize = 150;

/// Per-run settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub recursion_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl RunConfig {
    pub fn with_recursion_limit(limit: usize) -> Self {
        Self {
            recursion_limit: limit,
        }
    }
}

/// One node visit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based visit number within the run
    pub step: usize,
    /// Node just visited
    pub node: String,
    /// Messages the node produced, trailing (handed-off) message last
    pub messages: Vec<Message>,
    pub completion: Completion,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ChartArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StepRecord {
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn is_final(&self) -> bool {
        self.completion.is_final()
    }
}

/// Lazy stream of step records
pub struct StepStream {
    inner: Pin<Box<dyn Stream<Item = Result<StepRecord, GraphError>> + Send>>,
}

impl StepStream {
    fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<StepRecord, GraphError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Advance the run by one node visit.
    pub async fn next_step(&mut self) -> Option<Result<StepRecord, GraphError>> {
        self.inner.next().await
    }
}

impl Stream for StepStream {
    type Item = Result<StepRecord, GraphError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for StepStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepStream").finish_non_exhaustive()
    }
}

/// A run driven to completion
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub state: ConversationState,
    pub steps: Vec<StepRecord>,
}

impl RunOutcome {
    pub fn final_answer(&self) -> Option<&str> {
        self.steps.last().and_then(|step| step.completion.answer())
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ChartArtifact> {
        self.steps.iter().flat_map(|step| step.artifacts.iter())
    }

    pub fn visited(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.node.as_str()).collect()
    }
}

struct Cursor {
    graph: CompiledGraph,
    state: ConversationState,
    next: String,
    visits: usize,
    limit: usize,
}

async fn advance(mut cursor: Cursor) -> Result<Option<(StepRecord, Cursor)>, GraphError> {
    if cursor.next == END {
        info!(steps = cursor.visits, "Run reached END");
        return Ok(None);
    }
    if cursor.visits == 0 && cursor.state.is_empty() {
        error!("Run started with an empty conversation");
        return Err(GraphError::EmptyState);
    }
    if cursor.visits >= cursor.limit {
        warn!(limit = cursor.limit, "Recursion limit reached");
        return Err(GraphError::RecursionLimitExceeded { limit: cursor.limit });
    }

    let node_id = std::mem::take(&mut cursor.next);
    let node = cursor
        .graph
        .node(&node_id)
        .cloned()
        .ok_or_else(|| GraphError::UnknownNode(node_id.clone()))?;

    debug!(node = %node_id, step = cursor.visits + 1, "Visiting node");
    let output = node.run(&cursor.state).await.map_err(|source| {
        error!(node = %node_id, error = %source, "Node failed");
        GraphError::Node {
            node: node_id.clone(),
            source,
        }
    })?;
    cursor.visits += 1;

    cursor.state.merge(output.messages.iter().cloned());
    let completion = cursor
        .state
        .last()
        .map(Completion::from_message)
        .unwrap_or(Completion::Continue);
    cursor.next = cursor.graph.next_node(&node_id, &cursor.state).map_err(|e| {
        error!(node = %node_id, error = %e, "Routing failed");
        e
    })?;

    info!(
        node = %node_id,
        step = cursor.visits,
        messages = output.messages.len(),
        artifacts = output.artifacts.len(),
        next = %cursor.next,
        "Step complete"
    );

    let record = StepRecord {
        step: cursor.visits,
        node: node_id,
        messages: output.messages,
        completion,
        artifacts: output.artifacts,
        usage: output.usage,
    };
    Ok(Some((record, cursor)))
}

impl CompiledGraph {
    /// Start a run over `initial`. Nothing executes until the stream is polled.
    pub fn stream(&self, initial: ConversationState, config: RunConfig) -> StepStream {
        self.stream_in(initial, config, Span::current())
    }

    fn stream_in(&self, initial: ConversationState, config: RunConfig, span: Span) -> StepStream {
        let cursor = Cursor {
            graph: self.clone(),
            state: initial,
            next: self.entry_point().to_string(),
            visits: 0,
            limit: config.recursion_limit,
        };
        StepStream::new(stream::try_unfold(cursor, move |cursor| {
            advance(cursor).instrument(span.clone())
        }))
    }

    /// Drive a run to `END`.
    pub async fn invoke(&self, initial: ConversationState, config: RunConfig) -> Result<RunOutcome, GraphError> {
        let mut state = initial.clone();
        let mut steps = Vec::new();
        let mut stream = self.stream(initial, config);
        while let Some(step) = stream.next_step().await {
            let step = step?;
            state.merge(step.messages.iter().cloned());
            steps.push(step);
        }
        Ok(RunOutcome { state, steps })
    }
}

/// Conversation-scoped context handed to the executor
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    started_at: DateTime<Utc>,
    runs: AtomicUsize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Runs started so far
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn next_run(&self) -> usize {
        self.runs.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Runs the graph on behalf of one conversation
///
/// ```rust,ignore
/// let executor = GraphExecutor::new(graph, Session::new());
/// let mut steps = executor.execute_single("Get the UK's GDP over the past 5 years, then chart it.");
/// while let Some(step) = steps.next_step().await {
///     let step = step?;
///     println!("{}: {}", step.node, step.completion.is_final());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GraphExecutor {
    graph: CompiledGraph,
    session: Arc<Session>,
}

impl GraphExecutor {
    pub fn new(graph: CompiledGraph, session: Session) -> Self {
        Self {
            graph,
            session: Arc::new(session),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Run on a single user message with the default recursion limit.
    pub fn execute_single(&self, user_input: &str) -> StepStream {
        self.execute_single_with_limit(user_input, DEFAULT_RECURSION_LIMIT)
    }

    pub fn execute_single_with_limit(&self, user_input: &str, recursion_limit: usize) -> StepStream {
        self.execute_chat(
            vec![Message::user(user_input)],
            RunConfig::with_recursion_limit(recursion_limit),
        )
    }

    /// Run on an existing message history.
    pub fn execute_chat(&self, messages: Vec<Message>, config: RunConfig) -> StepStream {
        let run = self.session.next_run();
        let span = info_span!("run", session = %self.session.id, run);
        span.in_scope(|| {
            info!(
                messages = messages.len(),
                recursion_limit = config.recursion_limit,
                "Starting graph run"
            );
        });
        self.graph
            .stream_in(ConversationState::with_messages(messages), config, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::graph::{Node, NodeOutput, StateGraph};
    use crate::router::{route, RouteDecision};
    use async_trait::async_trait;

    static_assertions::assert_impl_all!(StepStream: Send);
    static_assertions::assert_impl_all!(GraphExecutor: Send, Sync, Clone);

    struct Reply(&'static str);

    #[async_trait]
    impl Node for Reply {
        async fn run(&self, _state: &ConversationState) -> Result<NodeOutput, AgentError> {
            Ok(NodeOutput::messages(vec![Message::assistant(self.0)]))
        }
    }

    fn single_node_graph(reply: &'static str) -> CompiledGraph {
        StateGraph::new()
            .node("solo", Arc::new(Reply(reply)))
            .entry("solo")
            .conditional_edges("solo", route, vec![
                (RouteDecision::Continue, "solo"),
                (RouteDecision::Terminate, END),
            ])
            .compile()
            .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_stops_on_final_answer() {
        let graph = single_node_graph("FINAL ANSWER: 42");
        let outcome = graph
            .invoke(ConversationState::from_user_input("q"), RunConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome.visited(), vec!["solo"]);
        assert_eq!(outcome.final_answer(), Some("42"));
        assert_eq!(outcome.state.len(), 2);
    }

    #[tokio::test]
    async fn test_recursion_limit_after_exactly_n_visits() {
        let graph = single_node_graph("still working");
        let mut stream = graph.stream(
            ConversationState::from_user_input("q"),
            RunConfig::with_recursion_limit(4),
        );

        let mut visits = 0;
        let mut failure = None;
        while let Some(step) = stream.next_step().await {
            match step {
                Ok(record) => {
                    visits += 1;
                    assert_eq!(record.step, visits);
                    assert_eq!(record.completion, Completion::Continue);
                }
                Err(e) => failure = Some(e),
            }
        }

        assert_eq!(visits, 4);
        assert!(matches!(failure, Some(GraphError::RecursionLimitExceeded { limit: 4 })));
    }

    struct Silent;

    #[async_trait]
    impl Node for Silent {
        async fn run(&self, _state: &ConversationState) -> Result<NodeOutput, AgentError> {
            Ok(NodeOutput::messages(Vec::new()))
        }
    }

    #[tokio::test]
    async fn test_completion_follows_merged_state() {
        let graph = StateGraph::new()
            .node("solo", Arc::new(Silent))
            .entry("solo")
            .conditional_edges("solo", route, vec![
                (RouteDecision::Continue, "solo"),
                (RouteDecision::Terminate, END),
            ])
            .compile()
            .unwrap();
        let mut stream = graph.stream(
            ConversationState::from_user_input("FINAL ANSWER: already known"),
            RunConfig::default(),
        );

        let record = stream.next_step().await.unwrap().unwrap();
        assert!(record.messages.is_empty());
        assert_eq!(record.completion, Completion::Final("already known".to_string()));
        assert!(stream.next_step().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_initial_state_is_error() {
        let graph = single_node_graph("x");
        let mut stream = graph.stream(ConversationState::new(), RunConfig::default());

        assert!(matches!(stream.next_step().await, Some(Err(GraphError::EmptyState))));
        assert!(stream.next_step().await.is_none());
    }

    #[tokio::test]
    async fn test_session_counts_runs() {
        let executor = GraphExecutor::new(single_node_graph("FINAL ANSWER"), Session::new());
        assert_eq!(executor.session().runs(), 0);

        let mut first = executor.execute_single("a");
        while first.next_step().await.is_some() {}
        let _second = executor.execute_single_with_limit("b", 3);

        assert_eq!(executor.session().runs(), 2);
    }

    #[test]
    fn test_step_record_json_shape() {
        let record = StepRecord {
            step: 1,
            node: "researcher".to_string(),
            messages: vec![Message::assistant("FINAL ANSWER: done").handoff("researcher")],
            completion: Completion::Final("done".to_string()),
            artifacts: Vec::new(),
            usage: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["node"], "researcher");
        assert_eq!(json["completion"]["status"], "final");
        assert_eq!(json["messages"][0]["name"], "researcher");
        assert!(json.get("artifacts").is_none());
    }
}
