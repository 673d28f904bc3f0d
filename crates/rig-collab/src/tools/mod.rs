//! Tools available to the agents
//!
//! - `tavily_search` ([`TavilySearchTool`]): web search for the researcher
//! - `python_repl` ([`PythonReplTool`]): code execution and charting for the chart generator

mod python_repl;
mod tavily;

pub use python_repl::{PythonReplTool, DEFAULT_CHART_PATH};
pub use tavily::{SearchDepth, TavilyError, TavilySearchTool, Topic};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::ToolError;

/// Tool schema handed to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Chart image written by a tool
///
/// The image stays on disk at `path`; the bytes travel with the step record
/// so consumers do not have to poll the filesystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartArtifact {
    pub path: PathBuf,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl ChartArtifact {
    /// Read the image at `path` into an artifact.
    pub async fn load(path: impl AsRef<Path>, tool_call_id: Option<String>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = tokio::fs::read(&path).await?;
        Ok(Self {
            path,
            size: bytes.len() as u64,
            created_at: Utc::now(),
            tool_call_id,
            bytes,
        })
    }
}

/// Result returned by a tool
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    /// Text handed back to the model as the tool message
    pub message: String,
    pub artifacts: Vec<ChartArtifact>,
}

impl ToolResult {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            artifacts: Vec::new(),
        }
    }

    pub fn with_artifact(mut self, artifact: ChartArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Call context passed to a tool
#[derive(Debug, Clone, Default)]
pub struct ToolRuntime {
    agent: String,
    tool_call_id: Option<String>,
}

impl ToolRuntime {
    pub fn new(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            tool_call_id: None,
        }
    }

    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    /// Name of the agent issuing the call
    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref()
    }
}

/// A tool the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(
        &self,
        args: serde_json::Value,
        runtime: &ToolRuntime,
    ) -> Result<ToolResult, ToolError>;
}

pub type DynTool = Arc<dyn Tool>;

/// Tools keyed by name, in name order
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, DynTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: DynTool) {
        let name = tool.definition().name;
        self.tools.insert(name, tool);
    }

    pub fn register_all(&mut self, tools: impl IntoIterator<Item = DynTool>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<&DynTool> {
        self.tools.get(name)
    }

    /// Tool schemas for the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
