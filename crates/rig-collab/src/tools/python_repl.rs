//! Python code execution for the chart generator
//!
//! The code runs in a child interpreter under a small harness: matplotlib is
//! switched to the Agg backend, open figures are cleared before the run, and
//! any figure still open afterwards is saved to the chart path. The process
//! has a wall-clock timeout and is killed if the call is dropped; there is no
//! other sandboxing.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ChartArtifact, Tool, ToolDefinition, ToolResult, ToolRuntime};
use crate::error::ToolError;

pub const DEFAULT_CHART_PATH: &str = "chart.png";

const DEFAULT_INTERPRETER: &str = "python3";

const DEFAULT_TIMEOUT_SECS: u64 = 120;

const CHART_SAVED_MARKER: &str = "__RIG_COLLAB_CHART_SAVED__";

/// Harness run with `python -c`; argv[1] is the chart path, the user code
/// arrives on stdin.
const HARNESS: &str = r#"
import contextlib, io, sys, traceback
try:
    import matplotlib
    matplotlib.use("Agg")
    import matplotlib.pyplot as plt
    plt.close("all")
except ImportError:
    plt = None
code = sys.stdin.read()
out = io.StringIO()
try:
    with contextlib.redirect_stdout(out):
        exec(compile(code, "<python_repl>", "exec"), {"__name__": "__main__"})
except BaseException:
    sys.stdout.write(out.getvalue())
    sys.stderr.write(traceback.format_exc(limit=-1))
    sys.exit(1)
sys.stdout.write(out.getvalue())
if plt is not None and plt.get_fignums():
    plt.savefig(sys.argv[1], bbox_inches="tight", dpi=300)
    plt.close("all")
    sys.stdout.write("\n__RIG_COLLAB_CHART_SAVED__\n")
"#;

/// Python REPL tool
///
/// ```ignore
/// let tool = PythonReplTool::new()
///     .with_chart_path("uk_gdp_chart.png")
///     .with_timeout(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct PythonReplTool {
    interpreter: String,
    chart_path: PathBuf,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Default for PythonReplTool {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            chart_path: PathBuf::from(DEFAULT_CHART_PATH),
            working_dir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl PythonReplTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_chart_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chart_path = path.into();
        self
    }

    /// Run the interpreter in `dir`; a relative chart path resolves against it.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Where a chart ends up on disk.
    pub fn chart_path(&self) -> PathBuf {
        match &self.working_dir {
            Some(dir) if self.chart_path.is_relative() => dir.join(&self.chart_path),
            _ => self.chart_path.clone(),
        }
    }

    /// The harness gets the chart path as configured, since it runs inside
    /// the working directory.
    async fn run_code(&self, code: &str) -> Result<ExecOutput, String> {
        let mut command = Command::new(&self.interpreter);
        command
            .arg("-c")
            .arg(HARNESS)
            .arg(&self.chart_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| format!("could not start {}: {}", self.interpreter, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| format!("could not send code to interpreter: {}", e))?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("execution timed out after {}s", self.timeout.as_secs()))?
            .map_err(|e| e.to_string())?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let detail = stderr.trim();
            return Err(if detail.is_empty() {
                format!("interpreter exited with {}", output.status)
            } else {
                detail.to_string()
            });
        }

        let chart_saved = stdout.contains(CHART_SAVED_MARKER);
        let stdout = stdout.replace(CHART_SAVED_MARKER, "").trim_end().to_string();

        Ok(ExecOutput { stdout, chart_saved })
    }
}

struct ExecOutput {
    stdout: String,
    chart_saved: bool,
}

#[derive(Debug, Deserialize)]
struct PythonReplArgs {
    code: String,
}

#[async_trait]
impl Tool for PythonReplTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "python_repl".to_string(),
            description: "Use this to execute python code. If you want to see the output of a value, you should print it out with `print(...)`. This is visible to the user. Figures drawn with matplotlib are saved as a chart automatically.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The python code to execute to generate your chart."
                    }
                },
                "required": ["code"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        runtime: &ToolRuntime,
    ) -> Result<ToolResult, ToolError> {
        let args: PythonReplArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if args.code.trim().is_empty() {
            return Err(ToolError::InvalidArguments("code must not be empty".to_string()));
        }

        let chart_path = self.chart_path();
        debug!(
            agent = runtime.agent(),
            tool_call_id = runtime.tool_call_id(),
            bytes = args.code.len(),
            "Executing python_repl"
        );

        let output = match self.run_code(&args.code).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "python_repl failed");
                return Ok(ToolResult::new(format!("Failed to execute code. Error: {}", e)));
            }
        };

        if !output.chart_saved {
            return Ok(ToolResult::new(format!(
                "Successfully executed code:\nStdout: {}",
                output.stdout
            )));
        }

        let message = format!(
            "Successfully executed code and saved plot as '{}'.\nStdout: {}",
            chart_path.display(),
            output.stdout
        );
        match ChartArtifact::load(&chart_path, runtime.tool_call_id().map(String::from)).await {
            Ok(artifact) => {
                info!(path = %chart_path.display(), size = artifact.size, "Chart saved");
                Ok(ToolResult::new(message).with_artifact(artifact))
            }
            Err(e) => {
                warn!(path = %chart_path.display(), error = %e, "Chart was saved but could not be read back");
                Ok(ToolResult::new(message))
            }
        }
    }
}
