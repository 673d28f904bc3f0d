//! Terminal chat front-end
//!
//! One [`ChatSession`] per terminal: it keeps the transcript across questions,
//! drives a run per question, and prints each step as it arrives.

use colored::Colorize;
use futures::StreamExt;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use rig_collab::{
    ChartArtifact, ConversationState, GraphExecutor, Message, RunConfig, StepRecord,
    CHART_GENERATOR, RESEARCHER,
};

use crate::render::{clean_content, format_message};

pub const WELCOME: &str = "Hello! I'm your research assistant. I can help you research topics \
and create visualizations. What would you like to know?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Cleaned, labelled messages
    Pretty,
    /// One JSON step record per line
    Json,
}

/// What one question produced
#[derive(Debug, Default)]
pub struct TurnSummary {
    pub steps: usize,
    pub final_answer: Option<String>,
    pub chart: Option<ChartArtifact>,
    pub error: Option<String>,
}

pub struct ChatSession {
    executor: GraphExecutor,
    transcript: ConversationState,
    run_config: RunConfig,
    chart_path: PathBuf,
    mode: OutputMode,
}

impl ChatSession {
    pub fn new(executor: GraphExecutor, run_config: RunConfig, chart_path: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            transcript: ConversationState::new(),
            run_config,
            chart_path: chart_path.into(),
            mode: OutputMode::Pretty,
        }
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn transcript(&self) -> &ConversationState {
        &self.transcript
    }

    /// Run the graph on `input` plus everything said so far.
    ///
    /// Run failures are reported on `out` and in the summary; only write
    /// errors are returned.
    pub async fn ask<W: Write>(&mut self, input: &str, out: &mut W) -> io::Result<TurnSummary> {
        info!(input_len = input.len(), "Processing user input");

        let question = Message::user(input);
        let mut history = self.transcript.messages().to_vec();
        history.push(question.clone());
        self.transcript.push(question);

        let mut stream = self.executor.execute_chat(history, self.run_config);
        let mut summary = TurnSummary::default();
        let mut seen = HashSet::new();

        while let Some(step) = stream.next().await {
            let step = match step {
                Ok(step) => step,
                Err(e) => {
                    error!(error = %e, "Run failed");
                    self.report_error(&e.to_string(), out)?;
                    summary.error = Some(e.to_string());
                    break;
                }
            };

            summary.steps += 1;
            self.transcript.merge(step.messages.iter().cloned());

            match self.mode {
                OutputMode::Json => {
                    let line = serde_json::to_string(&step).map_err(io::Error::other)?;
                    writeln!(out, "{}", line)?;
                }
                OutputMode::Pretty => {
                    for line in render_step(&step, &mut seen) {
                        writeln!(out, "{}", line)?;
                    }
                    if summary.chart.is_none() {
                        if let Some(chart) = step.artifacts.first() {
                            writeln!(
                                out,
                                "{} {} ({} bytes)",
                                "🖼  Chart saved:".green().bold(),
                                chart.path.display(),
                                chart.size
                            )?;
                        }
                    }
                }
            }

            if summary.chart.is_none() {
                summary.chart = step.artifacts.first().cloned();
            }
            if let Some(answer) = step.completion.answer() {
                summary.final_answer = Some(answer.to_string());
            }
        }

        info!(steps = summary.steps, finished = summary.final_answer.is_some(), "Turn complete");
        Ok(summary)
    }

    fn report_error<W: Write>(&self, message: &str, out: &mut W) -> io::Result<()> {
        match self.mode {
            OutputMode::Json => writeln!(out, "{}", serde_json::json!({ "error": message })),
            OutputMode::Pretty => writeln!(
                out,
                "{} Sorry, I encountered an error: {}",
                "🤖 Assistant:".red().bold(),
                message
            ),
        }
    }

    /// Whether the chart file exists, and how big it is.
    pub fn chart_status(&self) -> String {
        chart_status(&self.chart_path)
    }

    /// Transcript as `[author] text` lines
    pub fn history_lines(&self) -> Vec<String> {
        self.transcript
            .messages()
            .iter()
            .filter_map(|message| {
                let text = clean_content(&message.text());
                (!text.is_empty()).then(|| format!("[{}] {}", message.author(), text))
            })
            .collect()
    }
}

fn label(node: &str) -> String {
    match node {
        RESEARCHER => "🔍 Research:".blue().bold().to_string(),
        CHART_GENERATOR => "📊 Chart Generator:".yellow().bold().to_string(),
        other => format!("{}:", other).bold().to_string(),
    }
}

/// Display lines for a step: one per message not shown yet whose text
/// survives clean-up.
fn render_step(step: &StepRecord, seen: &mut HashSet<String>) -> Vec<String> {
    let label = label(&step.node);
    step.messages
        .iter()
        .filter(|message| seen.insert(message.id.clone()))
        .filter_map(|message| {
            let formatted = format_message(&message.text());
            (!formatted.is_empty()).then(|| format!("{} {}", label, formatted))
        })
        .collect()
}

pub fn chart_status(path: &Path) -> String {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => format!("✅ Plot file exists ({} bytes)", meta.len()),
        _ => "❌ Plot file not found".to_string(),
    }
}
