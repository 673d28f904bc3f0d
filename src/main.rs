//! # Chart Research Agent
//!
//! Two agents share one conversation: a researcher with web search and a
//! chart generator with a Python REPL. They take turns until one of them
//! answers with `FINAL ANSWER`.
//!
//! ## Quick Start
//! ```bash
//! export ANTHROPIC_API_KEY=... TAVILY_API_KEY=...
//! cargo run -- "Get the UK's GDP over the past 5 years, then make a line chart of it. Once you make the chart, finish."
//! ```
//!
//! Without a question the program starts an interactive session.

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// Environment and `.env` configuration
mod config;

/// Interactive / single-shot chat front-end
mod chat;

/// Message clean-up for display
mod render;

// =============================================================================
// IMPORTS
// =============================================================================
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rig::client::{CompletionClient, ProviderClient};
use rig_collab::{
    CollaborationBuilder, GraphExecutor, LLMConfig, LLMProvider, PythonReplTool, RigAgentAdapter,
    RunConfig, Session, TavilySearchTool,
};

use crate::chat::{ChatSession, OutputMode, WELCOME};
use crate::config::{Config, Provider};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "chart-research-agent",
    version,
    about = "A researcher and a chart generator that work together on your question",
    long_about = r#"
Chart Research Agent - research a topic and chart the numbers.

A researcher agent searches the web (Tavily) and a chart generator agent
writes and runs Python/matplotlib code. They alternate until one of them
has the final answer. Charts are written to CHART_PATH (default chart.png).

REQUIRED ENVIRONMENT:
  ANTHROPIC_API_KEY or OPENAI_API_KEY (see --provider)
  TAVILY_API_KEY
  python3 with matplotlib installed

EXAMPLES:
  # One question, then exit
  chart-research-agent "Get the UK's GDP over the past 5 years, then chart it. Finish."

  # Interactive session (/chart, /history, /quit)
  chart-research-agent

  # Machine-readable steps
  chart-research-agent --json "Chart Japan's population since 2000"
"#
)]
struct Args {
    /// Question to answer; starts an interactive session when omitted
    #[arg(value_name = "QUERY")]
    query: Option<String>,

    /// Model to use (overrides LLM_MODEL)
    #[arg(short = 'm', long = "model", env = "LLM_MODEL")]
    model: Option<String>,

    /// LLM provider (overrides LLM_PROVIDER)
    #[arg(short = 'p', long = "provider", value_enum)]
    provider: Option<Provider>,

    /// Maximum node visits per question (overrides RECURSION_LIMIT)
    #[arg(long = "recursion-limit", value_name = "N")]
    recursion_limit: Option<usize>,

    /// Print each step as a JSON line
    #[arg(long = "json", default_value = "false")]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose)?;

    info!("Chart research agent starting up...");

    let mut config = Config::from_env()?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    info!(
        provider = config.provider.as_str(),
        model = %config.model(),
        recursion_limit = config.recursion_limit,
        chart_path = %config.chart_path.display(),
        "Configuration loaded"
    );

    let executor = build_executor(&config)?;
    let mode = if args.json { OutputMode::Json } else { OutputMode::Pretty };
    let mut chat = ChatSession::new(
        executor,
        RunConfig::with_recursion_limit(config.recursion_limit),
        config.chart_path.clone(),
    )
    .with_mode(mode);

    match args.query {
        Some(query) => run_once(&mut chat, &query).await,
        None => run_repl(&mut chat).await,
    }
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(provider) = args.provider {
        info!(provider = provider.as_str(), "Using provider from command line");
        config.set_provider(provider);
    }
    if let Some(model) = &args.model {
        info!(model = %model, "Using model from command line");
        config.model = Some(model.clone());
    }
    if let Some(limit) = args.recursion_limit {
        config.recursion_limit = limit;
    }
}

// =============================================================================
// WIRING
// =============================================================================
/// Build the provider-backed LLM both agents share.
fn build_llm(config: &Config) -> Arc<dyn LLMProvider> {
    let model = config.model();
    match config.provider {
        Provider::Anthropic => {
            let agent = rig::providers::anthropic::Client::from_env()
                .agent(model)
                .temperature(config.temperature)
                .max_tokens(config.max_tokens)
                .build();
            Arc::new(RigAgentAdapter::with_names(agent, "anthropic", model))
        }
        Provider::OpenAI => {
            let agent = rig::providers::openai::Client::from_env()
                .agent(model)
                .temperature(config.temperature)
                .max_tokens(config.max_tokens)
                .build();
            Arc::new(RigAgentAdapter::with_names(agent, "openai", model))
        }
    }
}

fn build_executor(config: &Config) -> Result<GraphExecutor> {
    let tavily_key = config
        .tavily_api_key
        .clone()
        .context("TAVILY_API_KEY is not set")?;
    let search = TavilySearchTool::new(tavily_key).with_default_max_results(config.max_search_results);
    let repl = PythonReplTool::new()
        .with_interpreter(&config.python_bin)
        .with_chart_path(&config.chart_path)
        .with_timeout(config.code_timeout);

    let llm_config = LLMConfig::new(config.model())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

    let graph = CollaborationBuilder::new(build_llm(config))
        .with_research_tool(Arc::new(search))
        .with_chart_tool(Arc::new(repl))
        .with_config(llm_config)
        .with_max_iterations(config.max_agent_iterations)
        .build()
        .context("Failed to build the collaboration graph")?;

    Ok(GraphExecutor::new(graph, Session::new()))
}

// =============================================================================
// FRONT-ENDS
// =============================================================================
async fn run_once(chat: &mut ChatSession, query: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    let summary = chat.ask(query, &mut stdout).await?;

    match summary.error {
        Some(e) => anyhow::bail!("Run failed: {}", e),
        None => {
            info!(steps = summary.steps, "Question answered");
            Ok(())
        }
    }
}

async fn run_repl(chat: &mut ChatSession) -> Result<()> {
    let separator = "━".repeat(60);
    println!("{}", separator.cyan());
    println!("{} {}", "🤖 Assistant:".green().bold(), WELCOME);
    println!("{}", "   /chart  chart file status   /history  transcript   /quit  exit".dimmed());
    println!("{}", separator.cyan());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();

    loop {
        print!("{} ", ">".cyan().bold());
        stdout.flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/chart" => println!("{}", chat.chart_status()),
            "/history" => {
                for entry in chat.history_lines() {
                    println!("{}", entry);
                }
            }
            question => {
                if let Err(e) = chat.ask(question, &mut stdout).await {
                    error!(error = %e, "Failed to write output");
                    return Err(e.into());
                }
            }
        }
    }

    println!("{}", "Goodbye!".green());
    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Logs go to stderr; stdout carries the conversation (or JSON steps).
///
/// `RUST_LOG` wins when set, otherwise `--verbose` picks debug over info.
fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["test", "Chart UK GDP"]);
        assert_eq!(args.query.as_deref(), Some("Chart UK GDP"));
        assert!(args.provider.is_none());
        assert!(!args.json);
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_interactive() {
        let args = Args::parse_from(["test"]);
        assert!(args.query.is_none());
    }

    #[test]
    fn test_args_with_flags() {
        let args = Args::parse_from([
            "test",
            "--provider", "openai",
            "--model", "gpt-4o",
            "--recursion-limit", "20",
            "--json",
            "-v",
            "Test query",
        ]);

        assert_eq!(args.provider, Some(Provider::OpenAI));
        assert_eq!(args.model.as_deref(), Some("gpt-4o"));
        assert_eq!(args.recursion_limit, Some(20));
        assert!(args.json);
        assert!(args.verbose);
        assert_eq!(args.query.as_deref(), Some("Test query"));
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args = Args::parse_from(["test", "--model", "claude-3-5-haiku-latest", "--recursion-limit", "7"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);

        assert_eq!(config.model(), "claude-3-5-haiku-latest");
        assert_eq!(config.recursion_limit, 7);
    }
}
