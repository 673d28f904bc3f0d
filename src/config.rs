//! # Configuration Module
//!
//! Loads settings from the environment (and a `.env` file, if present),
//! starting from sensible defaults. Command-line flags are applied on top in
//! `main.rs`, then [`Config::validate`] runs before anything talks to a model.
//!
//! | Variable | Purpose | Default |
//! |----------|---------|---------|
//! | `LLM_PROVIDER` | `anthropic` or `openai` | `anthropic` |
//! | `LLM_MODEL` | Model name | provider default |
//! | `LLM_TEMPERATURE` | Sampling temperature | `0.7` |
//! | `LLM_MAX_TOKENS` | Completion budget per model call | `4096` |
//! | `TAVILY_API_KEY` | Tavily search key | required |
//! | `MAX_SEARCH_RESULTS` | Results per search | `5` |
//! | `PYTHON_BIN` | Interpreter for the chart generator | `python3` |
//! | `CHART_PATH` | Where charts are written | `chart.png` |
//! | `CODE_TIMEOUT_SECS` | Per-execution Python timeout | `120` |
//! | `RECURSION_LIMIT` | Node visits per run | `150` |
//! | `MAX_AGENT_ITERATIONS` | Model calls per agent turn | `15` |

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use rig_collab::DEFAULT_RECURSION_LIMIT;

// =============================================================================
// LLM PROVIDER
// =============================================================================
/// Which Rig provider client backs both agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Anthropic,
    #[value(name = "openai")]
    OpenAI,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAI => "openai",
        }
    }

    /// Environment variable the Rig client reads its key from
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => "claude-3-5-sonnet-latest",
            Provider::OpenAI => "gpt-4.1",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAI),
            other => anyhow::bail!("LLM_PROVIDER must be 'anthropic' or 'openai', got: {}", other),
        }
    }
}

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,

    /// `None` means the provider's default model
    pub model: Option<String>,

    pub temperature: f64,

    pub max_tokens: u64,

    /// API key of the selected provider, if set in the environment
    pub provider_api_key: Option<String>,

    pub tavily_api_key: Option<String>,

    pub max_search_results: u32,

    pub python_bin: String,

    pub chart_path: PathBuf,

    pub code_timeout: Duration,

    pub recursion_limit: usize,

    pub max_agent_iterations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::Anthropic,
            model: None,
            temperature: 0.7,
            max_tokens: 4096,
            provider_api_key: None,
            tavily_api_key: None,
            max_search_results: 5,
            python_bin: "python3".to_string(),
            chart_path: PathBuf::from("chart.png"),
            code_timeout: Duration::from_secs(120),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_agent_iterations: 15,
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; set but malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("LLM_PROVIDER") {
            config.provider = Provider::parse(&val)?;
        }

        if let Ok(val) = env::var("LLM_MODEL") {
            if !val.trim().is_empty() {
                config.model = Some(val);
            }
        }

        if let Ok(val) = env::var("LLM_TEMPERATURE") {
            config.temperature = val
                .parse()
                .context("LLM_TEMPERATURE must be a valid floating-point number (e.g., 0.7)")?;
        }

        if let Ok(val) = env::var("LLM_MAX_TOKENS") {
            config.max_tokens = val
                .parse()
                .context("LLM_MAX_TOKENS must be a valid positive integer")?;
        }

        config.tavily_api_key = env::var("TAVILY_API_KEY").ok().filter(|key| !key.is_empty());

        if let Ok(val) = env::var("MAX_SEARCH_RESULTS") {
            config.max_search_results = val
                .parse()
                .context("MAX_SEARCH_RESULTS must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("PYTHON_BIN") {
            config.python_bin = val;
        }

        if let Ok(val) = env::var("CHART_PATH") {
            config.chart_path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("CODE_TIMEOUT_SECS") {
            let secs: u64 = val
                .parse()
                .context("CODE_TIMEOUT_SECS must be a whole number of seconds")?;
            config.code_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = env::var("RECURSION_LIMIT") {
            config.recursion_limit = val
                .parse()
                .context("RECURSION_LIMIT must be a valid positive integer")?;
        }

        if let Ok(val) = env::var("MAX_AGENT_ITERATIONS") {
            config.max_agent_iterations = val
                .parse()
                .context("MAX_AGENT_ITERATIONS must be a valid positive integer")?;
        }

        config.load_provider_key();
        Ok(config)
    }

    /// Switch provider and pick up that provider's key from the environment.
    pub fn set_provider(&mut self, provider: Provider) {
        self.provider = provider;
        self.load_provider_key();
    }

    fn load_provider_key(&mut self) {
        self.provider_api_key = env::var(self.provider.api_key_var())
            .ok()
            .filter(|key| !key.is_empty());
    }

    /// Model to request, falling back to the provider default
    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Fail fast with a clear message instead of a confusing one mid-run.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "LLM_TEMPERATURE must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.max_tokens == 0 {
            anyhow::bail!("LLM_MAX_TOKENS must be at least 1");
        }

        if self.model().trim().is_empty() {
            anyhow::bail!("LLM_MODEL cannot be empty");
        }

        if self.max_search_results == 0 {
            anyhow::bail!("MAX_SEARCH_RESULTS must be at least 1");
        }

        if self.recursion_limit == 0 {
            anyhow::bail!("RECURSION_LIMIT must be at least 1");
        }

        if self.max_agent_iterations == 0 {
            anyhow::bail!("MAX_AGENT_ITERATIONS must be at least 1");
        }

        if self.code_timeout.is_zero() {
            anyhow::bail!("CODE_TIMEOUT_SECS must be at least 1");
        }

        if self.provider_api_key.is_none() {
            anyhow::bail!(
                "{} is not set (required for LLM_PROVIDER={})",
                self.provider.api_key_var(),
                self.provider.as_str()
            );
        }

        if self.tavily_api_key.is_none() {
            anyhow::bail!("TAVILY_API_KEY is not set (required for web search)");
        }

        Ok(())
    }
}
