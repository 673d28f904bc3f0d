//! Tavily web search for the researcher
//!
//! Transient failures (timeouts, connection errors, 429, 5xx) are retried
//! with exponential backoff. Everything else fails the call immediately and
//! is reported back to the model as tool output.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{Tool, ToolDefinition, ToolResult, ToolRuntime};
use crate::error::ToolError;

pub const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Upper bound on a single backoff sleep
const MAX_RETRY_DELAY_SECS: u64 = 60;

const DEFAULT_MAX_RESULTS: u32 = 5;

const MAX_QUERY_LEN: usize = 400;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    #[default]
    General,
    News,
}

/// Tavily Search Tool
///
/// ```ignore
/// let tool = TavilySearchTool::new("tvly-...").with_default_max_results(5);
/// let result = tool.execute(json!({"query": "UK GDP 2019-2023"}), &runtime).await?;
/// ```
pub struct TavilySearchTool {
    api_key: String,
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    default_max_results: u32,
}

impl TavilySearchTool {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            default_max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Create from environment variable TAVILY_API_KEY
    pub fn from_env() -> Result<Self, ToolError> {
        let api_key = std::env::var("TAVILY_API_KEY").map_err(|_| {
            ToolError::Execution("TAVILY_API_KEY environment variable not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Point the tool at another endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Result count used when the model does not ask for one.
    pub fn with_default_max_results(mut self, max_results: u32) -> Self {
        self.default_max_results = max_results.clamp(1, 20);
        self
    }

    /// Backoff before retry `attempt` (1-based), doubling and capped.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.retry_base_delay
            .saturating_mul(factor)
            .min(Duration::from_secs(MAX_RETRY_DELAY_SECS))
    }

    async fn execute_with_retry(&self, request: &TavilyRequest) -> Result<TavilyResponse, TavilyError> {
        let mut last_error = TavilyError::Unknown("No attempts made".to_string());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_delay(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying Tavily request");
                tokio::time::sleep(delay).await;
            }

            match self.execute_single_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!(attempt, error = %e, "Tavily request failed, will retry");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn execute_single_request(&self, request: &TavilyRequest) -> Result<TavilyResponse, TavilyError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TavilyError::Timeout
                } else if e.is_connect() {
                    TavilyError::Connection(e.to_string())
                } else {
                    TavilyError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            return response
                .json::<TavilyResponse>()
                .await
                .map_err(|e| TavilyError::ParseError(e.to_string()));
        }

        let error_text = response.text().await.unwrap_or_default();

        match status.as_u16() {
            401 => Err(TavilyError::Unauthorized),
            429 => Err(TavilyError::RateLimited),
            400 => Err(TavilyError::BadRequest(error_text)),
            500..=599 => Err(TavilyError::ServerError(status.as_u16(), error_text)),
            _ => Err(TavilyError::HttpError(status.as_u16(), error_text)),
        }
    }
}

/// Typed errors for Tavily API
#[derive(Debug, thiserror::Error)]
pub enum TavilyError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - check API key")]
    Unauthorized,

    #[error("Rate limited - too many requests")]
    RateLimited,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    #[error("HTTP error ({0}): {1}")]
    HttpError(u16, String),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl TavilyError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TavilyError::Timeout
                | TavilyError::Connection(_)
                | TavilyError::RateLimited
                | TavilyError::ServerError(_, _)
        )
    }
}

impl From<TavilyError> for ToolError {
    fn from(e: TavilyError) -> Self {
        ToolError::Execution(format!("Tavily API error: {}", e))
    }
}

#[derive(Debug, Deserialize)]
struct TavilySearchArgs {
    query: String,

    max_results: Option<u32>,

    #[serde(default)]
    search_depth: SearchDepth,

    #[serde(default)]
    topic: Topic,

    #[serde(default)]
    include_answer: bool,
}

#[derive(Debug, Serialize)]
struct TavilyRequest {
    query: String,
    max_results: u32,
    search_depth: SearchDepth,
    topic: Topic,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: String,
    url: String,
    content: String,
    #[serde(default)]
    score: f64,
}

impl TavilyResult {
    fn to_markdown(&self) -> String {
        format!(
            "### [{}]({})\n**Relevance:** {:.0}%\n\n{}\n",
            self.title,
            self.url,
            self.score * 100.0,
            self.content
        )
    }
}

fn format_response(query: &str, response: TavilyResponse) -> String {
    let mut output = format!("## Search Results for: \"{}\"\n\n", query);

    if let Some(answer) = response.answer {
        output.push_str("### Summary\n");
        output.push_str(&answer);
        output.push_str("\n\n---\n\n");
    }

    if response.results.is_empty() {
        output.push_str("No results found.\n");
    } else {
        output.push_str(&format!("Found {} results:\n\n", response.results.len()));
        for result in &response.results {
            output.push_str(&result.to_markdown());
            output.push('\n');
        }
    }

    output
}

#[async_trait]
impl Tool for TavilySearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "tavily_search".to_string(),
            description: "Search the web using Tavily Search API. Returns relevant web pages with titles, URLs, and content snippets.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query to execute",
                        "maxLength": MAX_QUERY_LEN
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of results to return (max: 20)",
                        "default": self.default_max_results,
                        "minimum": 1,
                        "maximum": 20
                    },
                    "search_depth": {
                        "type": "string",
                        "enum": ["basic", "advanced"],
                        "default": "basic"
                    },
                    "topic": {
                        "type": "string",
                        "enum": ["general", "news"],
                        "default": "general"
                    },
                    "include_answer": {
                        "type": "boolean",
                        "description": "Include a generated answer summarizing the results",
                        "default": false
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        runtime: &ToolRuntime,
    ) -> Result<ToolResult, ToolError> {
        let args: TavilySearchArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("Query must not be empty".to_string()));
        }
        if args.query.chars().count() > MAX_QUERY_LEN {
            return Err(ToolError::InvalidArguments(format!(
                "Query too long (max {} characters)",
                MAX_QUERY_LEN
            )));
        }

        let request = TavilyRequest {
            query: args.query.clone(),
            max_results: args
                .max_results
                .unwrap_or(self.default_max_results)
                .clamp(1, 20),
            search_depth: args.search_depth,
            topic: args.topic,
            include_answer: args.include_answer,
        };

        debug!(
            agent = runtime.agent(),
            tool_call_id = runtime.tool_call_id(),
            query = %request.query,
            max_results = request.max_results,
            "Executing tavily_search"
        );

        let response = self.execute_with_retry(&request).await?;

        Ok(ToolResult::new(format_response(&args.query, response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_success_response() -> serde_json::Value {
        serde_json::json!({
            "answer": "UK GDP was about $3.1 trillion in 2022.",
            "results": [
                {
                    "title": "United Kingdom GDP",
                    "url": "https://example.org/uk-gdp",
                    "content": "2019: 2.85T, 2020: 2.70T, 2021: 3.12T",
                    "score": 0.91
                }
            ]
        })
    }

    fn tool_for(server: &MockServer) -> TavilySearchTool {
        TavilySearchTool::new("test-key")
            .with_base_url(server.uri())
            .with_retry_base_delay(Duration::from_millis(1))
    }

    fn runtime() -> ToolRuntime {
        ToolRuntime::new("researcher").with_tool_call_id("call_1")
    }

    #[test]
    fn test_tavily_tool_definition() {
        let tool = TavilySearchTool::new("test-key").with_default_max_results(5);
        let def = tool.definition();

        assert_eq!(def.name, "tavily_search");
        let params = &def.parameters;
        assert_eq!(params["required"], serde_json::json!(["query"]));
        assert_eq!(params["properties"]["max_results"]["default"], 5);
        assert_eq!(params["properties"]["query"]["maxLength"], 400);
        assert_eq!(params["additionalProperties"], serde_json::json!(false));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(TavilyError::Timeout.is_retryable());
        assert!(TavilyError::RateLimited.is_retryable());
        assert!(TavilyError::ServerError(503, String::new()).is_retryable());
        assert!(!TavilyError::Unauthorized.is_retryable());
        assert!(!TavilyError::BadRequest(String::new()).is_retryable());
    }

    #[test]
    fn test_retry_delay_doubles_and_saturates() {
        let tool = TavilySearchTool::new("test-key")
            .with_max_retries(100)
            .with_retry_base_delay(Duration::from_millis(100));

        assert_eq!(tool.retry_delay(1), Duration::from_millis(100));
        assert_eq!(tool.retry_delay(2), Duration::from_millis(200));
        assert_eq!(tool.retry_delay(4), Duration::from_millis(800));
        assert_eq!(tool.retry_delay(40), Duration::from_secs(MAX_RETRY_DELAY_SECS));
        assert_eq!(tool.retry_delay(100), Duration::from_secs(MAX_RETRY_DELAY_SECS));
    }

    #[tokio::test]
    async fn test_search_formats_markdown_with_default_max_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "query": "UK GDP past 5 years",
                "max_results": 5,
                "search_depth": "basic"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_success_response()))
            .expect(1)
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .execute(serde_json::json!({"query": "UK GDP past 5 years"}), &runtime())
            .await
            .unwrap();

        assert!(result.message.contains("## Search Results for: \"UK GDP past 5 years\""));
        assert!(result.message.contains("### Summary"));
        assert!(result.message.contains("[United Kingdom GDP](https://example.org/uk-gdp)"));
        assert!(result.message.contains("**Relevance:** 91%"));
        assert!(result.artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_max_results_is_clamped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"max_results": 20})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "answer": null,
                "results": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .execute(serde_json::json!({"query": "gdp", "max_results": 99}), &runtime())
            .await
            .unwrap();

        assert!(result.message.contains("No results found."));
    }

    #[tokio::test]
    async fn test_retry_on_server_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample_success_response()))
            .mount(&server)
            .await;

        let result = tool_for(&server)
            .execute(serde_json::json!({"query": "gdp"}), &runtime())
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_no_retry_on_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = tool_for(&server)
            .execute(serde_json::json!({"query": "gdp"}), &runtime())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Unauthorized"));
    }

    #[tokio::test]
    async fn test_retries_exhausted_on_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .expect(3)
            .mount(&server)
            .await;

        let err = tool_for(&server)
            .with_max_retries(2)
            .execute(serde_json::json!({"query": "gdp"}), &runtime())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Rate limited"));
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not valid json"))
            .mount(&server)
            .await;

        let err = tool_for(&server)
            .execute(serde_json::json!({"query": "gdp"}), &runtime())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to parse response"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_rejected_before_request() {
        let tool = TavilySearchTool::new("test-key").with_base_url("http://127.0.0.1:9");

        let missing = tool.execute(serde_json::json!({}), &runtime()).await;
        assert!(matches!(missing, Err(ToolError::InvalidArguments(_))));

        let long_query = "x".repeat(401);
        let too_long = tool
            .execute(serde_json::json!({"query": long_query}), &runtime())
            .await;
        assert!(matches!(too_long, Err(ToolError::InvalidArguments(_))));
    }
}
