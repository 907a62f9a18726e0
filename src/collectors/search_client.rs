//! Client for the AI search API.
//!
//! Speaks the OpenAI-style chat completions format used by Perplexity: one
//! user message wrapping the query, answered with free text that carries
//! inline citations plus an optional list of source URLs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{Settings, API_KEY_ENV};
use crate::models::AttemptStatus;

/// Default prompt wrapped around every query (uses the {query} placeholder).
pub const DEFAULT_SEARCH_PROMPT: &str = "Find recent news and articles about: {query}. Provide citations with URLs, titles, and brief summaries. Focus on credible sources.";

/// Configuration for the search API request shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Chat completions endpoint.
    #[serde(default = "default_endpoint")]
    pub api_endpoint: String,
    /// Online model to query.
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Custom prompt (uses the {query} placeholder)
    #[serde(default)]
    pub prompt: Option<String>,
}

fn default_endpoint() -> String {
    "https://api.perplexity.ai/chat/completions".to_string()
}
fn default_model() -> String {
    "llama-3.1-sonar-small-128k-online".to_string()
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.9
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            prompt: None,
        }
    }
}

impl SearchConfig {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.api_endpoint = endpoint.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Get the prompt template, using custom or default.
    pub fn get_prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_SEARCH_PROMPT)
    }
}

/// Text answer plus any structured source list returned with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchAnswer {
    pub content: String,
    pub citations: Vec<String>,
}

/// Errors that can occur while calling the search API.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by the search API")]
    RateLimited,

    #[error("API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no API key configured (set {})", API_KEY_ENV)]
    MissingApiKey,
}

impl SearchError {
    /// Attempt status recorded for this failure.
    pub fn attempt_status(&self) -> AttemptStatus {
        match self {
            SearchError::RateLimited => AttemptStatus::RateLimited,
            _ => AttemptStatus::Error,
        }
    }

    /// Whether the failure happened after a request went out.
    pub fn reached_api(&self) -> bool {
        !matches!(self, SearchError::MissingApiKey)
    }
}

/// One-call search capability.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchAnswer, SearchError>;

    /// Fails when a call could not be sent at all, e.g. without credentials.
    fn ready(&self) -> Result<(), SearchError> {
        Ok(())
    }

    /// Cheap liveness check.
    async fn probe(&self) -> Result<(), SearchError> {
        self.search("test query").await.map(|_| ())
    }
}

/// Chat completions request format.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

/// Chat completions response format.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    citations: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// HTTP client for the search API.
#[derive(Debug, Clone)]
pub struct SearchClient {
    config: SearchConfig,
    api_key: Option<String>,
    timeout: Duration,
    client: Client,
}

impl SearchClient {
    /// Create a new client. `timeout` bounds each call end to end.
    pub fn new(
        config: SearchConfig,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("citewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Connection(e.to_string()))?;

        Ok(Self {
            config,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            timeout,
            client,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, SearchError> {
        Self::new(
            settings.search.clone(),
            settings.api_key.clone(),
            settings.request_timeout,
        )
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_prompt(&self, query: &str) -> String {
        self.config.get_prompt().replace("{query}", query)
    }

    /// Call the chat completions endpoint with a prompt.
    async fn call_chat(&self, prompt: String) -> Result<SearchAnswer, SearchError> {
        let api_key = self.api_key.as_deref().ok_or(SearchError::MissingApiKey)?;

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };

        let resp = self
            .client
            .post(&self.config.api_endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Search API returned 429");
            return Err(SearchError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = resp.json().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout(self.timeout)
            } else {
                SearchError::Parse(e.to_string())
            }
        })?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        if content.is_empty() {
            warn!("No content in search API response");
        }

        Ok(SearchAnswer {
            content,
            citations: chat.citations,
        })
    }

    fn transport_error(&self, e: reqwest::Error) -> SearchError {
        if e.is_timeout() {
            SearchError::Timeout(self.timeout)
        } else {
            SearchError::Connection(e.to_string())
        }
    }
}

#[async_trait]
impl SearchApi for SearchClient {
    fn ready(&self) -> Result<(), SearchError> {
        if self.has_api_key() {
            Ok(())
        } else {
            Err(SearchError::MissingApiKey)
        }
    }

    async fn search(&self, query: &str) -> Result<SearchAnswer, SearchError> {
        debug!("Searching: {}", query);
        let prompt = self.build_prompt(query);

        let answer = tokio::time::timeout(self.timeout, self.call_chat(prompt))
            .await
            .map_err(|_| SearchError::Timeout(self.timeout))??;

        info!(
            "Search answer received: {} chars, {} listed sources",
            answer.content.len(),
            answer.citations.len()
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve one canned HTTP response; resolves to the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });
        (format!("http://{}/chat/completions", addr), handle)
    }

    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .and_then(|v| v.trim().parse::<usize>().ok())
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    fn client(endpoint: &str, key: Option<&str>, timeout_ms: u64) -> SearchClient {
        SearchClient::new(
            SearchConfig::default().with_endpoint(endpoint),
            key.map(str::to_string),
            Duration::from_millis(timeout_ms),
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.max_tokens, 4000);
        assert!(config.model.contains("sonar"));
        assert!(config.get_prompt().contains("{query}"));
    }

    #[test]
    fn test_build_prompt() {
        let c = client("http://localhost:1", Some("k"), 1000);
        let prompt = c.build_prompt("solar power");
        assert!(prompt.starts_with("Find recent news and articles about: solar power."));
    }

    #[tokio::test]
    async fn test_search_success() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"See [1] https://a.com"}}],"citations":["https://a.com"]}"#;
        let (endpoint, server) = serve_once("200 OK", body).await;

        let answer = client(&endpoint, Some("secret"), 5_000)
            .search("wind energy")
            .await
            .unwrap();
        assert_eq!(answer.content, "See [1] https://a.com");
        assert_eq!(answer.citations, vec!["https://a.com"]);

        let request = server.await.unwrap();
        assert!(request.to_lowercase().contains("authorization: bearer secret"));
        assert!(request.contains("wind energy"));
        assert!(request.contains("\"top_p\""));
    }

    #[tokio::test]
    async fn test_empty_choices_is_empty_answer() {
        let (endpoint, _server) = serve_once("200 OK", r#"{"choices":[]}"#).await;
        let answer = client(&endpoint, Some("k"), 5_000).search("q").await.unwrap();
        assert!(answer.content.is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_status() {
        let (endpoint, _server) = serve_once("429 Too Many Requests", "{}").await;
        let err = client(&endpoint, Some("k"), 5_000).search("q").await.unwrap_err();
        assert!(matches!(err, SearchError::RateLimited));
        assert_eq!(err.attempt_status(), AttemptStatus::RateLimited);
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let (endpoint, _server) = serve_once("500 Internal Server Error", "boom").await;
        let err = client(&endpoint, Some("k"), 5_000).search("q").await.unwrap_err();
        match err {
            SearchError::Api { status, ref body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.attempt_status(), AttemptStatus::Error);
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let (endpoint, _server) = serve_once("200 OK", "not json").await;
        let err = client(&endpoint, Some("k"), 5_000).search("q").await.unwrap_err();
        assert!(matches!(err, SearchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let err = client("http://127.0.0.1:9/", None, 1_000)
            .search("q")
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::MissingApiKey));
        assert!(!client("http://x", Some("  "), 1_000).has_api_key());
    }

    #[test]
    fn test_ready_requires_api_key() {
        let without = client("http://x", None, 1_000);
        assert!(matches!(without.ready(), Err(SearchError::MissingApiKey)));
        assert!(!SearchError::MissingApiKey.reached_api());
        assert!(SearchError::RateLimited.reached_api());
        assert!(client("http://x", Some("key"), 1_000).ready().is_ok());
    }

    #[tokio::test]
    async fn test_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let err = client(&format!("http://{}/", addr), Some("k"), 200)
            .search("q")
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::Timeout(_)));
    }
}
