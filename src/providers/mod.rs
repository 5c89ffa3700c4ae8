//! Clients for the hosted services the gateway talks to.
//!
//! Each service sits behind a small async trait so the gateway can be driven
//! by test doubles; the concrete types here speak the real HTTP APIs.

use anyhow::{Result, bail};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

use crate::data_models::{Answer, ChatMessage, SearchHit};

pub mod ipinfo;
pub mod openai;
pub mod tavily;

pub use ipinfo::IpInfo;
pub use openai::OpenAi;
pub use tavily::Tavily;

/// Stream of text fragments in the order the model produced them.
pub type TextStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Opens a streamed completion. Errors returned here happen before any
    /// fragment is produced.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TextStream>;

    /// Summarizes search hits into a validated [`Answer`].
    async fn summarize(&self, query: &str, hits: &[SearchHit]) -> Result<Answer>;
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Returns `"<city>, <country>"`, or `None` when the lookup is incomplete.
    async fn locate(&self, ip: &str) -> Result<Option<String>>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(timeout)
        .user_agent(concat!("intellisearch/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Turns a non-2xx response into an error carrying a short piece of the body.
pub(crate) async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!(
        "{provider} returned HTTP {status}: {}",
        truncate(&body, 300)
    )
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("abcdef", 3), "abc...");
    // counts chars, not bytes
    assert_eq!(truncate("héllo wörld", 5), "héllo...");
}

#[test]
fn test_endpoint_joins_slashes() {
    assert_eq!(
        endpoint("https://api.openai.com/v1/", "/chat/completions"),
        "https://api.openai.com/v1/chat/completions"
    );
    assert_eq!(endpoint("http://127.0.0.1:9000", "search"), "http://127.0.0.1:9000/search");
}
