use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::data_models::SearchHit;

use super::{SearchProvider, endpoint, ensure_success, http_client};

const PROVIDER: &str = "Tavily";
pub const SEARCH_DEPTH: &str = "advanced";

/// Tavily web search client.
pub struct Tavily {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl Tavily {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.tavily_api_key,
            &config.tavily_base_url,
            config.upstream_timeout,
        )
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    location: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    #[serde(default, alias = "snippet")]
    content: String,
}

impl From<SearchResult> for SearchHit {
    fn from(result: SearchResult) -> Self {
        SearchHit {
            title: result.title,
            url: result.url,
            snippet: result.content,
        }
    }
}

#[async_trait]
impl SearchProvider for Tavily {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<SearchHit>> {
        let body = SearchRequest {
            query,
            search_depth: SEARCH_DEPTH,
            location,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "search"))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("sending search request")?;
        let response = ensure_success(PROVIDER, response).await?;
        let response: SearchResponse = response
            .json()
            .await
            .context("decoding search response")?;

        tracing::debug!(results = response.results.len(), "search finished");
        Ok(response.results.into_iter().map(SearchHit::from).collect())
    }
}

#[test]
fn test_search_result_accepts_content_or_snippet() {
    let response: SearchResponse = serde_json::from_str(
        r#"{
            "query": "rust",
            "results": [
                {"title": "Rust", "url": "https://www.rust-lang.org", "content": "A language", "score": 0.9},
                {"title": "Book", "url": "https://doc.rust-lang.org/book", "snippet": "The book"},
                {"title": "Bare", "url": "https://example.com"}
            ]
        }"#,
    )
    .unwrap();

    let hits: Vec<SearchHit> = response.results.into_iter().map(SearchHit::from).collect();
    assert_eq!(hits[0].snippet, "A language");
    assert_eq!(hits[1].snippet, "The book");
    assert_eq!(hits[2].snippet, "");
}
