use anyhow::{Context, Result, anyhow};
use axum::http::HeaderMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::data_models::{Answer, ChatMessage, SearchHit};
use crate::error::GatewayError;
use crate::providers::{
    GeoLocator, IpInfo, LanguageModel, OpenAi, SearchProvider, Tavily, TextStream,
};

/// Forwarding headers checked, in order, for the caller's address.
pub const CLIENT_IP_HEADERS: [&str; 2] = ["x-forwarded-for", "cf-connecting-ip"];

/// First parseable address from the forwarding headers. `x-forwarded-for`
/// may hold a proxy chain; the left-most entry is the original client.
pub fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    CLIENT_IP_HEADERS.iter().find_map(|name| {
        let value = headers.get(*name)?.to_str().ok()?;
        let first = value.split(',').next()?.trim();
        first.parse::<IpAddr>().ok()
    })
}

/// Runs the search-then-summarize pipeline and opens chat streams.
/// Holds no per-request state, so one instance is shared by every request.
pub struct AnswerGateway {
    llm: Arc<dyn LanguageModel>,
    search: Arc<dyn SearchProvider>,
    geo: Option<Arc<dyn GeoLocator>>,
    default_location: String,
    timeout: Duration,
}

impl AnswerGateway {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        geo: Option<Arc<dyn GeoLocator>>,
        default_location: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            llm,
            search,
            geo,
            default_location: default_location.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let geo = IpInfo::from_config(config)?.map(|g| Arc::new(g) as Arc<dyn GeoLocator>);
        if geo.is_none() {
            tracing::warn!("IPINFO_API_KEY not set, every search uses the default location");
        }
        Ok(Self::new(
            Arc::new(OpenAi::from_config(config)?),
            Arc::new(Tavily::from_config(config)?),
            geo,
            &config.default_location,
            config.upstream_timeout,
        ))
    }

    /// Best-effort lookup; every failure falls back to the default location.
    pub async fn resolve_location(&self, ip: Option<IpAddr>) -> String {
        let (Some(ip), Some(geo)) = (ip, &self.geo) else {
            return self.default_location.clone();
        };
        tracing::debug!(%ip, "resolving caller location");

        match tokio::time::timeout(self.timeout, geo.locate(&ip.to_string())).await {
            Ok(Ok(Some(location))) => location,
            Ok(Ok(None)) => {
                tracing::warn!("geolocation returned no city/country, using default location");
                self.default_location.clone()
            }
            Ok(Err(e)) => {
                tracing::warn!("geolocation failed, using default location: {:#}", e);
                self.default_location.clone()
            }
            Err(_) => {
                tracing::warn!("geolocation timed out, using default location");
                self.default_location.clone()
            }
        }
    }

    /// Structured answer for a single, already validated query.
    pub async fn answer(&self, query: &str, ip: Option<IpAddr>) -> Result<Answer, GatewayError> {
        let start = Instant::now();
        let location = self.resolve_location(ip).await;

        let answer = tokio::time::timeout(self.timeout, self.search_and_summarize(query, &location))
            .await
            .map_err(|_| anyhow!("upstream providers did not answer within {:?}", self.timeout))
            .and_then(|res| res)
            .map_err(|e| {
                tracing::error!("answering query failed: {:#}", e);
                GatewayError::upstream(e)
            })?;

        tracing::info!(
            %location,
            links = answer.links.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "answered query"
        );
        Ok(answer)
    }

    async fn search_and_summarize(&self, query: &str, location: &str) -> Result<Answer> {
        let hits: Vec<SearchHit> = self
            .search
            .search(query, location)
            .await
            .context("web search failed")?;
        tracing::debug!(hits = hits.len(), %location, "search results received");

        self.llm
            .summarize(query, &hits)
            .await
            .context("summarizing search results failed")
    }

    /// Opens a chat stream. Only setup is bounded by the timeout; once
    /// fragments flow, the stream lives as long as the provider keeps it open.
    pub async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream, GatewayError> {
        if messages.is_empty() {
            return Err(GatewayError::stream(anyhow!("no chat messages supplied")));
        }
        tokio::time::timeout(self.timeout, self.llm.stream_chat(messages))
            .await
            .map_err(|_| anyhow!("completion stream did not open within {:?}", self.timeout))
            .and_then(|res| res)
            .map_err(|e| {
                tracing::error!("opening completion stream failed: {:#}", e);
                GatewayError::stream(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.9"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers), Some("198.51.100.7".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_falls_back_to_cloudflare_header() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("2001:db8::1"));
        assert_eq!(client_ip(&headers), Some("2001:db8::1".parse().unwrap()));

        // unparseable forwarded-for entries are skipped, not trusted
        headers.insert("x-forwarded-for", HeaderValue::from_static("../../admin"));
        assert_eq!(client_ip(&headers), Some("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_absent() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
