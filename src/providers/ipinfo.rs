use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;

use super::{GeoLocator, endpoint, ensure_success, http_client};

const PROVIDER: &str = "ipinfo";

/// IP geolocation through ipinfo.io.
pub struct IpInfo {
    client: reqwest::Client,
    token: String,
    base_url: String,
    timeout: Duration,
}

impl IpInfo {
    pub fn new(
        token: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            token: token.into(),
            base_url: base_url.into(),
            timeout,
        })
    }

    /// `None` when no token is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        config
            .ipinfo_api_key
            .as_ref()
            .map(|token| Self::new(token, &config.ipinfo_base_url, config.upstream_timeout))
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
struct IpDetails {
    city: Option<String>,
    country: Option<String>,
}

impl IpDetails {
    fn location(self) -> Option<String> {
        let city = self.city.filter(|c| !c.trim().is_empty())?;
        let country = self.country.filter(|c| !c.trim().is_empty())?;
        Some(format!("{}, {}", city.trim(), country.trim()))
    }
}

#[async_trait]
impl GeoLocator for IpInfo {
    async fn locate(&self, ip: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(endpoint(&self.base_url, &format!("{ip}/json")))
            .query(&[("token", self.token.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .context("sending geolocation request")?;
        let response = ensure_success(PROVIDER, response).await?;
        let details: IpDetails = response
            .json()
            .await
            .context("decoding geolocation response")?;
        Ok(details.location())
    }
}

#[test]
fn test_location_needs_city_and_country() {
    let full: IpDetails =
        serde_json::from_str(r#"{"ip":"8.8.8.8","city":"Cape Town","country":"ZA"}"#).unwrap();
    assert_eq!(full.location(), Some("Cape Town, ZA".to_string()));

    let no_city: IpDetails = serde_json::from_str(r#"{"ip":"10.0.0.1","country":"ZA"}"#).unwrap();
    assert_eq!(no_city.location(), None);

    let blank: IpDetails =
        serde_json::from_str(r#"{"ip":"10.0.0.1","city":"","country":"ZA"}"#).unwrap();
    assert_eq!(blank.location(), None);

    let bogon: IpDetails = serde_json::from_str(r#"{"ip":"127.0.0.1","bogon":true}"#).unwrap();
    assert_eq!(bogon.location(), None);
}
