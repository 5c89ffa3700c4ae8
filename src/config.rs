use anyhow::{Context, Result, bail};
use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_LOCATION: &str = "South Africa";
pub const DEFAULT_SUMMARY_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub static CONFIG: Lazy<Result<Config>> = Lazy::new(|| {
    dotenv().ok(); // Load .env file if present
    Config::from_env()
});

#[derive(Clone)]
pub struct Config {
    pub bind_addr: String,
    pub static_dir: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub summary_model: String,
    pub chat_model: String,
    pub tavily_api_key: String,
    pub tavily_base_url: String,
    /// Geolocation is skipped entirely when no key is configured.
    pub ipinfo_api_key: Option<String>,
    pub ipinfo_base_url: String,
    pub default_location: String,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let upstream_timeout = parse_timeout(&get_env_or_default(
            "UPSTREAM_TIMEOUT_SECS",
            &DEFAULT_TIMEOUT_SECS.to_string(),
        ))?;

        Ok(Config {
            bind_addr: get_env_or_default("BIND_ADDR", DEFAULT_BIND_ADDR),
            static_dir: get_env_or_default("STATIC_DIR", "static"),
            openai_api_key: get_env("OPENAI_API_KEY")?,
            openai_base_url: get_env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            summary_model: get_env_or_default("SUMMARY_MODEL", DEFAULT_SUMMARY_MODEL),
            chat_model: get_env_or_default("CHAT_MODEL", DEFAULT_CHAT_MODEL),
            tavily_api_key: get_env("TAVILY_API_KEY")?,
            tavily_base_url: get_env_or_default("TAVILY_BASE_URL", "https://api.tavily.com"),
            ipinfo_api_key: env::var("IPINFO_API_KEY").ok().filter(|k| !k.is_empty()),
            ipinfo_base_url: get_env_or_default("IPINFO_BASE_URL", "https://ipinfo.io"),
            default_location: get_env_or_default("DEFAULT_LOCATION", DEFAULT_LOCATION),
            upstream_timeout,
        })
    }
}

// API keys never appear in debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("static_dir", &self.static_dir)
            .field("openai_base_url", &self.openai_base_url)
            .field("summary_model", &self.summary_model)
            .field("chat_model", &self.chat_model)
            .field("tavily_base_url", &self.tavily_base_url)
            .field("geolocation_enabled", &self.ipinfo_api_key.is_some())
            .field("ipinfo_base_url", &self.ipinfo_base_url)
            .field("default_location", &self.default_location)
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .context("UPSTREAM_TIMEOUT_SECS must be a whole number of seconds")?;
    if secs == 0 {
        bail!("UPSTREAM_TIMEOUT_SECS must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

fn get_env(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("Missing required environment variable: {key}"))
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[test]
fn test_debug_output_hides_keys() {
    let config = Config {
        bind_addr: DEFAULT_BIND_ADDR.to_string(),
        static_dir: "static".to_string(),
        openai_api_key: "sk-very-secret".to_string(),
        openai_base_url: "https://api.openai.com/v1".to_string(),
        summary_model: DEFAULT_SUMMARY_MODEL.to_string(),
        chat_model: DEFAULT_CHAT_MODEL.to_string(),
        tavily_api_key: "tvly-very-secret".to_string(),
        tavily_base_url: "https://api.tavily.com".to_string(),
        ipinfo_api_key: Some("ipinfo-very-secret".to_string()),
        ipinfo_base_url: "https://ipinfo.io".to_string(),
        default_location: DEFAULT_LOCATION.to_string(),
        upstream_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
    };

    let printed = format!("{:?}", config);
    assert!(!printed.contains("very-secret"));
    assert!(printed.contains("geolocation_enabled: true"));
}

#[test]
fn test_parse_timeout() {
    assert_eq!(parse_timeout("30").unwrap(), Duration::from_secs(30));
    assert_eq!(parse_timeout(" 5 ").unwrap(), Duration::from_secs(5));
    assert!(parse_timeout("0").is_err());
    assert!(parse_timeout("-1").is_err());
    assert!(parse_timeout("1.5").is_err());
}
