// Client configuration, sourced from MOZIO_* environment variables

use crate::api_client::ClientError;
use crate::polling::SearchPollMode;
use serde::Deserialize;

pub const ENV_PREFIX: &str = "MOZIO";
pub const ENV_BASE_URL: &str = "MOZIO_API_BASE_URL";
pub const ENV_API_KEY: &str = "MOZIO_API_KEY";
pub const ENV_TIMEOUT_MS: &str = "MOZIO_API_TIMEOUT_MS";
pub const ENV_POLL_MAX_ATTEMPTS: &str = "MOZIO_POLL_MAX_ATTEMPTS";
pub const ENV_POLL_DELAY_MS: &str = "MOZIO_POLL_DELAY_MS";
pub const ENV_SEARCH_POLL_MODE: &str = "MOZIO_SEARCH_POLL_MODE";

// Raw environment layer. Keys are the variable names without the prefix, lowercased.
#[derive(Debug, Deserialize)]
struct EnvSettings {
    api_base_url: Option<String>,
    api_key: Option<String>,
    api_timeout_ms: Option<u64>,
    poll_max_attempts: Option<u32>,
    poll_delay_ms: Option<u64>,
    search_poll_mode: Option<SearchPollMode>,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub poll: PollConfig,
}

// Fixed-interval polling settings shared by search and reservation polling
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub search_mode: SearchPollMode,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            delay_ms: 2000,
            search_mode: SearchPollMode::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            api_key: api_key.to_string(),
            timeout_ms: 10_000,
            user_agent: format!("transfer-booking-flow/{}", env!("CARGO_PKG_VERSION")),
            poll: PollConfig::default(),
        }
    }

    pub fn from_env() -> Result<Self, ClientError> {
        Self::load(None)
    }

    // `source` replaces the process environment, so tests never touch global state
    pub fn load(source: Option<::config::Map<String, String>>) -> Result<Self, ClientError> {
        let settings: EnvSettings = ::config::Config::builder()
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).source(source))
            .build()
            .and_then(|layered| layered.try_deserialize())
            .map_err(|e| ClientError::ConfigError(e.to_string()))?;

        let base_url = required(settings.api_base_url, ENV_BASE_URL)?;
        let api_key = required(settings.api_key, ENV_API_KEY)?;
        let mut config = Self::new(&base_url, &api_key);

        if let Some(timeout_ms) = settings.api_timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(max_attempts) = settings.poll_max_attempts {
            config.poll.max_attempts = max_attempts;
        }
        if let Some(delay_ms) = settings.poll_delay_ms {
            config.poll.delay_ms = delay_ms;
        }
        if let Some(search_mode) = settings.search_poll_mode {
            config.poll.search_mode = search_mode;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::ConfigError(format!(
                "base url must be http(s), got `{}`",
                self.base_url
            )));
        }
        if self.api_key.trim().is_empty() {
            return Err(ClientError::ConfigError("api key is empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "request timeout must be positive".to_string(),
            ));
        }
        if self.poll.max_attempts == 0 {
            return Err(ClientError::ConfigError(
                "poll attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// Endpoint paths are joined onto the base url, so it always ends with a single slash
fn normalize_base_url(raw: &str) -> String {
    format!("{}/", raw.trim().trim_end_matches('/'))
}

fn required(value: Option<String>, name: &str) -> Result<String, ClientError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ClientError::ConfigError(format!("{} environment variable is not set", name)))
}
