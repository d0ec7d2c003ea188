use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_PUBLISH_ATTEMPTS: u32 = 3;
pub const DEFAULT_PUBLISH_BACKOFF_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub auth_token: Option<String>,
    pub poll_interval_ms: u64,
    pub discovery_timeout_secs: Option<u64>,
    pub publish_attempts: u32,
    pub publish_backoff_ms: u64,
    pub clear_address_on_end: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            api_key: String::new(),
            auth_token: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            discovery_timeout_secs: None,
            publish_attempts: DEFAULT_PUBLISH_ATTEMPTS,
            publish_backoff_ms: DEFAULT_PUBLISH_BACKOFF_MS,
            clear_address_on_end: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| {
                    warn!("API_BASE_URL not set, using empty value");
                    String::new()
                }),
            api_key: env::var("API_KEY")
                .unwrap_or_else(|_| {
                    warn!("API_KEY not set, using empty value");
                    String::new()
                }),
            auth_token: env::var("API_AUTH_TOKEN").ok(),
            poll_interval_ms: parse_var("CALL_POLL_INTERVAL_MS")
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            discovery_timeout_secs: parse_var("CALL_DISCOVERY_TIMEOUT_SECS"),
            publish_attempts: parse_var("CALL_PUBLISH_ATTEMPTS")
                .unwrap_or(DEFAULT_PUBLISH_ATTEMPTS),
            publish_backoff_ms: parse_var("CALL_PUBLISH_BACKOFF_MS")
                .unwrap_or(DEFAULT_PUBLISH_BACKOFF_MS),
            clear_address_on_end: parse_var("CALL_CLEAR_ADDRESS_ON_END")
                .unwrap_or(true),
        };

        if !config.is_configured() {
            warn!("Appointment store not configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.api_base_url.is_empty() && !self.api_key.is_empty()
    }
}

/// Reads an optional variable, warning when it is present but unparsable.
fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("{} has invalid value '{}', using default", name, raw);
            None
        }
    }
}
