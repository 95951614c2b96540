//! Client configuration: base URL, token storage key and request policy.

use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const ENV_API_URL: &str = "WORKSHOP_API_URL";
pub const ENV_TOKEN_KEY: &str = "WORKSHOP_TOKEN_KEY";
pub const ENV_LOGIN_ROUTE: &str = "WORKSHOP_LOGIN_ROUTE";
pub const ENV_TIMEOUT_SECS: &str = "WORKSHOP_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "WORKSHOP_MAX_RETRIES";
pub const ENV_RESOLVE_REFS: &str = "WORKSHOP_RESOLVE_REFS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid base url {url}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("base url {0} must use http or https")]
    UnsupportedScheme(String),
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// What to do with `$ref` back-references in response envelopes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferencePolicy {
    /// Leave references in place (renamed to `ref`) and log a warning
    #[default]
    PassThrough,
    /// Substitute each reference with a copy of its `$id` target
    Resolve,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub token_key: String,
    pub login_route: String,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_min_delay: Duration,
    pub reference_policy: ReferencePolicy,
}

impl ClientConfig {
    pub const DEFAULT_TOKEN_KEY: &'static str = "token";
    pub const DEFAULT_LOGIN_ROUTE: &'static str = "/login";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_RETRIES: usize = 2;
    pub const DEFAULT_RETRY_MIN_DELAY: Duration = Duration::from_millis(500);

    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: parse_base_url(base_url)?,
            token_key: Self::DEFAULT_TOKEN_KEY.to_string(),
            login_route: Self::DEFAULT_LOGIN_ROUTE.to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_min_delay: Self::DEFAULT_RETRY_MIN_DELAY,
            reference_policy: ReferencePolicy::default(),
        })
    }

    /// Load configuration from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_base(None)
    }

    /// Like [`ClientConfig::from_env`], but an explicit base URL takes the
    /// place of `WORKSHOP_API_URL`. Every other setting still comes from the
    /// environment.
    pub fn from_env_with_base(base_url: Option<&str>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(base_url, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        base_url: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match base_url {
            Some(url) => Self::new(url)?,
            None => Self::new(&lookup(ENV_API_URL).ok_or(ConfigError::Missing(ENV_API_URL))?)?,
        };

        if let Some(key) = lookup(ENV_TOKEN_KEY).filter(|k| !k.trim().is_empty()) {
            config.token_key = key;
        }
        if let Some(route) = lookup(ENV_LOGIN_ROUTE).filter(|r| !r.trim().is_empty()) {
            config.login_route = route;
        }
        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = parse_value(ENV_TIMEOUT_SECS, &secs)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    name: ENV_TIMEOUT_SECS,
                    value: secs.to_string(),
                });
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = parse_value(ENV_MAX_RETRIES, &retries)?;
        }
        if let Some(flag) = lookup(ENV_RESOLVE_REFS) {
            config.reference_policy = if parse_flag(ENV_RESOLVE_REFS, &flag)? {
                ReferencePolicy::Resolve
            } else {
                ReferencePolicy::PassThrough
            };
        }

        Ok(config)
    }

    pub fn with_token_key(mut self, key: impl Into<String>) -> Self {
        self.token_key = key.into();
        self
    }

    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_min_delay(mut self, delay: Duration) -> Self {
        self.retry_min_delay = delay;
        self
    }

    pub fn with_reference_policy(mut self, policy: ReferencePolicy) -> Self {
        self.reference_policy = policy;
        self
    }

    /// Resolve an API path (e.g. `api/Orders/3` or `/api/Orders/3`) under the base URL
    pub fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        source,
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::UnsupportedScheme(raw.to_string()));
    }

    // Without the trailing slash `join` would replace the last path segment
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn parse_value<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: raw.to_string(),
    })
}

fn parse_flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
        }),
    }
}
