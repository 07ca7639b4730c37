use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RETRY: u32 = 3;
pub const DEFAULT_RETRY_WAIT_MS: u64 = 500;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BUFFER_SIZE: usize = 2 * 1024 * 1024;
pub const DEFAULT_POLLING_CONCURRENCY: usize = 4;

/// One API key/secret pair. The secret never leaves the process in clear text.
#[derive(Debug, Clone)]
pub struct Credential {
    pub key: String,
    pub secret: Secret<String>,
}

impl Credential {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: Secret::new(secret.into()),
        }
    }

    /// Get the secret (use carefully - exposes secret)
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

// Never expose keys or secrets in serialized output
impl Serialize for Credential {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Credential", 2)?;
        state.serialize_field("key", "[REDACTED]")?;
        state.serialize_field("secret", "[REDACTED]")?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Credential {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CredentialHelper {
            key: String,
            secret: String,
        }

        let helper = CredentialHelper::deserialize(deserializer)?;
        Ok(Self::new(helper.key, helper.secret))
    }
}

/// Settings for one exchange connector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub credentials: Vec<Credential>,
    /// Total transport attempts per request (0 behaves like 1)
    pub retry: u32,
    pub retry_wait_ms: u64,
    pub timeout_secs: u64,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    pub currency_pairs: Vec<String>,
    /// Local source addresses; one transport is built per address
    pub bind_addresses: Vec<IpAddr>,
    pub rest_url: Option<String>,
    pub stream_url: Option<String>,
    /// Stream depth from a companion proxy instead of the exchange
    pub proxy_addr: Option<String>,
    pub subscribe_on_connect: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            credentials: Vec::new(),
            retry: DEFAULT_RETRY,
            retry_wait_ms: DEFAULT_RETRY_WAIT_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            currency_pairs: Vec::new(),
            bind_addresses: Vec::new(),
            rest_url: None,
            stream_url: None,
            proxy_addr: None,
            subscribe_on_connect: false,
        }
    }
}

impl ConnectorConfig {
    /// Create a configuration with a single credential
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            credentials: vec![Credential::new(key, secret)],
            ..Self::default()
        }
    }

    /// Configuration for public market data only
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn with_credential(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.credentials.push(Credential::new(key, secret));
        self
    }

    pub fn with_currency_pairs<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.currency_pairs = pairs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_retry(mut self, retry: u32, retry_wait_ms: u64) -> Self {
        self.retry = retry;
        self.retry_wait_ms = retry_wait_ms;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = Some(url.into());
        self
    }

    pub fn with_proxy_addr(mut self, addr: impl Into<String>) -> Self {
        self.proxy_addr = Some(addr.into());
        self
    }

    pub fn with_bind_addresses(mut self, addresses: Vec<IpAddr>) -> Self {
        self.bind_addresses = addresses;
        self
    }

    /// Check if this configuration can sign private requests
    pub fn has_credentials(&self) -> bool {
        self.credentials
            .iter()
            .any(|c| !c.key.is_empty() && !c.secret().is_empty())
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - `{PREFIX}_API_KEYS` / `{PREFIX}_SECRET_KEYS`: comma separated, paired by position
    /// - `{PREFIX}_RETRY`, `{PREFIX}_RETRY_WAIT_MS`, `{PREFIX}_TIMEOUT_SECS`
    /// - `{PREFIX}_READ_BUFFER_SIZE`, `{PREFIX}_WRITE_BUFFER_SIZE`
    /// - `{PREFIX}_CURRENCY_PAIRS`, `{PREFIX}_BIND_ADDRESSES`: comma separated
    /// - `{PREFIX}_REST_URL`, `{PREFIX}_STREAM_URL`, `{PREFIX}_PROXY_ADDR`
    /// - `{PREFIX}_SUBSCRIBE_ON_CONNECT`
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let vars = EnvVars::new(prefix);
        let defaults = Self::default();

        let keys = vars.list("API_KEYS");
        let secrets = vars.list("SECRET_KEYS");
        if keys.len() != secrets.len() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "{} has {} keys but {} has {} secrets",
                vars.name("API_KEYS"),
                keys.len(),
                vars.name("SECRET_KEYS"),
                secrets.len()
            )));
        }
        let credentials = keys
            .into_iter()
            .zip(secrets)
            .map(|(k, s)| Credential::new(k, s))
            .collect();

        Ok(Self {
            credentials,
            retry: vars.parse_or("RETRY", defaults.retry)?,
            retry_wait_ms: vars.parse_or("RETRY_WAIT_MS", defaults.retry_wait_ms)?,
            timeout_secs: vars.parse_or("TIMEOUT_SECS", defaults.timeout_secs)?,
            read_buffer_size: vars.parse_or("READ_BUFFER_SIZE", defaults.read_buffer_size)?,
            write_buffer_size: vars.parse_or("WRITE_BUFFER_SIZE", defaults.write_buffer_size)?,
            currency_pairs: vars.list("CURRENCY_PAIRS"),
            bind_addresses: vars.parse_list("BIND_ADDRESSES")?,
            rest_url: vars.get("REST_URL"),
            stream_url: vars.get("STREAM_URL"),
            proxy_addr: vars.get("PROXY_ADDR"),
            subscribe_on_connect: vars.parse_or("SUBSCRIBE_ON_CONNECT", false)?,
        })
    }

    /// Create configuration from a .env file and environment variables
    ///
    /// A missing .env file is not an error; system variables are used instead.
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        load_env_file(".env")?;
        Self::from_env(prefix)
    }
}

/// Settings for the depth polling proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub retry: u32,
    pub retry_wait_ms: u64,
    pub timeout_secs: u64,
    pub bind_addresses: Vec<IpAddr>,
    /// Pause between two polling rounds over all pairs
    pub polling_wait_ms: u64,
    /// Back-off for one pair after the exchange answered 403
    pub pause_wait_ms: u64,
    pub polling_concurrency: usize,
    pub currency_pairs: Vec<String>,
    pub listen_addr: String,
    pub rest_url: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            retry: 1,
            retry_wait_ms: DEFAULT_RETRY_WAIT_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            bind_addresses: Vec::new(),
            polling_wait_ms: 0,
            pause_wait_ms: 60_000,
            polling_concurrency: DEFAULT_POLLING_CONCURRENCY,
            currency_pairs: Vec::new(),
            listen_addr: "127.0.0.1:8080".to_string(),
            rest_url: None,
        }
    }
}

impl ProxyConfig {
    pub fn polling_wait(&self) -> Duration {
        Duration::from_millis(self.polling_wait_ms)
    }

    pub fn pause_wait(&self) -> Duration {
        Duration::from_millis(self.pause_wait_ms)
    }

    /// The connector settings used by the proxy's own requester
    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            retry: self.retry,
            retry_wait_ms: self.retry_wait_ms,
            timeout_secs: self.timeout_secs,
            bind_addresses: self.bind_addresses.clone(),
            currency_pairs: self.currency_pairs.clone(),
            rest_url: self.rest_url.clone(),
            ..ConnectorConfig::default()
        }
    }

    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let vars = EnvVars::new(prefix);
        let defaults = Self::default();
        let polling_concurrency = match vars.parse_or("POLLING_CONCURRENCY", 0usize)? {
            0 => DEFAULT_POLLING_CONCURRENCY,
            n => n,
        };

        Ok(Self {
            retry: vars.parse_or("RETRY", defaults.retry)?,
            retry_wait_ms: vars.parse_or("RETRY_WAIT_MS", defaults.retry_wait_ms)?,
            timeout_secs: vars.parse_or("TIMEOUT_SECS", defaults.timeout_secs)?,
            bind_addresses: vars.parse_list("BIND_ADDRESSES")?,
            polling_wait_ms: vars.parse_or("POLLING_WAIT_MS", defaults.polling_wait_ms)?,
            pause_wait_ms: vars.parse_or("PAUSE_WAIT_MS", defaults.pause_wait_ms)?,
            polling_concurrency,
            currency_pairs: vars.list("CURRENCY_PAIRS"),
            listen_addr: vars.get("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            rest_url: vars.get("REST_URL"),
        })
    }

    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        load_env_file(".env")?;
        Self::from_env(prefix)
    }
}

/// Per-exchange sections; an absent section means the exchange is not used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangesConfig {
    pub zaif: Option<ConnectorConfig>,
}

#[cfg(feature = "env-file")]
fn load_env_file(path: &str) -> Result<(), ConfigError> {
    match dotenv::from_path(path) {
        Ok(()) => Ok(()),
        Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConfigError::InvalidConfiguration(format!(
            "Failed to load .env file '{}': {}",
            path, e
        ))),
    }
}

struct EnvVars {
    prefix: String,
}

impl EnvVars {
    fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_uppercase(),
        }
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    fn get(&self, suffix: &str) -> Option<String> {
        env::var(self.name(suffix))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn list(&self, suffix: &str) -> Vec<String> {
        self.get(suffix)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn parse_or<T: FromStr>(&self, suffix: &str, default: T) -> Result<T, ConfigError> {
        match self.get(suffix) {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidConfiguration(format!(
                    "{} has an invalid value: {}",
                    self.name(suffix),
                    raw
                ))
            }),
            None => Ok(default),
        }
    }

    fn parse_list<T: FromStr>(&self, suffix: &str) -> Result<Vec<T>, ConfigError> {
        self.list(suffix)
            .into_iter()
            .map(|raw| {
                raw.parse().map_err(|_| {
                    ConfigError::InvalidConfiguration(format!(
                        "{} has an invalid entry: {}",
                        self.name(suffix),
                        raw
                    ))
                })
            })
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
