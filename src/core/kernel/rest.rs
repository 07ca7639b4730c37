use crate::core::errors::ExchangeError;
use crate::core::kernel::dns::{DnsCache, DEFAULT_DNS_TTL};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{instrument, trace, warn};

/// A single HTTP request, built fresh for every attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Overrides the transport timeout for this request only
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: Vec::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Status and raw body of a successful (2xx) response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body into a typed response
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ExchangeError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ExchangeError::DeserializationError(format!(
                "Failed to parse JSON response: {} (body = {})",
                e,
                self.text()
            ))
        })
    }
}

/// HTTP execution with bounded low-level retry
///
/// Any transport failure or non-2xx status is an error. Unless `no_retry` is
/// set, the request is attempted up to the configured retry count with a fixed
/// wait in between; the final error is returned to the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        request: &HttpRequest,
        no_retry: bool,
    ) -> Result<HttpResponse, ExchangeError>;
}

/// Configuration for the pooled transport
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Name used in logs and spans
    pub name: String,
    pub timeout: Duration,
    /// Total attempts per request; 0 behaves like 1
    pub retry: u32,
    pub retry_wait: Duration,
    /// Local source address for outgoing connections
    pub bind_address: Option<IpAddr>,
    pub user_agent: String,
    pub dns_ttl: Duration,
}

impl TransportConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: Duration::from_secs(30),
            retry: 3,
            retry_wait: Duration::from_millis(500),
            bind_address: None,
            user_agent: "coinact/0.1".to_string(),
            dns_ttl: DEFAULT_DNS_TTL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: u32, retry_wait: Duration) -> Self {
        self.retry = retry;
        self.retry_wait = retry_wait;
        self
    }

    pub fn with_bind_address(mut self, bind_address: Option<IpAddr>) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_dns_ttl(mut self, dns_ttl: Duration) -> Self {
        self.dns_ttl = dns_ttl;
        self
    }
}

struct PooledClient {
    client: Client,
    // Held only while the request is issued, never while the body is read
    request_lock: tokio::sync::Mutex<()>,
}

/// Connection-reusing transport keeping one client per `(scheme, host)`.
///
/// Clients are created lazily and kept for the life of the transport.
pub struct PooledTransport {
    config: TransportConfig,
    dns: DnsCache,
    clients: Mutex<HashMap<(String, String), Arc<PooledClient>>>,
}

impl std::fmt::Debug for PooledTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PooledTransport {
    pub fn new(config: TransportConfig) -> Self {
        let dns = DnsCache::new(config.dns_ttl);
        Self {
            config,
            dns,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Number of distinct `(scheme, host)` clients created so far
    pub fn client_count(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn client_for(&self, url: &str) -> Result<Arc<PooledClient>, ExchangeError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ExchangeError::InvalidParameters(format!("Invalid URL {}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ExchangeError::InvalidParameters(format!("URL has no host: {}", url)))?;
        let key = (parsed.scheme().to_string(), host.to_string());

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = clients.get(&key) {
            return Ok(existing.clone());
        }

        let client = Client::builder()
            .timeout(self.config.timeout)
            .user_agent(&self.config.user_agent)
            .local_address(self.config.bind_address)
            .dns_resolver(Arc::new(self.dns.clone()))
            .build()
            .map_err(|e| {
                ExchangeError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;
        trace!(scheme = %key.0, host = %key.1, "created pooled client");

        let pooled = Arc::new(PooledClient {
            client,
            request_lock: tokio::sync::Mutex::new(()),
        });
        clients.insert(key, pooled.clone());
        Ok(pooled)
    }

    async fn execute_once(&self, request: &HttpRequest) -> Result<HttpResponse, ExchangeError> {
        let pooled = self.client_for(&request.url)?;

        let mut builder = pooled
            .client
            .request(request.method.clone(), &request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = {
            let _guard = pooled.request_lock.lock().await;
            builder.send().await?
        };

        let status = response.status();
        let body = response.bytes().await?;
        trace!(status = status.as_u16(), len = body.len(), "response received");

        if !status.is_success() {
            return Err(ExchangeError::UnexpectedStatus {
                status: status.as_u16(),
                url: request.url.clone(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(HttpResponse {
            status: status.as_u16(),
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl HttpTransport for PooledTransport {
    #[instrument(skip(self, request), fields(transport = %self.config.name, method = %request.method, url = %request.url))]
    async fn execute(
        &self,
        request: &HttpRequest,
        no_retry: bool,
    ) -> Result<HttpResponse, ExchangeError> {
        let attempts = if no_retry { 1 } else { self.config.retry.max(1) };
        let strategy = FixedInterval::new(self.config.retry_wait).take(attempts as usize - 1);

        let mut attempt = 0u32;
        let result = Retry::start(strategy, || {
            attempt += 1;
            let current = attempt;
            async move {
                let result = self.execute_once(request).await;
                if let Err(e) = &result {
                    warn!(
                        url = %request.url,
                        attempt = current,
                        attempts,
                        error = %e,
                        "HTTP request failed"
                    );
                }
                result
            }
        })
        .await;

        match result {
            Err(e) if attempts > 1 => Err(ExchangeError::RetryExhausted {
                url: request.url.clone(),
                attempts,
                source: Box::new(e),
            }),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::post("https://api.zaif.jp/tapi")
            .with_header("Key", "abc")
            .with_header("Key", "def")
            .with_body("method=get_info2")
            .with_timeout(Duration::from_secs(5));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.headers["Key"], "def");
        assert_eq!(request.body, b"method=get_info2");
        assert_eq!(request.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_clients_are_keyed_by_scheme_and_host() {
        let transport = PooledTransport::new(TransportConfig::new("test"));
        transport.client_for("https://api.zaif.jp/api/1/depth/btc_jpy").unwrap();
        transport.client_for("https://api.zaif.jp/tapi").unwrap();
        assert_eq!(transport.client_count(), 1);
        transport.client_for("http://api.zaif.jp/tapi").unwrap();
        transport.client_for("https://ws.zaif.jp/stream").unwrap();
        assert_eq!(transport.client_count(), 3);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let transport = PooledTransport::new(TransportConfig::new("test"));
        assert!(matches!(
            transport.client_for("not a url"),
            Err(ExchangeError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_response_json_reports_decode_errors() {
        let response = HttpResponse {
            status: 200,
            body: b"<html>".to_vec(),
        };
        let decoded: Result<serde_json::Value, _> = response.json();
        assert!(matches!(decoded, Err(ExchangeError::DeserializationError(_))));
    }
}
