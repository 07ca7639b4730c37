use crate::core::config::ConnectorConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    Classification, Envelope, HttpRequest, HttpResponse, HttpTransport, PooledTransport,
    RateClass, RetryClassifier, SlidingWindowLimiter, TransientRule, TransportConfig,
};
use crate::exchanges::zaif::signer::ZaifSigner;
use crate::exchanges::zaif::types::{
    ZaifActiveOrders, ZaifActiveOrdersBoth, ZaifCancelResult, ZaifCurrency, ZaifCurrencyPair,
    ZaifDepth, ZaifHistory, ZaifInfo2, ZaifLastPrice, ZaifResult, ZaifTicker, ZaifTrade,
    ZaifTradeResult,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const DEFAULT_REST_URL: &str = "https://api.zaif.jp";

/// Application errors that clear on their own
pub fn transient_rules() -> Vec<TransientRule> {
    vec![
        TransientRule::new("nonce not incremented", None),
        TransientRule::new("order is too new", Some(Duration::from_secs(1))),
    ]
}

/// Depth as parsed, plus the body it came from
#[derive(Debug, Clone)]
pub struct RawDepth {
    pub depth: ZaifDepth,
    pub body: String,
}

/// Filters for `trade_history`
#[derive(Debug, Clone, Default)]
pub struct TradeHistoryQuery {
    pub count: Option<u32>,
    pub currency_pair: Option<String>,
    pub is_token: bool,
    /// Unix seconds; defaults to now
    pub end: Option<i64>,
}

impl TradeHistoryQuery {
    pub fn new(count: u32, is_token: bool) -> Self {
        Self {
            count: (count > 0).then_some(count),
            is_token,
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let end = self.end.unwrap_or_else(|| chrono::Utc::now().timestamp());
        let mut params = vec![("end", end.to_string()), ("end_id", i64::MAX.to_string())];
        if let Some(count) = self.count {
            params.push(("count", count.to_string()));
        }
        if let Some(pair) = &self.currency_pair {
            params.push(("currency_pair", pair.clone()));
        }
        if self.is_token {
            params.push(("is_token", "true".to_string()));
        }
        params
    }
}

/// Zaif REST requester
///
/// Public calls go to `GET /api/1/{resource}/{param}`, private calls to
/// `POST /tapi`. Both classes pass the sliding-window limiter first. Each
/// request picks the next transport, one per configured bind address.
pub struct ZaifRest {
    transports: Vec<Arc<dyn HttpTransport>>,
    next_transport: AtomicUsize,
    limiter: Arc<SlidingWindowLimiter>,
    signer: Option<ZaifSigner>,
    classifier: RetryClassifier,
    base_url: String,
}

impl ZaifRest {
    pub fn new(config: &ConnectorConfig) -> Self {
        let transport_config = TransportConfig::new("zaif")
            .with_timeout(config.timeout())
            .with_retry(config.retry, config.retry_wait());

        let transports: Vec<Arc<dyn HttpTransport>> = if config.bind_addresses.is_empty() {
            vec![Arc::new(PooledTransport::new(transport_config))]
        } else {
            config
                .bind_addresses
                .iter()
                .map(|addr| {
                    Arc::new(PooledTransport::new(
                        transport_config.clone().with_bind_address(Some(*addr)),
                    )) as Arc<dyn HttpTransport>
                })
                .collect()
        };

        let signer = config
            .has_credentials()
            .then(|| ZaifSigner::new(config.credentials.clone()));

        Self::with_transports(
            transports,
            config.rest_url.as_deref().unwrap_or(DEFAULT_REST_URL),
            signer,
        )
    }

    pub fn with_transports(
        transports: Vec<Arc<dyn HttpTransport>>,
        base_url: &str,
        signer: Option<ZaifSigner>,
    ) -> Self {
        Self {
            transports,
            next_transport: AtomicUsize::new(0),
            limiter: Arc::new(SlidingWindowLimiter::default()),
            signer,
            classifier: RetryClassifier::new(transient_rules()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Share one limiter between several requesters
    pub fn with_limiter(mut self, limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport_count(&self) -> usize {
        self.transports.len()
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    fn transport(&self) -> Result<&Arc<dyn HttpTransport>, ExchangeError> {
        if self.transports.is_empty() {
            return Err(ExchangeError::ConfigurationError(
                "No HTTP transport configured".to_string(),
            ));
        }
        let index = self.next_transport.fetch_add(1, Ordering::Relaxed) % self.transports.len();
        Ok(&self.transports[index])
    }

    async fn public_request(
        &self,
        resource: &str,
        param: &str,
        no_retry: bool,
    ) -> Result<HttpResponse, ExchangeError> {
        self.limiter.admit(RateClass::Public).await;
        let url = if param.is_empty() {
            format!("{}/api/1/{}", self.base_url, resource)
        } else {
            format!("{}/api/1/{}/{}", self.base_url, resource, param)
        };
        let request = HttpRequest::get(url).with_header("Connection", "close");
        self.transport()?.execute(&request, no_retry).await
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        resource: &str,
        param: &str,
    ) -> Result<T, ExchangeError> {
        self.public_request(resource, param, false).await?.json()
    }

    /// Signed call to `/tapi`, resubmitted while the exchange reports a
    /// transient error
    #[instrument(skip(self, params))]
    async fn private_call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
        no_retry: bool,
    ) -> Result<T, ExchangeError> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            ExchangeError::AuthError(format!("{} requires API credentials", method))
        })?;

        loop {
            self.limiter.admit(RateClass::Trade).await;
            let (body, headers) = signer.signed_body(method, params)?;
            let request = HttpRequest::post(format!("{}/tapi", self.base_url))
                .with_headers(headers)
                .with_header("Content-Type", "application/x-www-form-urlencoded")
                .with_header("Connection", "keep-alive")
                .with_body(body);

            let response = self.transport()?.execute(&request, no_retry).await?;
            let envelope: Envelope = response.json()?;

            match self.classifier.classify(&envelope) {
                Classification::Success => {
                    let result: ZaifResult<T> = response.json()?;
                    return Ok(result.result);
                }
                Classification::Retryable { wait } => {
                    warn!(
                        method,
                        params = ?params,
                        error = %envelope.error,
                        "transient API error, resubmitting"
                    );
                    if let Some(wait) = wait {
                        tokio::time::sleep(wait).await;
                    }
                }
                Classification::Fatal(message) => {
                    debug!(method, error = %message, "API call rejected");
                    return Err(ExchangeError::ApiError {
                        method: method.to_string(),
                        message,
                    });
                }
            }
        }
    }

    // Public API

    pub async fn currencies(&self, currency: &str) -> Result<Vec<ZaifCurrency>, ExchangeError> {
        self.public_get("currencies", currency).await
    }

    pub async fn currency_pairs(
        &self,
        currency_pair: &str,
    ) -> Result<Vec<ZaifCurrencyPair>, ExchangeError> {
        self.public_get("currency_pairs", currency_pair).await
    }

    pub async fn last_price(&self, currency_pair: &str) -> Result<ZaifLastPrice, ExchangeError> {
        self.public_get("last_price", currency_pair).await
    }

    pub async fn ticker(&self, currency_pair: &str) -> Result<ZaifTicker, ExchangeError> {
        self.public_get("ticker", currency_pair).await
    }

    pub async fn trades(&self, currency_pair: &str) -> Result<Vec<ZaifTrade>, ExchangeError> {
        self.public_get("trades", currency_pair).await
    }

    pub async fn depth(&self, currency_pair: &str) -> Result<ZaifDepth, ExchangeError> {
        self.public_get("depth", currency_pair).await
    }

    /// Single attempt at the depth endpoint, keeping the raw body
    pub async fn depth_no_retry(&self, currency_pair: &str) -> Result<RawDepth, ExchangeError> {
        let response = self.public_request("depth", currency_pair, true).await?;
        Ok(RawDepth {
            depth: response.json()?,
            body: response.text(),
        })
    }

    // Private API

    pub async fn get_info2(&self) -> Result<ZaifInfo2, ExchangeError> {
        self.private_call("get_info2", &[], false).await
    }

    /// Place an order; `action` is `bid` or `ask`
    ///
    /// Sent without transport-level retry: a resubmission is the caller's
    /// decision.
    pub async fn trade(
        &self,
        currency_pair: &str,
        action: &str,
        price: Decimal,
        amount: Decimal,
    ) -> Result<ZaifTradeResult, ExchangeError> {
        let params = [
            ("currency_pair", currency_pair.to_string()),
            ("action", action.to_string()),
            ("price", price.normalize().to_string()),
            ("amount", amount.normalize().to_string()),
        ];
        self.private_call("trade", &params, true).await
    }

    pub async fn cancel_order(
        &self,
        order_id: i64,
        is_token: bool,
    ) -> Result<ZaifCancelResult, ExchangeError> {
        let mut params = vec![("order_id", order_id.to_string())];
        if is_token {
            params.push(("is_token", "true".to_string()));
        }
        self.private_call("cancel_order", &params, true).await
    }

    pub async fn active_orders(
        &self,
        currency_pair: Option<&str>,
        is_token: bool,
    ) -> Result<ZaifActiveOrders, ExchangeError> {
        let mut params = Vec::new();
        if let Some(pair) = currency_pair {
            params.push(("currency_pair", pair.to_string()));
        }
        if is_token {
            params.push(("is_token", "true".to_string()));
        }
        self.private_call("active_orders", &params, false).await
    }

    /// Open orders of both the normal and the token class in one call
    pub async fn active_orders_both(&self) -> Result<ZaifActiveOrdersBoth, ExchangeError> {
        self.private_call(
            "active_orders",
            &[("is_token_both", "true".to_string())],
            false,
        )
        .await
    }

    pub async fn trade_history(
        &self,
        query: &TradeHistoryQuery,
    ) -> Result<ZaifHistory, ExchangeError> {
        self.private_call("trade_history", &query.params(), false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned bodies and records what was sent
    struct CannedTransport {
        bodies: Mutex<Vec<&'static str>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl CannedTransport {
        fn new(bodies: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(bodies.into_iter().rev().collect()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for CannedTransport {
        async fn execute(
            &self,
            request: &HttpRequest,
            _no_retry: bool,
        ) -> Result<HttpResponse, ExchangeError> {
            self.seen.lock().unwrap().push(request.clone());
            let body = self.bodies.lock().unwrap().pop().unwrap_or("{}");
            Ok(HttpResponse {
                status: 200,
                body: body.as_bytes().to_vec(),
            })
        }
    }

    fn rest_with(transport: Arc<CannedTransport>) -> ZaifRest {
        ZaifRest::with_transports(
            vec![transport],
            "https://api.zaif.jp/",
            Some(ZaifSigner::new(vec![
                crate::core::config::Credential::new("k", "s"),
            ])),
        )
    }

    #[tokio::test]
    async fn test_transient_error_is_resubmitted_with_fresh_nonce() {
        let transport = CannedTransport::new(vec![
            r#"{"success":0,"error":"nonce not incremented"}"#,
            r#"{"success":1,"return":{"funds":{"jpy":1000}}}"#,
        ]);
        let rest = rest_with(transport.clone());
        let info = rest.get_info2().await.unwrap();
        assert_eq!(info.funds["jpy"], Decimal::new(1000, 0));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0].body, seen[1].body);
        assert_eq!(seen[0].url, "https://api.zaif.jp/tapi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_too_new_waits_before_resubmitting() {
        let transport = CannedTransport::new(vec![
            r#"{"success":0,"error":"order is too new"}"#,
            r#"{"success":1,"return":{"order_id":5}}"#,
        ]);
        let rest = rest_with(transport);
        let started = tokio::time::Instant::now();
        let result = rest
            .cancel_order(5, false)
            .await
            .unwrap();
        assert_eq!(result.order_id, 5);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_fatal_error_surfaces() {
        let transport = CannedTransport::new(vec![r#"{"success":0,"error":"insufficient funds"}"#]);
        let rest = rest_with(transport.clone());
        let err = rest
            .trade("btc_jpy", "bid", Decimal::new(105, 0), Decimal::new(1, 2))
            .await
            .unwrap_err();
        match err {
            ExchangeError::ApiError { method, message } => {
                assert_eq!(method, "trade");
                assert_eq!(message, "insufficient funds");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_public_path_and_headers() {
        let transport = CannedTransport::new(vec![r#"{"asks":[[101,1]],"bids":[]}"#]);
        let rest = rest_with(transport.clone());
        let raw = rest.depth_no_retry("btc_jpy").await.unwrap();
        assert_eq!(raw.depth.asks.len(), 1);
        assert!(raw.body.contains("asks"));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://api.zaif.jp/api/1/depth/btc_jpy");
        assert_eq!(seen[0].headers["Connection"], "close");
    }

    #[tokio::test]
    async fn test_private_call_without_credentials() {
        let rest = ZaifRest::with_transports(
            vec![CannedTransport::new(Vec::new())],
            DEFAULT_REST_URL,
            None,
        );
        assert!(matches!(
            rest.get_info2().await,
            Err(ExchangeError::AuthError(_))
        ));
    }

    #[test]
    fn test_transports_follow_bind_addresses() {
        let config = ConnectorConfig::read_only().with_bind_addresses(vec![
            "127.0.0.1".parse().unwrap(),
            "127.0.0.2".parse().unwrap(),
        ]);
        assert_eq!(ZaifRest::new(&config).transport_count(), 2);
        assert_eq!(ZaifRest::new(&ConnectorConfig::read_only()).transport_count(), 1);
    }

    #[test]
    fn test_history_params() {
        let query = TradeHistoryQuery {
            end: Some(1_500_000_000),
            ..TradeHistoryQuery::new(10, true)
        };
        let params = query.params();
        assert!(params.contains(&("count", "10".to_string())));
        assert!(params.contains(&("is_token", "true".to_string())));
        assert!(params.contains(&("end", "1500000000".to_string())));
        assert!(!TradeHistoryQuery::new(0, false)
            .params()
            .iter()
            .any(|(key, _)| *key == "count" || *key == "is_token"));
    }
}
