use crate::core::cache::MarketCache;
use crate::core::config::ConnectorConfig;
use crate::core::cursor::{BoardCursor, TradeCursor};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{MessageCallback, StreamSession, WsCodec, WsConfig};
use crate::core::traits::StreamingCallback;
use crate::exchanges::zaif::codec::{ZaifCodec, ZaifFeed, ZaifMessage};
use crate::exchanges::zaif::conversions;
use crate::exchanges::zaif::rest::ZaifRest;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

pub const DEFAULT_STREAM_URL: &str = "wss://ws.zaif.jp/stream";

/// Where stream sessions connect and how they behave
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub stream_url: String,
    /// Depth proxy to read boards from instead of the exchange
    pub proxy_addr: Option<String>,
    pub subscribe_on_connect: bool,
    pub ws: WsConfig,
}

impl StreamSettings {
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            stream_url: config
                .stream_url
                .clone()
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            proxy_addr: config.proxy_addr.clone(),
            subscribe_on_connect: config.subscribe_on_connect,
            ws: WsConfig::default()
                .with_retry(config.retry)
                .with_redial_wait(config.retry_wait())
                .with_buffers(config.read_buffer_size, config.write_buffer_size),
        }
    }

    pub fn stream_url_for(&self, currency_pair: &str) -> String {
        match &self.proxy_addr {
            Some(addr) => format!("ws://{}/{}", addr, currency_pair),
            None => format!("{}?currency_pair={}", self.stream_url, currency_pair),
        }
    }

    fn codec(&self) -> ZaifCodec {
        let feed = if self.proxy_addr.is_some() {
            ZaifFeed::Proxy
        } else {
            ZaifFeed::Exchange
        };
        ZaifCodec::new(feed).with_subscribe_on_connect(self.subscribe_on_connect)
    }
}

/// Zaif market data implementation
pub struct MarketData {
    rest: Arc<ZaifRest>,
    cache: Arc<MarketCache>,
    settings: StreamSettings,
    sessions: Mutex<HashMap<String, Arc<StreamSession>>>,
}

impl MarketData {
    pub fn new(rest: &Arc<ZaifRest>, settings: StreamSettings) -> Self {
        Self {
            rest: rest.clone(),
            cache: Arc::new(MarketCache::new()),
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<MarketCache> {
        &self.cache
    }

    pub fn last_price(&self, currency_pair: &str) -> Option<Decimal> {
        self.cache.last_price(currency_pair)
    }

    pub fn buy_board_cursor(&self, currency_pair: &str) -> BoardCursor {
        self.cache.buy_board_cursor(currency_pair)
    }

    pub fn sell_board_cursor(&self, currency_pair: &str) -> BoardCursor {
        self.cache.sell_board_cursor(currency_pair)
    }

    pub fn trades_cursor(&self, currency_pair: &str) -> TradeCursor {
        self.cache.trades_cursor(currency_pair)
    }

    /// Poll depth once and store the board
    pub async fn refresh_depth(&self, currency_pair: &str) -> Result<(), ExchangeError> {
        let depth = self.rest.depth(currency_pair).await?;
        self.cache
            .update_depth(currency_pair, depth.bids, depth.asks);
        Ok(())
    }

    /// Start one stream session per pair
    ///
    /// Fails on the first pair that is already streaming or can not connect;
    /// sessions started before that keep running. A session is registered
    /// before it dials, so `stop_streamings` also cancels starts in progress.
    #[instrument(skip(self, pairs, callback))]
    pub async fn start_streamings(
        &self,
        pairs: &[String],
        callback: StreamingCallback,
    ) -> Result<(), ExchangeError> {
        for pair in pairs {
            let pair = pair.to_lowercase();
            let codec = self.settings.codec();
            let initial_payload = codec.encode_subscription(&[pair.as_str()])?;
            let url = self.settings.stream_url_for(&pair);

            let session = {
                let mut sessions = self.sessions.lock().await;
                if sessions.contains_key(&pair) {
                    return Err(ExchangeError::InvalidParameters(format!(
                        "Already streaming {}",
                        pair
                    )));
                }
                let session = Arc::new(StreamSession::new(
                    url.clone(),
                    format!("zaif:{}", pair),
                    self.settings.ws.clone(),
                ));
                sessions.insert(pair.clone(), session.clone());
                session
            };

            info!(currency_pair = %pair, %url, "starting stream");
            let on_message = stream_handler(pair.clone(), codec, self.cache.clone(), callback.clone());
            if let Err(e) = session.start(on_message, initial_payload).await {
                let mut sessions = self.sessions.lock().await;
                if sessions
                    .get(&pair)
                    .is_some_and(|current| Arc::ptr_eq(current, &session))
                {
                    sessions.remove(&pair);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop every session, including ones still waiting for their first connection
    pub async fn stop_streamings(&self) -> Result<(), ExchangeError> {
        let sessions: Vec<(String, Arc<StreamSession>)> =
            self.sessions.lock().await.drain().collect();
        for (pair, session) in sessions {
            session.stop().await;
            info!(currency_pair = %pair, "stream stopped");
        }
        Ok(())
    }

    pub async fn streaming_pairs(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }
}

/// Decode a frame into the cache, then tell the user which pair changed
fn stream_handler(
    currency_pair: String,
    codec: ZaifCodec,
    cache: Arc<MarketCache>,
    callback: StreamingCallback,
) -> MessageCallback {
    Arc::new(move |text: &str| {
        match codec.decode_text(text)? {
            Some(ZaifMessage::Frame(frame)) => {
                if !frame.currency_pair.is_empty() && frame.currency_pair != currency_pair {
                    warn!(
                        expected = %currency_pair,
                        received = %frame.currency_pair,
                        "frame for another pair"
                    );
                }
                cache.update(&currency_pair, conversions::convert_zaif_stream_frame(frame));
            }
            Some(ZaifMessage::Depth(depth)) => {
                cache.update_depth(&currency_pair, depth.bids, depth.asks);
            }
            None => return Ok(()),
        }
        callback(&currency_pair)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_stream_urls() {
        let direct = StreamSettings::from_config(&ConnectorConfig::read_only());
        assert_eq!(
            direct.stream_url_for("btc_jpy"),
            "wss://ws.zaif.jp/stream?currency_pair=btc_jpy"
        );

        let proxied =
            StreamSettings::from_config(&ConnectorConfig::read_only().with_proxy_addr("127.0.0.1:8080"));
        assert_eq!(proxied.stream_url_for("btc_jpy"), "ws://127.0.0.1:8080/btc_jpy");
        assert_eq!(proxied.codec().feed(), ZaifFeed::Proxy);
    }

    #[test]
    fn test_handler_updates_cache_before_callback() {
        let cache = Arc::new(MarketCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_cache = cache.clone();
        let seen_calls = calls.clone();
        let callback: StreamingCallback = Arc::new(move |pair: &str| {
            assert_eq!(pair, "btc_jpy");
            assert_eq!(seen_cache.buy_board_cursor(pair).len(), 1);
            seen_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let handler = stream_handler(
            "btc_jpy".to_string(),
            ZaifCodec::new(ZaifFeed::Exchange),
            cache.clone(),
            callback,
        );
        handler(
            r#"{"asks":[[101,1],[102,1]],"bids":[[100,1]],"currency_pair":"btc_jpy",
                "last_price":{"action":"ask","price":100.5},"trades":[]}"#,
        )
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.sell_board_cursor("btc_jpy").len(), 2);
        assert_eq!(cache.last_price("btc_jpy"), Some(Decimal::new(1005, 1)));
    }

    #[test]
    fn test_handler_keeps_last_price_on_proxy_depth() {
        let cache = Arc::new(MarketCache::new());
        cache.update(
            "btc_jpy",
            crate::core::cache::PairSnapshot {
                last_price: Decimal::new(100, 0),
                ..Default::default()
            },
        );
        let handler = stream_handler(
            "btc_jpy".to_string(),
            ZaifCodec::new(ZaifFeed::Proxy),
            cache.clone(),
            Arc::new(|_: &str| Ok(())),
        );
        handler(r#"{"asks":[],"bids":[[99,2]]}"#).unwrap();
        assert_eq!(cache.last_price("btc_jpy"), Some(Decimal::new(100, 0)));
        assert_eq!(cache.buy_board_cursor("btc_jpy").len(), 1);
    }

    #[test]
    fn test_handler_applies_frame_with_bad_trade_id() {
        let cache = Arc::new(MarketCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen_calls = calls.clone();
        let handler = stream_handler(
            "btc_jpy".to_string(),
            ZaifCodec::new(ZaifFeed::Exchange),
            cache.clone(),
            Arc::new(move |_: &str| {
                seen_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );
        handler(
            r#"{"asks":[[101,1]],"bids":[[100,1],[99,1]],"currency_pair":"btc_jpy",
                "last_price":{"action":"bid","price":100.5},
                "trades":[{"tid":"x7","price":100.5,"amount":0.1,"trade_type":"bid","date":1},
                          {"tid":8,"price":100,"amount":0.2,"trade_type":"ask","date":2}]}"#,
        )
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.buy_board_cursor("btc_jpy").len(), 2);
        assert_eq!(cache.last_price("btc_jpy"), Some(Decimal::new(1005, 1)));
        let tids: Vec<i64> = cache.trades_cursor("btc_jpy").map(|trade| trade.tid).collect();
        assert_eq!(tids.len(), 2);
        assert!(tids.contains(&0) && tids.contains(&8));
    }

    #[tokio::test]
    async fn test_stop_cancels_start_still_dialing() {
        let config = ConnectorConfig::read_only()
            .with_stream_url("ws://127.0.0.1:1/stream")
            .with_retry(0, 10);
        let rest = Arc::new(ZaifRest::new(&config));
        let market = Arc::new(MarketData::new(&rest, StreamSettings::from_config(&config)));

        let starting = tokio::spawn({
            let market = market.clone();
            async move {
                market
                    .start_streamings(&["btc_jpy".to_string()], Arc::new(|_: &str| Ok(())))
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(market.streaming_pairs().await, ["btc_jpy"]);

        tokio::time::timeout(Duration::from_secs(3), market.stop_streamings())
            .await
            .unwrap()
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(3), starting)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
        assert!(market.streaming_pairs().await.is_empty());
    }

    #[test]
    fn test_handler_reports_decode_errors() {
        let handler = stream_handler(
            "btc_jpy".to_string(),
            ZaifCodec::default(),
            Arc::new(MarketCache::new()),
            Arc::new(|_: &str| Ok(())),
        );
        assert!(handler("{oops").is_err());
    }
}
