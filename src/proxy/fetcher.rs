use crate::core::config::ProxyConfig;
use crate::exchanges::zaif::rest::ZaifRest;
use crate::exchanges::zaif::types::ZaifDepth;
use crate::proxy::DepthHub;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Polls depth for every configured pair and publishes changed boards
pub struct DepthFetcher {
    rest: Arc<ZaifRest>,
    hub: DepthHub,
    currency_pairs: Vec<String>,
    concurrency: usize,
    polling_wait: Duration,
    pause_wait: Duration,
    last_depths: Mutex<HashMap<String, ZaifDepth>>,
    paused_until: Mutex<HashMap<String, Instant>>,
    stop_tx: watch::Sender<bool>,
}

impl DepthFetcher {
    pub fn new(rest: Arc<ZaifRest>, hub: DepthHub, config: &ProxyConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            rest,
            hub,
            currency_pairs: config
                .currency_pairs
                .iter()
                .map(|pair| pair.to_lowercase())
                .collect(),
            concurrency: config.polling_concurrency.max(1),
            polling_wait: config.polling_wait(),
            pause_wait: config.pause_wait(),
            last_depths: Mutex::new(HashMap::new()),
            paused_until: Mutex::new(HashMap::new()),
            stop_tx,
        }
    }

    /// Poll round after round until `stop` is called
    #[instrument(skip(self), fields(pairs = self.currency_pairs.len()))]
    pub async fn run(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        info!(concurrency = self.concurrency, "depth polling started");
        while !*stop_rx.borrow() {
            self.poll_round().await;
            tokio::select! {
                _ = stop_rx.changed() => {}
                _ = tokio::time::sleep(self.polling_wait) => {}
            }
        }
        info!("depth polling finished");
    }

    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Poll every pair once, `concurrency` requests at a time
    pub async fn poll_round(&self) {
        stream::iter(self.currency_pairs.iter())
            .for_each_concurrent(self.concurrency, |pair| async move {
                self.poll_pair(pair).await;
            })
            .await;
    }

    /// Fetch one pair; returns true when a changed board was published
    pub async fn poll_pair(&self, currency_pair: &str) -> bool {
        if self.is_paused(currency_pair) {
            return false;
        }

        let raw = match self.rest.depth_no_retry(currency_pair).await {
            Ok(raw) => raw,
            Err(e) if e.status() == Some(403) => {
                warn!(currency_pair, pause = ?self.pause_wait, "depth forbidden, pausing pair");
                self.pause(currency_pair);
                return false;
            }
            Err(e) => {
                warn!(currency_pair, error = %e, "can not get depth");
                return false;
            }
        };

        {
            let mut last = self
                .last_depths
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.get(currency_pair) == Some(&raw.depth) {
                return false;
            }
            last.insert(currency_pair.to_string(), raw.depth);
        }

        let receivers = self.hub.publish(currency_pair, &raw.body);
        debug!(currency_pair, receivers, "depth changed");
        true
    }

    fn is_paused(&self, currency_pair: &str) -> bool {
        let mut paused = self
            .paused_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match paused.get(currency_pair) {
            Some(until) if Instant::now() < *until => true,
            Some(_) => {
                paused.remove(currency_pair);
                false
            }
            None => false,
        }
    }

    fn pause(&self, currency_pair: &str) {
        self.paused_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(currency_pair.to_string(), Instant::now() + self.pause_wait);
    }
}
