//! Depth proxy: polls the public depth endpoint once and fans the raw JSON out
//! to any number of local WebSocket subscribers.
//!
//! ```text
//! DepthFetcher --publish--> DepthHub --subscribe--> DepthServer clients
//! ```

pub mod fetcher;
pub mod server;

pub use fetcher::DepthFetcher;
pub use server::{DepthServer, PING_INTERVAL};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// One broadcast channel per served currency pair
#[derive(Debug, Clone)]
pub struct DepthHub {
    channels: Arc<HashMap<String, broadcast::Sender<Arc<str>>>>,
}

impl DepthHub {
    pub fn new<I, S>(currency_pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let channels = currency_pairs
            .into_iter()
            .map(|pair| {
                let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
                (pair.as_ref().to_lowercase(), tx)
            })
            .collect();
        Self {
            channels: Arc::new(channels),
        }
    }

    pub fn contains(&self, currency_pair: &str) -> bool {
        self.channels.contains_key(currency_pair)
    }

    pub fn currency_pairs(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// `None` for pairs the proxy does not serve
    pub fn subscribe(&self, currency_pair: &str) -> Option<broadcast::Receiver<Arc<str>>> {
        self.channels.get(currency_pair).map(broadcast::Sender::subscribe)
    }

    /// Send `message` to every subscriber of the pair, returning how many got it
    pub fn publish(&self, currency_pair: &str, message: &str) -> usize {
        self.channels
            .get(currency_pair)
            .and_then(|tx| tx.send(Arc::from(message)).ok())
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self, currency_pair: &str) -> usize {
        self.channels
            .get(currency_pair)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}
