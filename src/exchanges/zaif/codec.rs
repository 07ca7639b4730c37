use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{SubscribeEnvelope, WsCodec};
use crate::exchanges::zaif::types::{ZaifDepth, ZaifStreamFrame};

/// Zaif stream messages
#[derive(Debug, Clone)]
pub enum ZaifMessage {
    /// Full frame from the exchange stream: board, last price, trades
    Frame(ZaifStreamFrame),
    /// Board only, relayed by the depth proxy
    Depth(ZaifDepth),
}

/// Which socket the codec decodes for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZaifFeed {
    #[default]
    Exchange,
    Proxy,
}

/// Zaif WebSocket codec implementation
#[derive(Debug, Clone, Default)]
pub struct ZaifCodec {
    feed: ZaifFeed,
    subscribe_on_connect: bool,
}

impl ZaifCodec {
    pub fn new(feed: ZaifFeed) -> Self {
        Self {
            feed,
            subscribe_on_connect: false,
        }
    }

    /// Send the generic trades subscription after each connect
    pub fn with_subscribe_on_connect(mut self, subscribe: bool) -> Self {
        self.subscribe_on_connect = subscribe;
        self
    }

    pub fn feed(&self) -> ZaifFeed {
        self.feed
    }
}

impl WsCodec for ZaifCodec {
    type Message = ZaifMessage;

    fn encode_subscription(
        &self,
        channels: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Option<String>, ExchangeError> {
        // The pushed stream is selected by URL; nothing to send by default
        if !self.subscribe_on_connect {
            return Ok(None);
        }
        match channels {
            [] => Ok(None),
            [pair] => SubscribeEnvelope::trades(pair.as_ref()).to_json().map(Some),
            _ => Err(ExchangeError::InvalidParameters(
                "A Zaif stream carries exactly one currency pair".to_string(),
            )),
        }
    }

    fn decode_text(&self, text: &str) -> Result<Option<Self::Message>, ExchangeError> {
        let decoded = match self.feed {
            ZaifFeed::Exchange => serde_json::from_str(text).map(ZaifMessage::Frame),
            ZaifFeed::Proxy => serde_json::from_str(text).map(ZaifMessage::Depth),
        };
        decoded.map(Some).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to parse stream frame: {}", e))
        })
    }
}
