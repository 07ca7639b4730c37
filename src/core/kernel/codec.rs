use crate::core::errors::ExchangeError;
use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

/// Codec trait for exchange-specific stream messages
///
/// Each exchange implements this to turn inbound text frames into typed
/// messages and to build whatever outbound subscription its stream needs.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed messages from this exchange
    type Message: Send + Sync;

    /// Encode a subscription request for the given channels
    ///
    /// Returns `Ok(None)` when the exchange needs no subscribe message.
    fn encode_subscription(
        &self,
        channels: &[impl AsRef<str> + Send + Sync],
    ) -> Result<Option<String>, ExchangeError>;

    /// Decode one text frame
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored/filtered by codec
    /// - `Err(error)` - Failed to decode message
    fn decode_text(&self, text: &str) -> Result<Option<Self::Message>, ExchangeError>;

    /// Decode a raw frame; only text frames carry data
    fn decode_message(&self, message: &Message) -> Result<Option<Self::Message>, ExchangeError> {
        match message {
            Message::Text(text) => self.decode_text(text),
            _ => Ok(None),
        }
    }
}

/// The generic `{"type":"subscribe","channel":"..."}` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: String,
}

impl SubscribeEnvelope {
    /// Subscription to the trades channel of a currency pair
    pub fn trades(currency_pair: &str) -> Self {
        Self {
            kind: "subscribe".to_string(),
            channel: format!("{}-trades", currency_pair),
        }
    }

    pub fn to_json(&self) -> Result<String, ExchangeError> {
        serde_json::to_string(self).map_err(ExchangeError::from)
    }
}
