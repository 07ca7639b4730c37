use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Common part of every private-API response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: i64,
    #[serde(default)]
    pub error: String,
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        self.success == 1
    }
}

/// What to do with a decoded envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Resubmit with a fresh nonce and signature, after `wait` if given
    Retryable { wait: Option<Duration> },
    Fatal(String),
}

/// An error message that is known to clear on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientRule {
    pub message: String,
    pub wait: Option<Duration>,
}

impl TransientRule {
    pub fn new(message: impl Into<String>, wait: Option<Duration>) -> Self {
        Self {
            message: message.into(),
            wait,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryClassifier {
    rules: Vec<TransientRule>,
}

impl RetryClassifier {
    pub fn new(rules: Vec<TransientRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[TransientRule] {
        &self.rules
    }

    pub fn classify(&self, envelope: &Envelope) -> Classification {
        if envelope.is_success() {
            return Classification::Success;
        }
        self.rules
            .iter()
            .find(|rule| rule.message == envelope.error)
            .map_or_else(
                || Classification::Fatal(envelope.error.clone()),
                |rule| Classification::Retryable { wait: rule.wait },
            )
    }
}

/// Lets trading logic decide whether a failed order is resubmitted.
///
/// Called with the price and amount of the failed attempt and the error text.
/// The callback may adjust price and amount in place; returning `false`
/// surfaces the error to the caller.
pub trait RetryCallback: Send {
    fn should_retry(&mut self, price: &mut Decimal, amount: &mut Decimal, error: &str) -> bool;
}

impl<F> RetryCallback for F
where
    F: FnMut(&mut Decimal, &mut Decimal, &str) -> bool + Send,
{
    fn should_retry(&mut self, price: &mut Decimal, amount: &mut Decimal, error: &str) -> bool {
        self(price, amount, error)
    }
}
