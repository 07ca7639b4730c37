/// `coinact` Kernel - exchange-agnostic connectivity primitives
///
/// Everything an exchange implementation needs to talk to a remote trading
/// API safely lives here. The kernel contains no exchange-specific endpoints,
/// message shapes, or error strings; those are data owned by each exchange.
///
/// # Architecture
///
/// ## Transport Layer
/// - `PooledTransport`: one connection-reusing client per `(scheme, host)`,
///   DNS round-robin, optional local bind address, bounded retry
/// - `StreamSession`: managed WebSocket subscription with keepalive and redial
///
/// ## Admission and Authentication
/// - `SlidingWindowLimiter`: blocking admission with separate public/trade budgets
/// - `NonceGenerator`: strictly increasing request nonces
/// - `HmacSigner`: HMAC over the request body with round-robin credentials
///
/// ## Response Handling
/// - `RetryClassifier`: decides retry vs. surface from an application envelope
/// - `WsCodec`: exchange-specific stream message decoding
///
/// # Control Flow
///
/// A private call builds its body with a fresh nonce, is signed, waits in the
/// limiter, and is executed by the transport (which retries transport errors on
/// its own). The decoded envelope is then classified; transient application
/// errors restart the whole cycle with a new nonce and signature.
///
/// ```rust,no_run
/// use coinact::core::kernel::*;
/// use coinact::core::config::Credential;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = PooledTransport::new(
///     TransportConfig::new("zaif").with_retry(3, Duration::from_millis(500)),
/// );
/// let limiter = SlidingWindowLimiter::default();
/// let nonce = NonceGenerator::new();
/// let signer = HmacSigner::new(
///     vec![Credential::new("key", "secret")],
///     HmacAlgorithm::Sha512,
///     "Key",
///     "Sign",
/// );
///
/// let body = format!("method=get_info2&nonce={}", nonce.next_nonce());
/// let headers = signer.sign_request(body.as_bytes())?;
/// limiter.admit(RateClass::Trade).await;
/// let request = HttpRequest::post("https://api.zaif.jp/tapi")
///     .with_headers(headers)
///     .with_body(body);
/// let response = transport.execute(&request, false).await?;
/// let envelope: Envelope = response.json()?;
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod dns;
pub mod limiter;
pub mod nonce;
pub mod rest;
pub mod retry;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::{SubscribeEnvelope, WsCodec};
pub use dns::DnsCache;
pub use limiter::{RateClass, SlidingWindowLimiter, WindowConfig};
pub use nonce::NonceGenerator;
pub use rest::{HttpRequest, HttpResponse, HttpTransport, PooledTransport, TransportConfig};
pub use retry::{Classification, Envelope, RetryCallback, RetryClassifier, TransientRule};
pub use signer::{CredentialPool, HmacAlgorithm, HmacSigner, SignatureResult, Signer};
pub use ws::{
    MessageCallback, SessionState, StreamSession, TungsteniteDialer, WsConfig, WsDialer,
};
