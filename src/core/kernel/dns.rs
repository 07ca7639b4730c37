use crate::core::errors::ExchangeError;
use hyper::client::connect::dns::Name;
use reqwest::dns::{Addrs, Resolve, Resolving};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

pub const DEFAULT_DNS_TTL: Duration = Duration::from_secs(10);

struct CachedAddrs {
    addrs: Vec<IpAddr>,
    resolved_at: Instant,
}

struct DnsInner {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedAddrs>>,
    cursor: AtomicUsize,
}

/// Short-lived DNS cache handing out a host's addresses round-robin.
///
/// Every lookup returns all known addresses, rotated so that successive
/// connections start with a different one. The connector falls back to the
/// remaining addresses in order when the first one fails.
#[derive(Clone)]
pub struct DnsCache {
    inner: Arc<DnsInner>,
}

impl DnsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DnsInner {
                ttl,
                entries: Mutex::new(HashMap::new()),
                cursor: AtomicUsize::new(0),
            }),
        }
    }

    #[instrument(skip(self))]
    pub async fn lookup(&self, host: &str) -> Result<Vec<SocketAddr>, ExchangeError> {
        let cached = {
            let entries = self
                .inner
                .entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            entries
                .get(host)
                .filter(|e| e.resolved_at.elapsed() < self.inner.ttl)
                .map(|e| e.addrs.clone())
        };

        let addrs = match cached {
            Some(addrs) => addrs,
            None => {
                let resolved: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
                    .await
                    .map_err(|e| {
                        ExchangeError::NetworkError(format!(
                            "Failed to resolve {}: {}",
                            host, e
                        ))
                    })?
                    .map(|a| a.ip())
                    .collect();
                if resolved.is_empty() {
                    return Err(ExchangeError::NetworkError(format!(
                        "No addresses found for {}",
                        host
                    )));
                }
                debug!(host, count = resolved.len(), "resolved host");
                self.inner
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(
                        host.to_string(),
                        CachedAddrs {
                            addrs: resolved.clone(),
                            resolved_at: Instant::now(),
                        },
                    );
                resolved
            }
        };

        let start = self.inner.cursor.fetch_add(1, Ordering::Relaxed);
        Ok(rotate(&addrs, start)
            .into_iter()
            .map(|ip| SocketAddr::new(ip, 0))
            .collect())
    }
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_TTL)
    }
}

impl Resolve for DnsCache {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = self.clone();
        Box::pin(async move {
            let addrs = cache
                .lookup(name.as_str())
                .await
                .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

fn rotate<T: Clone>(items: &[T], start: usize) -> Vec<T> {
    if items.is_empty() {
        return Vec::new();
    }
    let offset = start % items.len();
    items[offset..]
        .iter()
        .chain(&items[..offset])
        .cloned()
        .collect()
}
