use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Strictly increasing request nonces of the form `{unix seconds}.{9 digits}`.
///
/// The fraction packs microseconds and a process-local sequence
/// (`micros * 1000 + seq % 1000`), so calls inside the same microsecond still
/// differ. If the clock stalls or steps back, the previous value plus one is
/// issued instead.
#[derive(Debug, Default)]
pub struct NonceGenerator {
    sequence: AtomicU64,
    last: AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_value(&self) -> u64 {
        let now = Utc::now();
        let secs = u64::try_from(now.timestamp()).unwrap_or_default();
        let micros = u64::from(now.timestamp_subsec_micros() % 1_000_000);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % 1000;
        let candidate = secs * NANOS_PER_SEC + micros * 1000 + seq;

        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or(candidate);
        candidate.max(previous + 1)
    }

    /// Next nonce formatted for a request body
    pub fn next_nonce(&self) -> String {
        format_nonce(self.next_value())
    }
}

pub fn format_nonce(value: u64) -> String {
    format!("{}.{:09}", value / NANOS_PER_SEC, value % NANOS_PER_SEC)
}
