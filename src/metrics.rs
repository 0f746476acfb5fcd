//! Cumulative query counters and the DNS-amplification throttle.
//!
//! Counters are incremented from every in-flight query task, so they are plain relaxed
//! atomics; a snapshot read may trail by a handful of queries but can never tear.
//!
//! The throttle guards `metrics.status.sslip.io`, whose reply (~400 bytes for a ~100 byte
//! query) would otherwise make a handy amplification payload. It is a channel holding
//! [`AMPLIFICATION_BURST`] tokens, pre-filled at startup and topped up four times a second;
//! every metrics answer consumes one token first. Burst: 100 responses. Sustained:
//! ~4 responses/second, ~1.2 kBytes/second.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Mutex;

pub const AMPLIFICATION_BURST: usize = 100;
pub const AMPLIFICATION_REFILL_INTERVAL: Duration = Duration::from_millis(250);

pub struct Metrics {
    start: Instant,
    pub queries: AtomicU64,
    pub answered: AtomicU64,
    pub answered_a: AtomicU64,
    pub answered_aaaa: AtomicU64,
    pub answered_src_ip_txt: AtomicU64,
    pub answered_version_txt: AtomicU64,
    pub answered_dns01_ns: AtomicU64,
    pub answered_blocked: AtomicU64,
    pub kv_errors: AtomicU64,
    token_tx: Sender<()>,
    tokens: Mutex<Receiver<()>>,
}

impl Metrics {
    /// Creates the counter set with the amplification channel already holding a full burst
    /// of tokens. Spawn [`refill_amplification_tokens`] with [`Metrics::token_sender`] to
    /// keep it topped up.
    pub fn new() -> Self {
        let (token_tx, tokens) = mpsc::channel(AMPLIFICATION_BURST);
        for _ in 0..AMPLIFICATION_BURST {
            // the channel was created with exactly this much capacity
            let _ = token_tx.try_send(());
        }
        Metrics {
            start: Instant::now(),
            queries: AtomicU64::new(0),
            answered: AtomicU64::new(0),
            answered_a: AtomicU64::new(0),
            answered_aaaa: AtomicU64::new(0),
            answered_src_ip_txt: AtomicU64::new(0),
            answered_version_txt: AtomicU64::new(0),
            answered_dns01_ns: AtomicU64::new(0),
            answered_blocked: AtomicU64::new(0),
            kv_errors: AtomicU64::new(0),
            token_tx,
            tokens: Mutex::new(tokens),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn token_sender(&self) -> Sender<()> {
        self.token_tx.clone()
    }

    /// Waits for one amplification token. Must be called before building a metrics TXT
    /// answer.
    pub async fn amplification_token(&self) {
        let _ = self.tokens.lock().await.recv().await;
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

/// Adds one token per [`AMPLIFICATION_REFILL_INTERVAL`] once the initial burst is spent,
/// for as long as the owning [`Metrics`] is alive.
pub async fn refill_amplification_tokens(tokens: Sender<()>) {
    while tokens.send(()).await.is_ok() {
        tokio::time::sleep(AMPLIFICATION_REFILL_INTERVAL).await;
    }
}
