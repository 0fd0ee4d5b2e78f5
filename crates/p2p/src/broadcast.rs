//! Broadcaster: fan a transaction or block out to every peer.
//!
//! Each push runs on background threads; the caller gets a [`PushHandle`]
//! that resolves to `true` only when every peer acknowledged within its
//! retry budget. Local acceptance never depends on that outcome.

use crate::future::{push_pair, PushHandle};
use crossbeam_channel::{bounded, Receiver, Sender};
use permchain_core::Transaction;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Delivers a single payload to a single peer. The implementation owns the
/// per-call timeout.
pub trait PeerTransport: Send + Sync + 'static {
    /// Push a transaction; `true` means the peer acknowledged.
    fn push_transaction(&self, peer: &str, tx: &Transaction) -> bool;

    /// Push a serialized block; `true` means the peer acknowledged.
    fn push_block(&self, peer: &str, wire: &str) -> bool;
}

/// Peer-push tuning, immutable after load.
#[derive(Debug, Clone)]
pub struct P2pConfig {
    /// Maximum in-flight peer calls per push.
    pub push_parallel: usize,
    /// Per-call timeout (enforced by the transport).
    pub push_timeout: Duration,
    /// Attempts per peer before giving up.
    pub push_trials: u32,
    /// Pause between attempts.
    pub push_retry_interval: Duration,
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            push_parallel: 4,
            push_timeout: Duration::from_millis(500),
            push_trials: 3,
            push_retry_interval: Duration::from_secs(3),
        }
    }
}

/// Fans pushes out to the peer roster.
pub struct Broadcaster {
    peers: Vec<String>,
    config: P2pConfig,
    transport: Arc<dyn PeerTransport>,
    permits: (Sender<()>, Receiver<()>),
}

impl Broadcaster {
    pub fn new(peers: Vec<String>, config: P2pConfig, transport: Arc<dyn PeerTransport>) -> Self {
        // A pre-filled bounded channel acts as the parallelism semaphore.
        let permits = bounded(config.push_parallel.max(1));
        for _ in 0..config.push_parallel.max(1) {
            permits.0.send(()).expect("permit channel sized for tokens");
        }
        Self {
            peers,
            config,
            transport,
            permits,
        }
    }

    /// Push a transaction to every peer. Fire-and-forget unless the caller
    /// waits on the handle.
    pub fn push_transaction_async(&self, tx: Transaction) -> PushHandle {
        self.fan_out(move |transport, peer| transport.push_transaction(peer, &tx))
    }

    /// Push a serialized block to every peer.
    pub fn push_block_async(&self, wire: String) -> PushHandle {
        self.fan_out(move |transport, peer| transport.push_block(peer, &wire))
    }

    fn fan_out<F>(&self, op: F) -> PushHandle
    where
        F: Fn(&dyn PeerTransport, &str) -> bool + Send + Sync + 'static,
    {
        let (signal, handle) = push_pair();
        let op = Arc::new(op);
        let peers = self.peers.clone();
        let transport = Arc::clone(&self.transport);
        let permits = self.permits.clone();
        let trials = self.config.push_trials;
        let retry_interval = self.config.push_retry_interval;

        thread::spawn(move || {
            let workers: Vec<_> = peers
                .into_iter()
                .map(|peer| {
                    let op = Arc::clone(&op);
                    let transport = Arc::clone(&transport);
                    let permits = permits.clone();
                    thread::spawn(move || {
                        let token = permits.1.recv().expect("permit channel closed");
                        let acked =
                            push_with_retries(&*op, &*transport, &peer, trials, retry_interval);
                        let _ = permits.0.send(token);
                        acked
                    })
                })
                .collect();

            // Join every worker before resolving; the outcome covers the
            // whole roster.
            let acks: Vec<bool> = workers
                .into_iter()
                .map(|w| w.join().unwrap_or(false))
                .collect();
            signal.finish(acks.iter().all(|&a| a));
        });

        handle
    }
}

fn push_with_retries(
    op: &(dyn Fn(&dyn PeerTransport, &str) -> bool + Send + Sync),
    transport: &dyn PeerTransport,
    peer: &str,
    trials: u32,
    retry_interval: Duration,
) -> bool {
    for attempt in 1..=trials.max(1) {
        if op(transport, peer) {
            if attempt > 1 {
                debug!(peer, attempt, "peer push recovered");
            }
            return true;
        }
        if attempt < trials {
            thread::sleep(retry_interval);
        }
    }
    warn!(peer, trials, "peer push failed after all retries");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Acknowledges a peer only after a configured number of failures.
    struct FlakyTransport {
        failures_before_ack: HashMap<String, usize>,
        attempts: Mutex<HashMap<String, usize>>,
    }

    impl FlakyTransport {
        fn new(failures_before_ack: HashMap<String, usize>) -> Self {
            Self {
                failures_before_ack,
                attempts: Mutex::new(HashMap::new()),
            }
        }

        fn attempt(&self, peer: &str) -> bool {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(peer.to_string()).or_insert(0);
            *n += 1;
            *n > *self.failures_before_ack.get(peer).unwrap_or(&0)
        }
    }

    impl PeerTransport for FlakyTransport {
        fn push_transaction(&self, peer: &str, _tx: &Transaction) -> bool {
            self.attempt(peer)
        }
        fn push_block(&self, peer: &str, _wire: &str) -> bool {
            self.attempt(peer)
        }
    }

    fn fast_config(parallel: usize, trials: u32) -> P2pConfig {
        P2pConfig {
            push_parallel: parallel,
            push_timeout: Duration::from_millis(100),
            push_trials: trials,
            push_retry_interval: Duration::from_millis(1),
        }
    }

    fn tx() -> Transaction {
        Transaction::transfer("t1", "alice", "bob", 100, 5)
    }

    #[test]
    fn test_all_peers_ack_first_try() {
        let transport = Arc::new(FlakyTransport::new(HashMap::new()));
        let b = Broadcaster::new(
            vec!["peer-a".into(), "peer-b".into()],
            fast_config(4, 3),
            transport,
        );
        assert!(b.push_transaction_async(tx()).wait());
    }

    #[test]
    fn test_retries_until_ack() {
        let failures = HashMap::from([("peer-a".to_string(), 2)]);
        let transport = Arc::new(FlakyTransport::new(failures));
        let b = Broadcaster::new(vec!["peer-a".into()], fast_config(4, 3), Arc::clone(&transport) as Arc<dyn PeerTransport>);

        assert!(b.push_transaction_async(tx()).wait());
        assert_eq!(transport.attempts.lock().unwrap()["peer-a"], 3);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let failures = HashMap::from([("peer-a".to_string(), 10)]);
        let transport = Arc::new(FlakyTransport::new(failures));
        let b = Broadcaster::new(vec!["peer-a".into()], fast_config(4, 3), Arc::clone(&transport) as Arc<dyn PeerTransport>);

        assert!(!b.push_block_async("{}".to_string()).wait());
        // Exactly `trials` attempts, no more.
        assert_eq!(transport.attempts.lock().unwrap()["peer-a"], 3);
    }

    #[test]
    fn test_single_failing_peer_fails_the_push() {
        let failures = HashMap::from([("peer-b".to_string(), 10)]);
        let transport = Arc::new(FlakyTransport::new(failures));
        let b = Broadcaster::new(
            vec!["peer-a".into(), "peer-b".into()],
            fast_config(4, 2),
            transport,
        );
        assert!(!b.push_transaction_async(tx()).wait());
    }

    #[test]
    fn test_empty_roster_resolves_true() {
        let transport = Arc::new(FlakyTransport::new(HashMap::new()));
        let b = Broadcaster::new(vec![], fast_config(4, 3), transport);
        assert!(b.push_transaction_async(tx()).wait());
    }

    /// Transport that records the peak number of concurrent calls.
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PeerTransport for ConcurrencyProbe {
        fn push_transaction(&self, _peer: &str, _tx: &Transaction) -> bool {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.current.fetch_sub(1, Ordering::SeqCst);
            true
        }
        fn push_block(&self, _peer: &str, _wire: &str) -> bool {
            true
        }
    }

    #[test]
    fn test_parallelism_is_bounded() {
        let probe = Arc::new(ConcurrencyProbe {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let peers: Vec<String> = (0..8).map(|i| format!("peer-{i}")).collect();
        let b = Broadcaster::new(peers, fast_config(2, 1), Arc::clone(&probe) as Arc<dyn PeerTransport>);

        assert!(b.push_transaction_async(tx()).wait());
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    }
}
