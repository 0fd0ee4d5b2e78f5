//! The mining master: single authority over the candidate block template.
//!
//! Four concurrent event sources funnel into it (client transactions, peer
//! transactions, peer blocks, worker solutions). The only lock the master
//! owns is the update lock around [`HonestMaster::update_working_set`];
//! everything else is delegated to the ledger, which serializes its own
//! state.

use crate::template::Template;
use crate::worker::{SimpleWorker, WorkerHandle};
use crossbeam_channel::{unbounded, Receiver, Sender};
use permchain_core::{Block, Transaction};
use permchain_ledger::{BlockInfo, Ledger, PushOutcome, TipInfo, UserInfo, VerifyStatus};
use permchain_p2p::Broadcaster;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fatal construction-time errors. Everything after startup is reported to
/// callers as result codes or logged, never raised.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("unsupported miner variant: {0}")]
    UnsupportedVariant(String),
}

/// Miner tuning, immutable after load.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// This node's identity; stamped into every candidate block.
    pub miner_id: String,
    /// Number of mining workers.
    pub workers: usize,
    /// Pool-scan cutoff once at least one transaction has been accepted.
    pub scan_budget: usize,
    /// Maximum transactions per candidate block.
    pub max_block_txs: usize,
    /// Proof-of-work difficulty handed to the workers.
    pub pow_difficulty_bits: u32,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            miner_id: String::new(),
            workers: 1,
            scan_budget: 100,
            max_block_txs: 50,
            pow_difficulty_bits: 16,
        }
    }
}

/// The capability set a mining strategy must provide. The RPC façade talks
/// only to this trait, so alternative (e.g. fault-injecting) strategies can
/// be added without touching it.
pub trait MinerMaster: Send + Sync {
    /// Start the worker pool and the solution dispatcher. Idempotent; the
    /// server calls it exactly once before accepting traffic.
    fn start(self: Arc<Self>);

    // Read path: straight through to the ledger, no update lock.
    fn get_user_info(&self, id: &str) -> UserInfo;
    fn get_latest_block(&self) -> TipInfo;
    fn get_block(&self, hash: &str) -> Option<BlockInfo>;
    fn verify_client_transaction(&self, tx: &Transaction) -> (VerifyStatus, String);

    /// Client-submitted transaction: broadcast to peers, then validate and
    /// apply locally. Returns local acceptance.
    fn on_client_transaction(&self, tx: Transaction) -> bool;

    /// Peer-forwarded transaction: validate and apply locally only.
    fn on_peer_transaction(&self, tx: Transaction);

    /// Peer-forwarded block in wire form.
    fn on_peer_block(&self, wire: &str);

    /// A worker found a valid nonce; `wire` is the fully assembled block.
    fn on_worker_success(&self, wire: &str);
}

impl std::fmt::Debug for dyn MinerMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MinerMaster")
    }
}

/// Build the configured mining strategy.
pub fn new_miner_master(
    variant: &str,
    config: MinerConfig,
    ledger: Arc<dyn Ledger>,
    broadcaster: Arc<Broadcaster>,
) -> Result<Arc<dyn MinerMaster>, MinerError> {
    match variant {
        "honest" => Ok(HonestMaster::new(config, ledger, broadcaster)),
        other => Err(MinerError::UnsupportedVariant(other.to_string())),
    }
}

/// The honest mining strategy.
pub struct HonestMaster {
    config: MinerConfig,
    ledger: Arc<dyn Ledger>,
    broadcaster: Arc<Broadcaster>,
    workers: Vec<Arc<dyn WorkerHandle>>,
    /// Concrete workers whose loops `start` spawns; empty when the pool was
    /// injected (tests).
    own_workers: Vec<Arc<SimpleWorker>>,
    /// Serializes rebuilds: at most one `update_working_set` in flight.
    update_lock: Mutex<()>,
    started: AtomicBool,
    shutdown: Arc<AtomicBool>,
    solutions: (Sender<String>, Receiver<String>),
}

impl HonestMaster {
    /// Create the master with its own pool of `config.workers` workers.
    pub fn new(
        config: MinerConfig,
        ledger: Arc<dyn Ledger>,
        broadcaster: Arc<Broadcaster>,
    ) -> Arc<Self> {
        let own_workers: Vec<Arc<SimpleWorker>> =
            (0..config.workers.max(1)).map(SimpleWorker::new).collect();
        let workers = own_workers
            .iter()
            .map(|w| Arc::clone(w) as Arc<dyn WorkerHandle>)
            .collect();

        Arc::new(Self {
            config,
            ledger,
            broadcaster,
            workers,
            own_workers,
            update_lock: Mutex::new(()),
            started: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            solutions: unbounded(),
        })
    }

    /// Create the master over an injected worker pool. The pool's own loops
    /// are the caller's business; `start` only spawns the dispatcher.
    pub fn with_workers(
        config: MinerConfig,
        ledger: Arc<dyn Ledger>,
        broadcaster: Arc<Broadcaster>,
        workers: Vec<Arc<dyn WorkerHandle>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            ledger,
            broadcaster,
            workers,
            own_workers: Vec::new(),
            update_lock: Mutex::new(()),
            started: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            solutions: unbounded(),
        })
    }

    /// Validate and apply a transaction; only acceptance may refresh the
    /// working set, and then only opportunistically.
    fn process_transaction(&self, tx: Transaction, client_origin: bool) -> bool {
        match self.ledger.push_transaction(tx, client_origin) {
            PushOutcome::Accepted => {
                self.update_working_set(false);
                true
            }
            PushOutcome::Rejected | PushOutcome::InsufficientFunds => false,
        }
    }

    /// Rebuild the candidate template and republish it to the workers.
    ///
    /// `force` is set when the chain tip changed, making every outstanding
    /// template stale; otherwise the rebuild is skipped while all workers
    /// are still busy, trading a little staleness for less template churn.
    fn update_working_set(&self, force: bool) {
        let _guard = self.update_lock.lock().expect("update lock poisoned");

        if !force && self.workers.iter().all(|w| w.working()) {
            return;
        }

        let mut accepted = Vec::new();
        {
            let mut session = self.ledger.open_session(true, true);
            let mut scanned = 0usize;
            for tx in self.ledger.pending_transactions() {
                if session.test_and_apply(&tx) {
                    accepted.push(tx);
                }
                scanned += 1;
                if (!accepted.is_empty() && scanned >= self.config.scan_budget)
                    || accepted.len() >= self.config.max_block_txs
                {
                    break;
                }
            }
        } // session released here, success or not

        if accepted.is_empty() {
            debug!("no pending transaction survives revalidation; keeping old templates");
            return;
        }

        let tip = self.ledger.latest_block();
        let block = Block::candidate(tip.height + 1, tip.hash, accepted, &self.config.miner_id);
        let wire = match block.to_wire() {
            Ok(wire) => wire,
            Err(err) => {
                warn!(%err, "candidate serialization failed; abandoning rebuild");
                return;
            }
        };
        let template = match Template::split(&wire) {
            Ok(template) => template,
            Err(err) => {
                warn!(%err, "abandoning rebuild");
                return;
            }
        };

        info!(
            block_id = block.block_id,
            txs = block.transactions.len(),
            force,
            "publishing new working set"
        );
        for worker in &self.workers {
            if force || !worker.working() {
                worker.publish(template.clone());
            }
        }
    }
}

impl MinerMaster for HonestMaster {
    fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        for worker in &self.own_workers {
            // Detached: the loop exits on the shutdown flag.
            let _ = worker.spawn_loop(
                self.config.pow_difficulty_bits,
                self.solutions.0.clone(),
                Arc::clone(&self.shutdown),
            );
        }

        // Solution dispatcher. Holds only a weak master reference so the
        // master can be dropped; the channel disconnects when it is.
        let weak: Weak<Self> = Arc::downgrade(&self);
        let solutions = self.solutions.1.clone();
        thread::Builder::new()
            .name("miner-dispatch".to_string())
            .spawn(move || {
                for wire in solutions.iter() {
                    let Some(master) = weak.upgrade() else { break };
                    master.on_worker_success(&wire);
                }
            })
            .expect("failed to spawn dispatcher thread");

        info!(workers = self.workers.len(), "mining master started");
    }

    fn get_user_info(&self, id: &str) -> UserInfo {
        self.ledger.get_user_info(id)
    }

    fn get_latest_block(&self) -> TipInfo {
        self.ledger.latest_block()
    }

    fn get_block(&self, hash: &str) -> Option<BlockInfo> {
        self.ledger.get_block(hash)
    }

    fn verify_client_transaction(&self, tx: &Transaction) -> (VerifyStatus, String) {
        self.ledger.verify_transaction(tx)
    }

    fn on_client_transaction(&self, tx: Transaction) -> bool {
        // Fully asynchronous broadcast: local acceptance is decided
        // independently of peer delivery, so the handle is dropped here.
        let _ = self.broadcaster.push_transaction_async(tx.clone());
        self.process_transaction(tx, true)
    }

    fn on_peer_transaction(&self, tx: Transaction) {
        let _ = self.process_transaction(tx, false);
    }

    fn on_peer_block(&self, wire: &str) {
        match self.ledger.push_block(wire) {
            Ok(true) => self.update_working_set(true),
            Ok(false) => debug!("peer block did not change the tip"),
            Err(err) => warn!(%err, "rejected peer block"),
        }
    }

    fn on_worker_success(&self, wire: &str) {
        match self.ledger.declare_block(wire) {
            Ok(declared) => {
                info!(
                    block_id = declared.block.block_id,
                    hash = %declared.hash,
                    "declared mined block"
                );
                let _ = self.broadcaster.push_block_async(wire.to_string());
                self.update_working_set(true);
            }
            Err(err) => warn!(%err, "worker declaration rejected"),
        }
    }
}

impl Drop for HonestMaster {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
