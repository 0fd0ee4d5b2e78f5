//! Mining workers.
//!
//! Each worker runs an independent CPU-bound loop attempting nonce values
//! against its current template. Publishing a new template preempts the
//! current attempt (last writer wins); a worker that exhausts its template
//! without success goes idle until handed a new one.

use crate::template::Template;
use crossbeam_channel::Sender;
use permchain_core::{meets_difficulty, Block};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

/// Size of the nonce space: 8 decimal digits.
const NONCE_SPACE: u64 = 100_000_000;

/// How often the search loop re-checks for preemption and shutdown.
const PREEMPT_CHECK_INTERVAL: u64 = 1024;

/// How long an idle worker sleeps between template polls.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// The master's view of a worker. Both methods are safe to call while the
/// worker's own loop is running.
pub trait WorkerHandle: Send + Sync {
    /// Whether the worker currently holds an unexhausted template.
    fn working(&self) -> bool;

    /// Atomically replace the worker's active template.
    fn publish(&self, template: Template);
}

/// Shared state between the master-facing handle and the mining loop.
struct Shared {
    /// The active template; `None` once exhausted or solved.
    slot: Mutex<Option<Template>>,
    /// Bumped on every publish; the loop uses it to detect preemption.
    generation: AtomicU64,
    working: AtomicBool,
}

/// The one concrete worker: a brute-force nonce search over the template.
pub struct SimpleWorker {
    id: usize,
    shared: Arc<Shared>,
}

impl SimpleWorker {
    pub fn new(id: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            shared: Arc::new(Shared {
                slot: Mutex::new(None),
                generation: AtomicU64::new(0),
                working: AtomicBool::new(false),
            }),
        })
    }

    /// Spawn the mining loop. Solved blocks go out on `solutions` in their
    /// full wire form; the loop exits when `shutdown` is set.
    pub fn spawn_loop(
        self: &Arc<Self>,
        difficulty_bits: u32,
        solutions: Sender<String>,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        thread::Builder::new()
            .name(format!("miner-worker-{}", worker.id))
            .spawn(move || worker.mine_loop(difficulty_bits, solutions, shutdown))
            .expect("failed to spawn worker thread")
    }

    fn take_current(&self) -> Option<(Template, u64)> {
        let slot = self.shared.slot.lock().expect("worker slot poisoned");
        let generation = self.shared.generation.load(Ordering::Acquire);
        slot.clone().map(|t| (t, generation))
    }

    /// Clear the slot and go idle, unless a newer template arrived while we
    /// were searching.
    fn retire(&self, generation: u64) {
        let mut slot = self.shared.slot.lock().expect("worker slot poisoned");
        if self.shared.generation.load(Ordering::Acquire) == generation {
            *slot = None;
            self.shared.working.store(false, Ordering::Release);
        }
    }

    fn mine_loop(&self, difficulty_bits: u32, solutions: Sender<String>, shutdown: Arc<AtomicBool>) {
        let mut rng = rand::thread_rng();

        while !shutdown.load(Ordering::Relaxed) {
            let Some((template, generation)) = self.take_current() else {
                thread::sleep(IDLE_POLL);
                continue;
            };

            // Random start offset so parallel workers cover different parts
            // of the nonce space.
            let start: u64 = rng.gen_range(0..NONCE_SPACE);
            let mut preempted = false;

            for i in 0..NONCE_SPACE {
                if i % PREEMPT_CHECK_INTERVAL == 0
                    && (shutdown.load(Ordering::Relaxed)
                        || self.shared.generation.load(Ordering::Acquire) != generation)
                {
                    preempted = true;
                    break;
                }

                let nonce = format!("{:08}", (start + i) % NONCE_SPACE);
                let wire = template.assemble(&nonce);
                if meets_difficulty(&Block::wire_hash(&wire), difficulty_bits) {
                    info!(worker = self.id, nonce, "proof-of-work solution found");
                    self.retire(generation);
                    let _ = solutions.send(wire);
                    preempted = true; // already retired
                    break;
                }
            }

            if !preempted {
                debug!(worker = self.id, "template exhausted without solution");
                self.retire(generation);
            }
        }
    }
}

impl WorkerHandle for SimpleWorker {
    fn working(&self) -> bool {
        self.shared.working.load(Ordering::Acquire)
    }

    fn publish(&self, template: Template) {
        let mut slot = self.shared.slot.lock().expect("worker slot poisoned");
        *slot = Some(template);
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.working.store(true, Ordering::Release);
    }
}
