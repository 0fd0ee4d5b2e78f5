//! One-shot result future for fire-and-forget pushes.
//!
//! A push spawns background work that completes on its own schedule; the
//! initiator may want the outcome, or may not care. The pair below decouples
//! the two: the background side calls [`PushSignal::finish`] exactly once,
//! the initiator either blocks on [`PushHandle::wait`] or drops the handle.
//!
//! Both halves consume `self`, so double-finish and double-wait are
//! unrepresentable rather than merely documented.

use crossbeam_channel::{bounded, Receiver, Sender};

/// Producer half: resolves the future.
pub struct PushSignal {
    tx: Sender<bool>,
}

/// Consumer half: waits for the outcome, or is dropped to discard it.
pub struct PushHandle {
    rx: Receiver<bool>,
}

/// Create a connected signal/handle pair.
pub fn push_pair() -> (PushSignal, PushHandle) {
    // Capacity 1: finish never blocks, even against a discarded handle.
    let (tx, rx) = bounded(1);
    (PushSignal { tx }, PushHandle { rx })
}

impl PushSignal {
    /// Signal completion. If the handle was discarded this is a no-op; the
    /// background thread is never left hanging on an uninterested caller.
    pub fn finish(self, outcome: bool) {
        let _ = self.tx.send(outcome);
    }
}

impl PushHandle {
    /// Block until the push completes and return its outcome. A signal that
    /// was dropped without finishing reads as failure.
    pub fn wait(self) -> bool {
        self.rx.recv().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_finish_then_wait() {
        let (signal, handle) = push_pair();
        signal.finish(true);
        assert!(handle.wait());

        let (signal, handle) = push_pair();
        signal.finish(false);
        assert!(!handle.wait());
    }

    #[test]
    fn test_wait_blocks_until_finish() {
        let (signal, handle) = push_pair();
        let start = Instant::now();

        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            signal.finish(true);
        });

        assert!(handle.wait());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_finish_after_discard_is_harmless() {
        let (signal, handle) = push_pair();
        drop(handle);
        signal.finish(true);
    }

    #[test]
    fn test_dropped_signal_reads_as_failure() {
        let (signal, handle) = push_pair();
        drop(signal);
        assert!(!handle.wait());
    }
}
