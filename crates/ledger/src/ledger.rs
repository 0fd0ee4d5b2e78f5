//! The `Ledger` trait: what the mining master requires from chain state.

use permchain_core::{Block, Transaction};
use thiserror::Error;

/// Errors from block-level ledger operations.
///
/// Transaction-level rejection is not an error; it is reported through
/// [`PushOutcome`] so callers can never confuse "your transfer bounced" with
/// "the chain is broken".
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("malformed block: {0}")]
    Malformed(#[from] permchain_core::WireError),

    #[error("stale tip: block {got} extends {got_prev}, tip is {tip_hash}")]
    StaleTip {
        got: u64,
        got_prev: String,
        tip_hash: String,
    },

    #[error("unknown parent: block {got} is ahead of tip {tip}")]
    UnknownParent { got: u64, tip: u64 },

    #[error("nonce is not an 8-digit proof-of-work solution")]
    BadNonce,

    #[error("proof-of-work predicate not satisfied")]
    BadProofOfWork,

    #[error("block transactions do not apply as a unit")]
    InvalidTransactions,
}

/// Outcome of pushing a transaction into the pending pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Replay or structurally invalid. Wire code 0.
    Rejected,
    /// Accepted into the pending pool. Wire code 1.
    Accepted,
    /// Sender cannot cover the transfer. Wire code 2.
    InsufficientFunds,
}

impl PushOutcome {
    /// The small-integer wire code used by the RPC surface.
    pub fn code(self) -> u8 {
        match self {
            PushOutcome::Rejected => 0,
            PushOutcome::Accepted => 1,
            PushOutcome::InsufficientFunds => 2,
        }
    }
}

/// Where a transaction stands relative to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyStatus {
    /// Never seen (or structurally invalid). Wire code 0.
    Unknown,
    /// Accepted but not yet mined. Wire code 1.
    Pending,
    /// Committed in a declared block. Wire code 2.
    Committed,
}

impl VerifyStatus {
    /// The small-integer wire code used by the RPC surface.
    pub fn code(self) -> u8 {
        match self {
            VerifyStatus::Unknown => 0,
            VerifyStatus::Pending => 1,
            VerifyStatus::Committed => 2,
        }
    }
}

/// Read-only account view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: String,
    pub balance: u64,
}

/// The current chain tip. Height 0 with the all-zero hash is the implicit
/// genesis; no genesis block is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipInfo {
    pub height: u64,
    pub hash: String,
}

/// A stored block together with its hash and wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    pub block: Block,
    pub hash: String,
    pub wire: String,
}

/// A sandboxed validation context: transactions can be tentatively checked
/// and applied against a consistent view of state without touching the
/// authoritative pending pool. Released on drop.
pub trait SpeculativeSession {
    /// Test the transaction against the session's view; on success the
    /// session absorbs its effects so later calls see them.
    fn test_and_apply(&mut self, tx: &Transaction) -> bool;
}

/// The chain-state authority consumed by the mining master.
pub trait Ledger: Send + Sync {
    /// Read an account. Accounts that were never touched report the
    /// network's default balance.
    fn get_user_info(&self, id: &str) -> UserInfo;

    /// Current chain tip.
    fn latest_block(&self) -> TipInfo;

    /// Look up a declared block by its hash.
    fn get_block(&self, hash: &str) -> Option<BlockInfo>;

    /// Read-only validation: where does this transaction stand? Returns the
    /// status and, when committed, the hash of the containing block.
    fn verify_transaction(&self, tx: &Transaction) -> (VerifyStatus, String);

    /// Validate and append a transaction to the pending pool.
    /// `client_origin` marks submissions from this node's own clients.
    fn push_transaction(&self, tx: Transaction, client_origin: bool) -> PushOutcome;

    /// Apply a peer-received block. `Ok(true)` when the tip advanced,
    /// `Ok(false)` when the block is already known or behind the tip.
    fn push_block(&self, wire: &str) -> Result<bool, LedgerError>;

    /// Commit a worker-solved block. Unlike [`push_block`](Ledger::push_block)
    /// a block that no longer extends the tip is an error.
    fn declare_block(&self, wire: &str) -> Result<BlockInfo, LedgerError>;

    /// Open a speculative validation session. The lock flags state which
    /// parts of the ledger the session must see consistently.
    fn open_session(
        &self,
        lock_blocks: bool,
        lock_users: bool,
    ) -> Box<dyn SpeculativeSession + '_>;

    /// Snapshot of the pending pool, in acceptance order.
    fn pending_transactions(&self) -> Vec<Transaction>;
}
