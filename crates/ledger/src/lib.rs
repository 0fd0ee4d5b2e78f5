//! Chain-state authority interface for permchain.
//!
//! The mining master treats the ledger as a remote authority: it owns account
//! balances, the pending transaction pool, and the chain of blocks, and it
//! serializes its own internal reads and writes. This crate defines that
//! interface plus an in-memory reference implementation used by the node and
//! by the miner's tests.

pub mod ledger;
pub mod memory;

// Re-export commonly used types
pub use ledger::{
    BlockInfo, Ledger, LedgerError, PushOutcome, SpeculativeSession, TipInfo, UserInfo,
    VerifyStatus,
};
pub use memory::{InMemoryLedger, LedgerConfig};
