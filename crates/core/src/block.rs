//! Block structure and its JSON wire form.
//!
//! Blocks travel between nodes, and between master and workers, as JSON text.
//! A candidate block carries the nonce sentinel, which lets the miner split
//! the serialized form into a prefix/suffix template so workers can try nonce
//! values by plain string concatenation.

use crate::hash::{hash, Hash};
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder nonce in a freshly built candidate block. Real nonces are
/// always 8 decimal digits, so substituting one keeps the wire length stable.
pub const NONCE_SENTINEL: &str = "00000000";

/// Hash of the (implicit) genesis tip, as it appears on the wire.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Errors from wire encoding/decoding.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed block json: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// A block: an ordered run of transactions plus chain-linking header fields.
///
/// Field order matters: serde serializes struct fields in declaration order,
/// and the template split relies on `nonce` being the trailing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Monotonically increasing id; child = parent + 1, genesis tip is 0.
    pub block_id: u64,
    /// Hex hash of the parent block.
    pub prev_hash: String,
    /// Transactions included in this block, in acceptance order.
    pub transactions: Vec<Transaction>,
    /// Identity of the node that mined (or is mining) this block.
    pub miner_id: String,
    /// Proof-of-work solution; `NONCE_SENTINEL` while still a candidate.
    pub nonce: String,
}

impl Block {
    /// Build a candidate block awaiting a proof-of-work nonce.
    pub fn candidate(
        block_id: u64,
        prev_hash: impl Into<String>,
        transactions: Vec<Transaction>,
        miner_id: impl Into<String>,
    ) -> Self {
        Self {
            block_id,
            prev_hash: prev_hash.into(),
            transactions,
            miner_id: miner_id.into(),
            nonce: NONCE_SENTINEL.to_string(),
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_wire(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from the JSON wire form.
    pub fn from_wire(wire: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(wire)?)
    }

    /// Block hash: blake3 over the wire bytes.
    ///
    /// The proof-of-work predicate is evaluated over exactly this hash, so a
    /// worker can compute it from the assembled template string alone.
    pub fn wire_hash(wire: &str) -> Hash {
        hash(wire.as_bytes())
    }

    /// Whether this block still carries the sentinel nonce.
    pub fn is_candidate(&self) -> bool {
        self.nonce == NONCE_SENTINEL
    }
}
