//! Core wire types and hashing for permchain.
//!
//! This crate provides the fundamental types shared by every node component:
//! - Blake3 hashing and the proof-of-work predicate
//! - Transactions (the opaque unit of work moved between nodes)
//! - Blocks and their JSON wire form, including the nonce sentinel used to
//!   split a candidate block into a minable prefix/suffix template

pub mod block;
pub mod hash;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{Block, WireError, GENESIS_HASH, NONCE_SENTINEL};
pub use hash::{hash, meets_difficulty, Hash, H256};
pub use transaction::Transaction;
