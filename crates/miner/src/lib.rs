//! Mining master orchestration for permchain.
//!
//! This crate is the heart of the node. It reconciles four concurrent event
//! sources against one logical resource, the current chain tip and its
//! pending transaction set:
//! - client transaction submissions
//! - peer-forwarded transactions
//! - peer-forwarded blocks
//! - proof-of-work solutions reported by the worker pool
//!
//! The [`MinerMaster`] decides when the candidate block template must be
//! rebuilt, rebuilds it through a speculative ledger session, and republishes
//! it to the workers; on a solved nonce it declares the block and broadcasts
//! it to peers.

pub mod master;
pub mod template;
pub mod worker;

// Re-export commonly used types
pub use master::{new_miner_master, HonestMaster, MinerConfig, MinerError, MinerMaster};
pub use template::{Template, TemplateError};
pub use worker::{SimpleWorker, WorkerHandle};
