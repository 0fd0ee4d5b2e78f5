//! Peer broadcast client for permchain.
//!
//! Pushes transactions and blocks to every peer in the roster with bounded
//! parallelism, per-call timeouts, and a fixed retry budget. Each push hands
//! back a one-shot [`PushHandle`] the caller may wait on or simply drop.

pub mod broadcast;
pub mod future;
pub mod http;

// Re-export commonly used types
pub use broadcast::{Broadcaster, P2pConfig, PeerTransport};
pub use future::{push_pair, PushHandle, PushSignal};
pub use http::HttpTransport;
