//! HTTP peer transport.
//!
//! Posts to the same RPC routes the server exposes for peer intake, so any
//! permchain node can be a peer.

use crate::broadcast::PeerTransport;
use permchain_core::Transaction;
use std::time::Duration;
use tracing::debug;

/// Blocking HTTP client with the configured per-call timeout.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    fn post_ok(&self, url: &str, body: serde_json::Value) -> bool {
        match self.client.post(url).json(&body).send() {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                debug!(url, %err, "peer push attempt failed");
                false
            }
        }
    }
}

impl PeerTransport for HttpTransport {
    fn push_transaction(&self, peer: &str, tx: &Transaction) -> bool {
        let body = match serde_json::to_value(tx) {
            Ok(v) => v,
            Err(_) => return false,
        };
        self.post_ok(&format!("http://{peer}/transactions"), body)
    }

    fn push_block(&self, peer: &str, wire: &str) -> bool {
        self.post_ok(
            &format!("http://{peer}/blocks"),
            serde_json::json!({ "json": wire }),
        )
    }
}
