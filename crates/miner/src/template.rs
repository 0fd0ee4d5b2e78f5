//! Candidate block template.
//!
//! A candidate block is serialized once, then split around the nonce
//! sentinel. Workers try nonce values by concatenating
//! `prefix + nonce + suffix`, never reserializing the block.

use permchain_core::NONCE_SENTINEL;
use thiserror::Error;

/// The split failed, meaning the serialized block broke the sentinel
/// invariant. Callers log this and abandon the rebuild; it never crashes
/// the node.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("nonce sentinel occurs {0} times in serialized block, expected exactly once")]
    SentinelCount(usize),
}

/// A serialized candidate block with the nonce value cut out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// Wire bytes up to and including the opening quote of the nonce value.
    pub prefix: String,
    /// Wire bytes from the closing quote of the nonce value onward.
    pub suffix: String,
}

impl Template {
    /// Split a serialized candidate at its sentinel nonce.
    ///
    /// The sentinel digits alone are not unique (the genesis prev_hash is
    /// all zeros), so the full `"nonce":"..."` field is matched.
    pub fn split(wire: &str) -> Result<Self, TemplateError> {
        let needle = format!("\"nonce\":\"{NONCE_SENTINEL}\"");
        let count = wire.matches(&needle).count();
        if count != 1 {
            return Err(TemplateError::SentinelCount(count));
        }
        let at = wire.find(&needle).expect("count checked above");
        let value_start = at + needle.len() - NONCE_SENTINEL.len() - 1;
        Ok(Self {
            prefix: wire[..value_start].to_string(),
            suffix: wire[at + needle.len() - 1..].to_string(),
        })
    }

    /// Substitute a nonce into the template.
    pub fn assemble(&self, nonce: &str) -> String {
        let mut wire = String::with_capacity(self.prefix.len() + nonce.len() + self.suffix.len());
        wire.push_str(&self.prefix);
        wire.push_str(nonce);
        wire.push_str(&self.suffix);
        wire
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permchain_core::{Block, Transaction, GENESIS_HASH};

    fn candidate() -> Block {
        Block::candidate(
            1,
            GENESIS_HASH,
            vec![Transaction::transfer("t1", "alice", "bob", 100, 5)],
            "node-1",
        )
    }

    #[test]
    fn test_split_and_assemble_roundtrip() {
        let wire = candidate().to_wire().unwrap();
        let template = Template::split(&wire).unwrap();

        // Substituting the sentinel back reproduces the original bytes.
        assert_eq!(template.assemble(NONCE_SENTINEL), wire);
    }

    #[test]
    fn test_assembled_block_differs_only_in_nonce() {
        let block = candidate();
        let wire = block.to_wire().unwrap();
        let template = Template::split(&wire).unwrap();

        let assembled = template.assemble("12345678");
        let reparsed = Block::from_wire(&assembled).unwrap();

        assert_eq!(reparsed.nonce, "12345678");
        assert_eq!(reparsed.block_id, block.block_id);
        assert_eq!(reparsed.prev_hash, block.prev_hash);
        assert_eq!(reparsed.transactions, block.transactions);
        assert_eq!(reparsed.miner_id, block.miner_id);
    }

    #[test]
    fn test_genesis_prev_hash_does_not_confuse_split() {
        // prev_hash is 64 zeros here; the split must still find the nonce.
        let wire = candidate().to_wire().unwrap();
        let template = Template::split(&wire).unwrap();
        assert!(template.prefix.contains(GENESIS_HASH));
        assert!(template.prefix.ends_with("\"nonce\":\""));
        assert!(template.suffix.starts_with('"'));
    }

    #[test]
    fn test_missing_sentinel_rejected() {
        let mut block = candidate();
        block.nonce = "12345678".to_string();
        let wire = block.to_wire().unwrap();

        assert!(matches!(
            Template::split(&wire),
            Err(TemplateError::SentinelCount(0))
        ));
    }

    #[test]
    fn test_duplicated_sentinel_rejected() {
        let wire = candidate().to_wire().unwrap();
        let needle = format!("\"nonce\":\"{NONCE_SENTINEL}\"");
        let doubled = format!("{wire}{}", needle);

        assert!(matches!(
            Template::split(&doubled),
            Err(TemplateError::SentinelCount(2))
        ));
    }
}
