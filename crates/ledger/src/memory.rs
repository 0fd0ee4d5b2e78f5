//! In-memory reference ledger.
//!
//! Good enough for a single-process node and for exercising the mining
//! master; persistence is deliberately absent.

use crate::ledger::{
    BlockInfo, Ledger, LedgerError, PushOutcome, SpeculativeSession, TipInfo, UserInfo,
    VerifyStatus,
};
use permchain_core::{meets_difficulty, Block, Transaction, GENESIS_HASH, NONCE_SENTINEL};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info};

/// Ledger tuning, immutable after construction.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Balance reported for accounts that were never part of a transfer.
    pub default_balance: u64,
    /// Leading zero bits a block hash must carry to be declared.
    pub pow_difficulty_bits: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_balance: 1000,
            pow_difficulty_bits: 16,
        }
    }
}

/// Everything the ledger owns, behind one lock.
struct State {
    /// Committed balances only; pending transfers are not applied here.
    accounts: HashMap<String, u64>,
    /// Pending pool, in acceptance order.
    pending: Vec<Transaction>,
    /// Every uuid ever accepted (pending or committed), for replay detection.
    seen: HashSet<String>,
    /// uuid -> hash of the containing block.
    committed: HashMap<String, String>,
    /// Declared chain, oldest first. The wire form is kept verbatim so the
    /// block hash stays reproducible from what we hand back out.
    chain: Vec<BlockInfo>,
}

impl State {
    fn tip(&self) -> TipInfo {
        match self.chain.last() {
            Some(info) => TipInfo {
                height: info.block.block_id,
                hash: info.hash.clone(),
            },
            None => TipInfo {
                height: 0,
                hash: GENESIS_HASH.to_string(),
            },
        }
    }

    fn balance(&self, id: &str, default_balance: u64) -> u64 {
        self.accounts.get(id).copied().unwrap_or(default_balance)
    }

    /// Sum of pending debits for an account, so a sender cannot queue more
    /// transfers than it can cover.
    fn pending_debits(&self, id: &str) -> u64 {
        self.pending
            .iter()
            .filter(|tx| tx.from == id)
            .map(|tx| tx.total_cost())
            .sum()
    }
}

/// How a parsed block relates to the current tip.
enum Extension {
    /// Valid direct extension.
    Extends,
    /// At or behind the tip; nothing to do.
    Behind,
}

/// The in-memory chain-state authority.
pub struct InMemoryLedger {
    config: LedgerConfig,
    state: RwLock<State>,
}

impl InMemoryLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(State {
                accounts: HashMap::new(),
                pending: Vec::new(),
                seen: HashSet::new(),
                committed: HashMap::new(),
                chain: Vec::new(),
            }),
        }
    }

    /// Validate a block against the current tip. Transactions must apply as
    /// a unit on top of committed balances.
    fn validate_extension(
        &self,
        state: &State,
        block: &Block,
        wire: &str,
    ) -> Result<Extension, LedgerError> {
        let tip = state.tip();

        if block.block_id <= tip.height {
            return Ok(Extension::Behind);
        }
        if block.block_id > tip.height + 1 {
            return Err(LedgerError::UnknownParent {
                got: block.block_id,
                tip: tip.height,
            });
        }
        if block.prev_hash != tip.hash {
            return Err(LedgerError::StaleTip {
                got: block.block_id,
                got_prev: block.prev_hash.clone(),
                tip_hash: tip.hash,
            });
        }

        if block.nonce.len() != NONCE_SENTINEL.len()
            || !block.nonce.bytes().all(|b| b.is_ascii_digit())
            || block.is_candidate()
        {
            return Err(LedgerError::BadNonce);
        }
        if !meets_difficulty(&Block::wire_hash(wire), self.config.pow_difficulty_bits) {
            return Err(LedgerError::BadProofOfWork);
        }

        // Replay the transactions on a scratch view of committed state.
        let mut balances: HashMap<&str, u64> = HashMap::new();
        let mut uuids: HashSet<&str> = HashSet::new();
        for tx in &block.transactions {
            if !tx.is_well_formed()
                || state.committed.contains_key(&tx.uuid)
                || !uuids.insert(&tx.uuid)
            {
                return Err(LedgerError::InvalidTransactions);
            }
            let from = balances
                .entry(&tx.from)
                .or_insert_with(|| state.balance(&tx.from, self.config.default_balance));
            if *from < tx.total_cost() {
                return Err(LedgerError::InvalidTransactions);
            }
            *from -= tx.total_cost();
            let to = balances
                .entry(&tx.to)
                .or_insert_with(|| state.balance(&tx.to, self.config.default_balance));
            *to += tx.credited();
        }

        Ok(Extension::Extends)
    }

    /// Append a validated block: apply balances, retire its transactions
    /// from the pending pool, advance the tip.
    fn commit(&self, state: &mut State, block: Block, wire: String) -> BlockInfo {
        let hash = Block::wire_hash(&wire).to_hex();

        for tx in &block.transactions {
            let debit = state.balance(&tx.from, self.config.default_balance) - tx.total_cost();
            state.accounts.insert(tx.from.clone(), debit);
            let credit = state.balance(&tx.to, self.config.default_balance) + tx.credited();
            state.accounts.insert(tx.to.clone(), credit);

            state.seen.insert(tx.uuid.clone());
            state.committed.insert(tx.uuid.clone(), hash.clone());
        }

        let included: HashSet<&str> = block.transactions.iter().map(|tx| tx.uuid.as_str()).collect();
        state.pending.retain(|tx| !included.contains(tx.uuid.as_str()));

        info!(
            block_id = block.block_id,
            hash = %hash,
            txs = block.transactions.len(),
            "block committed"
        );

        let info = BlockInfo { block, hash, wire };
        state.chain.push(info.clone());
        info
    }
}

impl Ledger for InMemoryLedger {
    fn get_user_info(&self, id: &str) -> UserInfo {
        let state = self.state.read().expect("ledger lock poisoned");
        UserInfo {
            id: id.to_string(),
            balance: state.balance(id, self.config.default_balance),
        }
    }

    fn latest_block(&self) -> TipInfo {
        self.state.read().expect("ledger lock poisoned").tip()
    }

    fn get_block(&self, hash: &str) -> Option<BlockInfo> {
        let state = self.state.read().expect("ledger lock poisoned");
        state.chain.iter().find(|info| info.hash == hash).cloned()
    }

    fn verify_transaction(&self, tx: &Transaction) -> (VerifyStatus, String) {
        let state = self.state.read().expect("ledger lock poisoned");
        if let Some(hash) = state.committed.get(&tx.uuid) {
            return (VerifyStatus::Committed, hash.clone());
        }
        if state.pending.iter().any(|p| p.uuid == tx.uuid) {
            return (VerifyStatus::Pending, String::new());
        }
        (VerifyStatus::Unknown, String::new())
    }

    fn push_transaction(&self, tx: Transaction, client_origin: bool) -> PushOutcome {
        let mut state = self.state.write().expect("ledger lock poisoned");

        if !tx.is_well_formed() || state.seen.contains(&tx.uuid) {
            debug!(uuid = %tx.uuid, client_origin, "transaction rejected");
            return PushOutcome::Rejected;
        }

        let available = state
            .balance(&tx.from, self.config.default_balance)
            .saturating_sub(state.pending_debits(&tx.from));
        if available < tx.total_cost() {
            debug!(uuid = %tx.uuid, from = %tx.from, "insufficient funds");
            return PushOutcome::InsufficientFunds;
        }

        debug!(uuid = %tx.uuid, client_origin, "transaction accepted");
        state.seen.insert(tx.uuid.clone());
        state.pending.push(tx);
        PushOutcome::Accepted
    }

    fn push_block(&self, wire: &str) -> Result<bool, LedgerError> {
        let block = Block::from_wire(wire)?;
        let mut state = self.state.write().expect("ledger lock poisoned");
        match self.validate_extension(&state, &block, wire)? {
            Extension::Behind => {
                debug!(block_id = block.block_id, "ignoring block at or behind tip");
                Ok(false)
            }
            Extension::Extends => {
                self.commit(&mut state, block, wire.to_string());
                Ok(true)
            }
        }
    }

    fn declare_block(&self, wire: &str) -> Result<BlockInfo, LedgerError> {
        let block = Block::from_wire(wire)?;
        let mut state = self.state.write().expect("ledger lock poisoned");
        match self.validate_extension(&state, &block, wire)? {
            Extension::Behind => {
                let tip = state.tip();
                Err(LedgerError::StaleTip {
                    got: block.block_id,
                    got_prev: block.prev_hash,
                    tip_hash: tip.hash,
                })
            }
            Extension::Extends => Ok(self.commit(&mut state, block, wire.to_string())),
        }
    }

    fn open_session(
        &self,
        _lock_blocks: bool,
        _lock_users: bool,
    ) -> Box<dyn SpeculativeSession + '_> {
        let state = self.state.read().expect("ledger lock poisoned");
        Box::new(SnapshotSession {
            default_balance: self.config.default_balance,
            balances: state.accounts.clone(),
            consumed: state.committed.keys().cloned().collect(),
        })
    }

    fn pending_transactions(&self) -> Vec<Transaction> {
        self.state
            .read()
            .expect("ledger lock poisoned")
            .pending
            .clone()
    }
}

/// Snapshot-based session: balances and consumed uuids are copied at open,
/// so testing never blocks or mutates the authoritative state.
struct SnapshotSession {
    default_balance: u64,
    balances: HashMap<String, u64>,
    consumed: HashSet<String>,
}

impl SpeculativeSession for SnapshotSession {
    fn test_and_apply(&mut self, tx: &Transaction) -> bool {
        if !tx.is_well_formed() || self.consumed.contains(&tx.uuid) {
            return false;
        }
        let from = self
            .balances
            .get(&tx.from)
            .copied()
            .unwrap_or(self.default_balance);
        if from < tx.total_cost() {
            return false;
        }
        self.balances.insert(tx.from.clone(), from - tx.total_cost());
        let to = self
            .balances
            .get(&tx.to)
            .copied()
            .unwrap_or(self.default_balance);
        self.balances.insert(tx.to.clone(), to + tx.credited());
        self.consumed.insert(tx.uuid.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_ledger() -> InMemoryLedger {
        // Zero difficulty so any 8-digit nonce declares.
        InMemoryLedger::new(LedgerConfig {
            default_balance: 1000,
            pow_difficulty_bits: 0,
        })
    }

    fn solved_wire(block: &Block) -> String {
        // The bare sentinel also appears inside the genesis prev_hash, so
        // target the full nonce field.
        let wire = block.to_wire().unwrap();
        let needle = format!("\"nonce\":\"{NONCE_SENTINEL}\"");
        wire.replacen(&needle, "\"nonce\":\"00000042\"", 1)
    }

    #[test]
    fn test_push_transaction_codes() {
        let ledger = open_ledger();

        let tx = Transaction::transfer("t1", "alice", "bob", 100, 5);
        assert_eq!(ledger.push_transaction(tx.clone(), true), PushOutcome::Accepted);

        // Replay.
        assert_eq!(ledger.push_transaction(tx, true), PushOutcome::Rejected);

        // Structurally invalid.
        let bad = Transaction::transfer("t2", "alice", "alice", 100, 5);
        assert_eq!(ledger.push_transaction(bad, true), PushOutcome::Rejected);

        // Default balance is 1000; t1 already reserves 100 of it.
        let broke = Transaction::transfer("t3", "alice", "bob", 950, 1);
        assert_eq!(
            ledger.push_transaction(broke, true),
            PushOutcome::InsufficientFunds
        );
    }

    #[test]
    fn test_pending_pool_keeps_acceptance_order() {
        let ledger = open_ledger();
        for i in 0..5 {
            let tx = Transaction::transfer(format!("t{i}"), "alice", "bob", 10, 1);
            assert_eq!(ledger.push_transaction(tx, false), PushOutcome::Accepted);
        }
        let pending = ledger.pending_transactions();
        let uuids: Vec<_> = pending.iter().map(|tx| tx.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["t0", "t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn test_push_block_advances_tip_and_drains_pool() {
        let ledger = open_ledger();
        let tx = Transaction::transfer("t1", "alice", "bob", 100, 5);
        ledger.push_transaction(tx.clone(), true);

        let block = Block::candidate(1, GENESIS_HASH, vec![tx], "node-1");
        let wire = solved_wire(&block);

        assert!(ledger.push_block(&wire).unwrap());
        assert_eq!(ledger.latest_block().height, 1);
        assert!(ledger.pending_transactions().is_empty());
        assert_eq!(ledger.get_user_info("alice").balance, 900);
        assert_eq!(ledger.get_user_info("bob").balance, 1095);
    }

    #[test]
    fn test_push_block_behind_tip_is_no_change() {
        let ledger = open_ledger();
        let block = Block::candidate(1, GENESIS_HASH, vec![
            Transaction::transfer("t1", "alice", "bob", 100, 5),
        ], "node-1");
        let wire = solved_wire(&block);

        assert!(ledger.push_block(&wire).unwrap());
        // Same block again: known, tip unchanged.
        assert!(!ledger.push_block(&wire).unwrap());
        assert_eq!(ledger.latest_block().height, 1);
    }

    #[test]
    fn test_push_block_skipping_ahead_is_error() {
        let ledger = open_ledger();
        let block = Block::candidate(3, GENESIS_HASH, vec![
            Transaction::transfer("t1", "alice", "bob", 100, 5),
        ], "node-1");
        let wire = solved_wire(&block);

        assert!(matches!(
            ledger.push_block(&wire),
            Err(LedgerError::UnknownParent { got: 3, tip: 0 })
        ));
    }

    #[test]
    fn test_declare_stale_block_rejected() {
        let ledger = open_ledger();
        let tx1 = Transaction::transfer("t1", "alice", "bob", 100, 5);
        let tx2 = Transaction::transfer("t2", "carol", "dave", 50, 2);
        ledger.push_transaction(tx1.clone(), true);
        ledger.push_transaction(tx2.clone(), true);

        // A peer block lands first.
        let peer = Block::candidate(1, GENESIS_HASH, vec![tx1], "peer");
        assert!(ledger.push_block(&solved_wire(&peer)).unwrap());

        // Our worker's block still references the old tip.
        let ours = Block::candidate(1, GENESIS_HASH, vec![tx2], "node-1");
        assert!(matches!(
            ledger.declare_block(&solved_wire(&ours)),
            Err(LedgerError::StaleTip { .. })
        ));
        assert_eq!(ledger.latest_block().height, 1);
    }

    #[test]
    fn test_declare_candidate_nonce_rejected() {
        let ledger = open_ledger();
        let block = Block::candidate(1, GENESIS_HASH, vec![
            Transaction::transfer("t1", "alice", "bob", 100, 5),
        ], "node-1");
        // Sentinel nonce left in place.
        let wire = block.to_wire().unwrap();
        assert!(matches!(ledger.declare_block(&wire), Err(LedgerError::BadNonce)));
    }

    #[test]
    fn test_proof_of_work_enforced() {
        let ledger = InMemoryLedger::new(LedgerConfig {
            default_balance: 1000,
            pow_difficulty_bits: 255,
        });
        let block = Block::candidate(1, GENESIS_HASH, vec![
            Transaction::transfer("t1", "alice", "bob", 100, 5),
        ], "node-1");
        assert!(matches!(
            ledger.declare_block(&solved_wire(&block)),
            Err(LedgerError::BadProofOfWork)
        ));
    }

    #[test]
    fn test_block_transactions_validate_as_unit() {
        let ledger = open_ledger();
        // Second transfer overdraws once the first is applied.
        let block = Block::candidate(1, GENESIS_HASH, vec![
            Transaction::transfer("t1", "alice", "bob", 800, 5),
            Transaction::transfer("t2", "alice", "carol", 800, 5),
        ], "node-1");
        assert!(matches!(
            ledger.push_block(&solved_wire(&block)),
            Err(LedgerError::InvalidTransactions)
        ));
    }

    #[test]
    fn test_verify_status_progression() {
        let ledger = open_ledger();
        let tx = Transaction::transfer("t1", "alice", "bob", 100, 5);

        assert_eq!(ledger.verify_transaction(&tx).0, VerifyStatus::Unknown);

        ledger.push_transaction(tx.clone(), true);
        assert_eq!(ledger.verify_transaction(&tx).0, VerifyStatus::Pending);

        let block = Block::candidate(1, GENESIS_HASH, vec![tx.clone()], "node-1");
        let wire = solved_wire(&block);
        ledger.push_block(&wire).unwrap();

        let (status, hash) = ledger.verify_transaction(&tx);
        assert_eq!(status, VerifyStatus::Committed);
        assert_eq!(hash, Block::wire_hash(&wire).to_hex());
    }

    #[test]
    fn test_session_is_isolated_from_pool() {
        let ledger = open_ledger();
        let tx = Transaction::transfer("t1", "alice", "bob", 100, 5);
        ledger.push_transaction(tx.clone(), true);

        {
            let mut session = ledger.open_session(true, true);
            assert!(session.test_and_apply(&tx));
        }

        // The authoritative pool and balances are untouched.
        assert_eq!(ledger.pending_transactions().len(), 1);
        assert_eq!(ledger.get_user_info("alice").balance, 1000);
    }

    #[test]
    fn test_session_rejects_double_spend_within_itself() {
        let ledger = open_ledger();
        let tx1 = Transaction::transfer("t1", "alice", "bob", 800, 5);
        let tx2 = Transaction::transfer("t2", "alice", "carol", 800, 5);

        let mut session = ledger.open_session(true, true);
        assert!(session.test_and_apply(&tx1));
        assert!(!session.test_and_apply(&tx2));
        // Same uuid twice is also refused.
        assert!(!session.test_and_apply(&tx1));
    }

    #[test]
    fn test_session_rejects_committed_transaction() {
        let ledger = open_ledger();
        let tx = Transaction::transfer("t1", "alice", "bob", 100, 5);
        ledger.push_transaction(tx.clone(), true);
        let block = Block::candidate(1, GENESIS_HASH, vec![tx.clone()], "node-1");
        ledger.push_block(&solved_wire(&block)).unwrap();

        let mut session = ledger.open_session(true, true);
        assert!(!session.test_and_apply(&tx));
    }

    #[test]
    fn test_get_block_by_hash() {
        let ledger = open_ledger();
        let tx = Transaction::transfer("t1", "alice", "bob", 100, 5);
        ledger.push_transaction(tx.clone(), true);
        let block = Block::candidate(1, GENESIS_HASH, vec![tx], "node-1");
        let wire = solved_wire(&block);
        ledger.push_block(&wire).unwrap();

        let hash = Block::wire_hash(&wire).to_hex();
        let info = ledger.get_block(&hash).unwrap();
        assert_eq!(info.block.block_id, 1);
        // The stored wire is the exact bytes the hash was computed over.
        assert_eq!(info.wire, wire);
        assert!(ledger.get_block("deadbeef").is_none());
    }
}
