//! Transaction wire type.
//!
//! Transactions are externally validated: this crate only carries them and
//! checks structural well-formedness. Balance and replay checks belong to the
//! ledger.

use serde::{Deserialize, Serialize};

/// A transfer between two accounts in the permissioned network.
///
/// `value` is the total amount debited from the sender; the recipient is
/// credited `value - fee`. The `uuid` is the transaction's stable identity
/// and is assigned by the submitting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identity, used for replay detection.
    pub uuid: String,
    /// Sender account id.
    pub from: String,
    /// Recipient account id.
    pub to: String,
    /// Total amount debited from the sender.
    pub value: u64,
    /// Mining fee, taken out of `value`.
    pub fee: u64,
}

impl Transaction {
    /// Create a transfer transaction.
    pub fn transfer(
        uuid: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        value: u64,
        fee: u64,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            from: from.into(),
            to: to.into(),
            value,
            fee,
        }
    }

    /// Total cost to the sender.
    pub fn total_cost(&self) -> u64 {
        self.value
    }

    /// Amount credited to the recipient.
    pub fn credited(&self) -> u64 {
        self.value.saturating_sub(self.fee)
    }

    /// Structural validity: non-empty ids, distinct endpoints, and a value
    /// that actually moves something after the fee.
    pub fn is_well_formed(&self) -> bool {
        !self.uuid.is_empty()
            && !self.from.is_empty()
            && !self.to.is_empty()
            && self.from != self.to
            && self.value > self.fee
    }
}
