//! Proposed transactions and the per-wallet ledger
//!
//! A transaction is created pending, collects owner approvals, and is
//! executed at most once.

use crate::core::Address;
use crate::multisig::owners::{Capability, OwnerRegistry};
use crate::multisig::wallet::MultisigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transaction sequence number, unique within a wallet
pub type TxId = u64;

/// Lifecycle state of a transaction
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxState {
    /// Collecting approvals
    Pending,
    /// Effect applied (terminal)
    Executed,
}

/// A single owner's approval
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Approval {
    /// Approving owner
    pub owner: Address,
    /// When the approval was recorded
    pub approved_at: DateTime<Utc>,
}

/// Parameters of a transaction to submit
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionRequest {
    pub to: Address,
    pub amount: u128,
    pub quorum: usize,
    pub data: Vec<u8>,
    /// Asset symbol; `None` means the wallet's native asset
    pub symbol: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
}

impl TransactionRequest {
    /// Start a request moving `amount` to `to` once `quorum` owners approve
    pub fn new(to: impl Into<Address>, amount: u128, quorum: usize) -> Self {
        Self {
            to: to.into(),
            amount,
            quorum,
            data: Vec::new(),
            symbol: None,
            end_date: None,
        }
    }

    /// Attach opaque call data
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    /// Move a non-native asset
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Reject approvals and execution after `end_date`
    pub fn expires_at(mut self, end_date: DateTime<Utc>) -> Self {
        self.end_date = Some(end_date);
        self
    }
}

/// A transaction stored in a wallet's ledger
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: TxId,
    /// Owner that proposed the transaction
    pub submitter: Address,
    pub to: Address,
    pub symbol: String,
    pub amount: u128,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    /// Quorum captured at submission
    pub quorum_required: usize,
    pub approvals: Vec<Approval>,
    pub state: TxState,
    pub end_date: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub executed_by: Option<Address>,
}

impl Transaction {
    /// Number of distinct owners currently approving
    pub fn approval_count(&self) -> usize {
        self.approvals.len()
    }

    pub fn has_approved(&self, owner: &Address) -> bool {
        self.approvals.iter().any(|a| &a.owner == owner)
    }

    /// Owners that currently approve, in approval order
    pub fn approvers(&self) -> Vec<&Address> {
        self.approvals.iter().map(|a| &a.owner).collect()
    }

    pub fn is_pending(&self) -> bool {
        self.state == TxState::Pending
    }

    pub fn is_executed(&self) -> bool {
        self.state == TxState::Executed
    }

    /// A call at `now` is late once `now` passes the deadline
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_date.map_or(false, |end| now > end)
    }

    pub fn quorum_met(&self) -> bool {
        self.approvals.len() >= self.quorum_required
    }

    /// Fail unless the transaction is still pending
    pub fn ensure_pending(&self) -> Result<(), MultisigError> {
        if self.is_executed() {
            return Err(MultisigError::AlreadyExecuted(self.id));
        }
        Ok(())
    }

    /// Fail if the deadline has passed at `now`
    pub fn ensure_not_expired(&self, now: DateTime<Utc>) -> Result<(), MultisigError> {
        match self.end_date {
            Some(end_date) if now > end_date => Err(MultisigError::Expired {
                id: self.id,
                end_date,
            }),
            _ => Ok(()),
        }
    }
}

/// Ordered store of a wallet's transactions, indexed by id
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TransactionLedger {
    transactions: Vec<Transaction>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self {
            transactions: Vec::new(),
        }
    }

    /// Id the next submission will receive
    pub fn next_id(&self) -> TxId {
        self.transactions.len() as TxId
    }

    /// Store a new pending transaction and return its id
    ///
    /// The request must already be validated against the owner registry.
    pub(crate) fn append(
        &mut self,
        submitter: &Address,
        request: TransactionRequest,
        symbol: String,
        now: DateTime<Utc>,
    ) -> TxId {
        let id = self.next_id();
        self.transactions.push(Transaction {
            id,
            submitter: submitter.clone(),
            to: request.to,
            symbol,
            amount: request.amount,
            data: request.data,
            quorum_required: request.quorum,
            approvals: Vec::new(),
            state: TxState::Pending,
            end_date: request.end_date,
            submitted_at: now,
            executed_at: None,
            executed_by: None,
        });
        id
    }

    pub fn get(&self, id: TxId) -> Result<&Transaction, MultisigError> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.transactions.get(index))
            .ok_or(MultisigError::UnknownTransaction(id))
    }

    fn get_mut(&mut self, id: TxId) -> Result<&mut Transaction, MultisigError> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.transactions.get_mut(index))
            .ok_or(MultisigError::UnknownTransaction(id))
    }

    /// Record an approval from `owner`
    ///
    /// Owner membership is checked by the caller; this enforces the
    /// per-transaction rules (pending, not expired, no double approval).
    pub(crate) fn approve(
        &mut self,
        id: TxId,
        owner: &Address,
        now: DateTime<Utc>,
    ) -> Result<&Transaction, MultisigError> {
        let tx = self.get_mut(id)?;
        tx.ensure_pending()?;
        tx.ensure_not_expired(now)?;

        if tx.has_approved(owner) {
            return Err(MultisigError::AlreadyApproved {
                id,
                owner: owner.clone(),
            });
        }

        tx.approvals.push(Approval {
            owner: owner.clone(),
            approved_at: now,
        });
        Ok(tx)
    }

    /// Withdraw `owner`'s approval
    pub(crate) fn revoke(&mut self, id: TxId, owner: &Address) -> Result<&Transaction, MultisigError> {
        let tx = self.get_mut(id)?;
        tx.ensure_pending()?;

        let position = tx
            .approvals
            .iter()
            .position(|a| &a.owner == owner)
            .ok_or_else(|| MultisigError::NotApproved {
                id,
                owner: owner.clone(),
            })?;

        tx.approvals.remove(position);
        Ok(tx)
    }

    /// Move a transaction to its terminal state
    ///
    /// Only called once every execution precondition has passed.
    pub(crate) fn mark_executed(
        &mut self,
        id: TxId,
        executor: &Address,
        now: DateTime<Utc>,
    ) -> Result<&Transaction, MultisigError> {
        let tx = self.get_mut(id)?;
        tx.ensure_pending()?;
        tx.state = TxState::Executed;
        tx.executed_at = Some(now);
        tx.executed_by = Some(executor.clone());
        Ok(tx)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// All transactions in id order
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter()
    }

    pub fn pending(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|tx| tx.is_pending())
    }

    /// Check a ledger that did not come through `append`/`approve`,
    /// such as one read back from a snapshot
    ///
    /// Ids must match positions, every quorum must fit the owner set, and
    /// approvals must come from distinct owners.
    pub fn verify(&self, owners: &OwnerRegistry) -> Result<(), MultisigError> {
        for (index, tx) in self.transactions.iter().enumerate() {
            if tx.id != index as TxId {
                return Err(MultisigError::InconsistentState(format!(
                    "transaction at position {} has id {}",
                    index, tx.id
                )));
            }
            owners.validate_quorum(tx.quorum_required)?;

            let mut seen: Vec<&Address> = Vec::with_capacity(tx.approvals.len());
            for approval in &tx.approvals {
                owners.authorize(&approval.owner, Capability::Owner)?;
                if seen.contains(&&approval.owner) {
                    return Err(MultisigError::AlreadyApproved {
                        id: tx.id,
                        owner: approval.owner.clone(),
                    });
                }
                seen.push(&approval.owner);
            }

            if tx.is_executed() != tx.executed_by.is_some() {
                return Err(MultisigError::InconsistentState(format!(
                    "transaction {} has state {:?} but executed_by {:?}",
                    tx.id, tx.state, tx.executed_by
                )));
            }
        }
        Ok(())
    }
}

/// Serialize payload bytes as a hex string
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
