//! Quorum wallet engine
//!
//! Drives the submit → approve/revoke → execute state machine over an owner
//! registry, a transaction ledger and per-asset balances.
//!
//! Every mutating call checks all of its preconditions before touching any
//! state, so a failed call leaves the wallet exactly as it was. Calls are
//! expected to be serialized by the host (`&mut self`); the engine has no
//! internal locking and never reads the clock, callers pass `now`.

use crate::core::Address;
use crate::multisig::effects::{EffectError, EffectHandler, ExecutionReceipt, LedgerTransfer};
use crate::multisig::events::{EventLog, EventRecord, WalletEvent};
use crate::multisig::owners::{Capability, OwnerRegistry};
use crate::multisig::transaction::{Transaction, TransactionLedger, TransactionRequest, TxId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Symbol used when a transaction does not name an asset
pub const DEFAULT_NATIVE_SYMBOL: &str = "ETH";

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Not authorized: {0} is not an owner")]
    NotAuthorized(Address),
    #[error("Transaction not found: {0}")]
    UnknownTransaction(TxId),
    #[error("Invalid quorum: {quorum} is outside 1..={owners}")]
    InvalidQuorum { quorum: usize, owners: usize },
    #[error("Transaction {id} already approved by {owner}")]
    AlreadyApproved { id: TxId, owner: Address },
    #[error("Transaction {id} has no approval from {owner}")]
    NotApproved { id: TxId, owner: Address },
    #[error("Transaction already executed: {0}")]
    AlreadyExecuted(TxId),
    #[error("Quorum not met for transaction {id}: have {have}, need {need}")]
    QuorumNotMet { id: TxId, have: usize, need: usize },
    #[error("Insufficient {symbol} balance: have {have}, need {need}")]
    InsufficientBalance {
        symbol: String,
        have: u128,
        need: u128,
    },
    #[error("Transaction {id} expired at {end_date}")]
    Expired { id: TxId, end_date: DateTime<Utc> },
    #[error("Invalid end date {end_date}: must be after {now}")]
    InvalidEndDate {
        end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("Owner list must not be empty")]
    EmptyOwnerSet,
    #[error("Duplicate owner: {0}")]
    DuplicateOwner(Address),
    #[error("{symbol} balance overflow")]
    BalanceOverflow { symbol: String },
    #[error("Execution effect failed: {0}")]
    EffectFailed(#[from] EffectError),
    #[error("Wallet not found: {0}")]
    WalletNotFound(Address),
    #[error("Inconsistent wallet state: {0}")]
    InconsistentState(String),
}

impl MultisigError {
    /// Whether the same call may succeed later without changing its input
    ///
    /// `QuorumNotMet` clears once more owners approve, `InsufficientBalance`
    /// once funds arrive, `EffectFailed` whenever the handler accepts.
    /// Everything else is final for that input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MultisigError::QuorumNotMet { .. }
                | MultisigError::InsufficientBalance { .. }
                | MultisigError::EffectFailed(_)
        )
    }
}

/// Per-wallet policy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WalletConfig {
    /// Asset moved when a request names no symbol
    pub native_symbol: String,
    /// Count the submitter as the first approval
    pub auto_approve_submitter: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            native_symbol: DEFAULT_NATIVE_SYMBOL.to_string(),
            auto_approve_submitter: false,
        }
    }
}

/// A quorum multi-signature wallet
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultisigWallet {
    /// Wallet address assigned by the factory
    address: Address,
    /// Human-readable label (not unique)
    label: String,
    /// Identity that asked the factory for this wallet
    created_by: Address,
    created_at: DateTime<Utc>,
    config: WalletConfig,
    owners: OwnerRegistry,
    ledger: TransactionLedger,
    balances: BTreeMap<String, u128>,
    events: EventLog,
}

impl MultisigWallet {
    /// Create a wallet with a fixed owner set
    ///
    /// # Errors
    /// Returns error if `owners` is empty or contains duplicates
    pub fn new(
        address: Address,
        label: impl Into<String>,
        created_by: Address,
        owners: Vec<Address>,
        config: WalletConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, MultisigError> {
        let owners = OwnerRegistry::new(owners)?;

        Ok(Self {
            address,
            label: label.into(),
            created_by,
            created_at: now,
            config,
            owners,
            ledger: TransactionLedger::new(),
            balances: BTreeMap::new(),
            events: EventLog::new(),
        })
    }

    // =========================================================================
    // Mutating operations
    // =========================================================================

    /// Propose a transaction; returns its id
    pub fn submit(
        &mut self,
        caller: &Address,
        request: TransactionRequest,
        now: DateTime<Utc>,
    ) -> Result<TxId, MultisigError> {
        self.check_submit(caller, &request, now)
            .map_err(|e| self.rejected("submit", caller, e))?;

        let symbol = request
            .symbol
            .clone()
            .unwrap_or_else(|| self.config.native_symbol.clone());
        let id = self.ledger.append(caller, request, symbol, now);
        let tx = self.ledger.get(id)?;

        log::info!(
            "wallet {}: tx {} submitted by {} ({} {} to {}, quorum {})",
            self.address,
            id,
            caller,
            tx.amount,
            tx.symbol,
            tx.to,
            tx.quorum_required
        );

        let event = WalletEvent::SubmitTransaction {
            id,
            symbol: tx.symbol.clone(),
            to: tx.to.clone(),
            amount: tx.amount,
            data: hex::encode(&tx.data),
            end_date: tx.end_date,
        };
        self.events.emit(event, now);

        if self.config.auto_approve_submitter {
            // Fresh, unexpired and unapproved, so this cannot fail
            self.ledger.approve(id, caller, now)?;
            self.events.emit(
                WalletEvent::ApproveTransaction {
                    id,
                    from: caller.clone(),
                },
                now,
            );
        }

        Ok(id)
    }

    /// Record the caller's approval of transaction `id`
    pub fn approve(
        &mut self,
        caller: &Address,
        id: TxId,
        now: DateTime<Utc>,
    ) -> Result<(), MultisigError> {
        if let Err(e) = self.owners.authorize(caller, Capability::Owner) {
            return Err(self.rejected("approve", caller, e));
        }

        let result = self
            .ledger
            .approve(id, caller, now)
            .map(|tx| tx.approval_count());
        let count = match result {
            Ok(count) => count,
            Err(e) => return Err(self.rejected("approve", caller, e)),
        };

        log::info!(
            "wallet {}: tx {} approved by {} ({} approvals)",
            self.address,
            id,
            caller,
            count
        );
        self.events.emit(
            WalletEvent::ApproveTransaction {
                id,
                from: caller.clone(),
            },
            now,
        );
        Ok(())
    }

    /// Withdraw the caller's approval of transaction `id`
    pub fn revoke(
        &mut self,
        caller: &Address,
        id: TxId,
        now: DateTime<Utc>,
    ) -> Result<(), MultisigError> {
        if let Err(e) = self.owners.authorize(caller, Capability::Owner) {
            return Err(self.rejected("revoke", caller, e));
        }

        let result = self.ledger.revoke(id, caller).map(|tx| tx.approval_count());
        let count = match result {
            Ok(count) => count,
            Err(e) => return Err(self.rejected("revoke", caller, e)),
        };

        log::info!(
            "wallet {}: tx {} approval revoked by {} ({} approvals)",
            self.address,
            id,
            caller,
            count
        );
        self.events.emit(
            WalletEvent::RevokeApproval {
                id,
                from: caller.clone(),
            },
            now,
        );
        Ok(())
    }

    /// Execute transaction `id` with no external effect
    ///
    /// Any identity may call this once quorum is met.
    pub fn execute(
        &mut self,
        caller: &Address,
        id: TxId,
        now: DateTime<Utc>,
    ) -> Result<ExecutionReceipt, MultisigError> {
        self.execute_with(caller, id, now, &mut LedgerTransfer)
    }

    /// Execute transaction `id`, applying the external effect through `effects`
    ///
    /// If the handler refuses, the call fails with `EffectFailed` and neither
    /// the balance nor the transaction state changes.
    pub fn execute_with(
        &mut self,
        caller: &Address,
        id: TxId,
        now: DateTime<Utc>,
        effects: &mut dyn EffectHandler,
    ) -> Result<ExecutionReceipt, MultisigError> {
        let receipt = match self.prepare_execution(caller, id, now) {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.rejected("execute", caller, e)),
        };

        if let Err(e) = effects.apply(&receipt) {
            return Err(self.rejected("execute", caller, e.into()));
        }

        self.ledger.mark_executed(id, caller, now)?;
        // Preconditions guarantee the balance covers the amount
        if let Some(balance) = self.balances.get_mut(&receipt.symbol) {
            *balance -= receipt.amount;
        }

        log::info!(
            "wallet {}: tx {} executed by {} ({} {} to {})",
            self.address,
            id,
            caller,
            receipt.amount,
            receipt.symbol,
            receipt.to
        );
        self.events.emit(
            WalletEvent::ExecuteTransaction {
                id,
                from: caller.clone(),
            },
            now,
        );
        Ok(receipt)
    }

    /// Credit externally arriving value; returns the new balance
    pub fn deposit(
        &mut self,
        symbol: &str,
        amount: u128,
        now: DateTime<Utc>,
    ) -> Result<u128, MultisigError> {
        let current = self.balance(symbol);
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| MultisigError::BalanceOverflow {
                symbol: symbol.to_string(),
            })?;

        self.balances.insert(symbol.to_string(), updated);
        log::info!(
            "wallet {}: deposit of {} {} (balance {})",
            self.address,
            amount,
            symbol,
            updated
        );
        self.events.emit(
            WalletEvent::Deposit {
                symbol: symbol.to_string(),
                amount,
            },
            now,
        );
        Ok(updated)
    }

    // =========================================================================
    // Precondition checks
    // =========================================================================

    fn check_submit(
        &self,
        caller: &Address,
        request: &TransactionRequest,
        now: DateTime<Utc>,
    ) -> Result<(), MultisigError> {
        self.owners.authorize(caller, Capability::Owner)?;
        self.owners.validate_quorum(request.quorum)?;

        if let Some(end_date) = request.end_date {
            if end_date <= now {
                return Err(MultisigError::InvalidEndDate { end_date, now });
            }
        }

        Ok(())
    }

    /// Check every execution precondition and build the receipt
    fn prepare_execution(
        &self,
        caller: &Address,
        id: TxId,
        now: DateTime<Utc>,
    ) -> Result<ExecutionReceipt, MultisigError> {
        self.owners.authorize(caller, Capability::Anyone)?;

        let tx = self.ledger.get(id)?;
        tx.ensure_pending()?;
        tx.ensure_not_expired(now)?;

        if !tx.quorum_met() {
            return Err(MultisigError::QuorumNotMet {
                id,
                have: tx.approval_count(),
                need: tx.quorum_required,
            });
        }

        let have = self.balance(&tx.symbol);
        if tx.amount > have {
            return Err(MultisigError::InsufficientBalance {
                symbol: tx.symbol.clone(),
                have,
                need: tx.amount,
            });
        }

        Ok(ExecutionReceipt::new(&self.address, tx, caller, now))
    }

    fn rejected(&self, operation: &str, caller: &Address, err: MultisigError) -> MultisigError {
        log::debug!(
            "wallet {}: {} by {} rejected: {}",
            self.address,
            operation,
            caller,
            err
        );
        err
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Get the wallet address
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Identity that asked the factory for this wallet
    pub fn created_by(&self) -> &Address {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn owners(&self) -> &[Address] {
        self.owners.owners()
    }

    pub fn is_owner(&self, identity: &Address) -> bool {
        self.owners.is_owner(identity)
    }

    pub fn owner_count(&self) -> usize {
        self.owners.owner_count()
    }

    pub fn transaction(&self, id: TxId) -> Result<&Transaction, MultisigError> {
        self.ledger.get(id)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.ledger.iter()
    }

    pub fn pending_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.ledger.pending()
    }

    pub fn transaction_count(&self) -> usize {
        self.ledger.len()
    }

    /// Number of owners currently approving transaction `id`
    pub fn approval_count(&self, id: TxId) -> Result<usize, MultisigError> {
        Ok(self.ledger.get(id)?.approval_count())
    }

    pub fn has_approved(&self, id: TxId, owner: &Address) -> Result<bool, MultisigError> {
        Ok(self.ledger.get(id)?.has_approved(owner))
    }

    /// Whether `execute` would pass every precondition at `now`
    pub fn is_executable(&self, id: TxId, now: DateTime<Utc>) -> bool {
        self.prepare_execution(&self.address, id, now).is_ok()
    }

    /// Balance held in `symbol`
    pub fn balance(&self, symbol: &str) -> u128 {
        self.balances.get(symbol).copied().unwrap_or(0)
    }

    /// Balance held in the native asset
    pub fn native_balance(&self) -> u128 {
        self.balance(&self.config.native_symbol)
    }

    pub fn balances(&self) -> &BTreeMap<String, u128> {
        &self.balances
    }

    pub fn events(&self) -> &[EventRecord] {
        self.events.records()
    }

    /// Events with sequence number `>= cursor`
    pub fn events_since(&self, cursor: u64) -> &[EventRecord] {
        self.events.since(cursor)
    }

    /// Re-check the owner set, every stored transaction and the event log
    ///
    /// Holds for any wallet built through `new` and the mutating calls.
    pub fn verify(&self) -> Result<(), MultisigError> {
        self.owners.verify()?;
        self.ledger.verify(&self.owners)?;

        for (index, record) in self.events.records().iter().enumerate() {
            if record.seq != index as u64 {
                return Err(MultisigError::InconsistentState(format!(
                    "event at position {} has seq {}",
                    index, record.seq
                )));
            }
        }
        Ok(())
    }
}
