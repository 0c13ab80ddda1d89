//! Wallet lifecycle events
//!
//! Each wallet keeps an append-only log. Records are appended only after the
//! state change they describe has been applied, so observers never see an
//! event for a call that failed.

use crate::core::Address;
use crate::multisig::transaction::TxId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event emitted by a wallet
///
/// Externally tagged in JSON (`{"Deposit": {...}}`); internally tagged
/// enums cannot carry `u128` fields through serde.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum WalletEvent {
    SubmitTransaction {
        id: TxId,
        symbol: String,
        to: Address,
        amount: u128,
        data: String,
        end_date: Option<DateTime<Utc>>,
    },
    ApproveTransaction {
        id: TxId,
        from: Address,
    },
    RevokeApproval {
        id: TxId,
        from: Address,
    },
    ExecuteTransaction {
        id: TxId,
        from: Address,
    },
    Deposit {
        symbol: String,
        amount: u128,
    },
}

impl WalletEvent {
    /// Transaction the event refers to, if any
    pub fn tx_id(&self) -> Option<TxId> {
        match self {
            WalletEvent::SubmitTransaction { id, .. }
            | WalletEvent::ApproveTransaction { id, .. }
            | WalletEvent::RevokeApproval { id, .. }
            | WalletEvent::ExecuteTransaction { id, .. } => Some(*id),
            WalletEvent::Deposit { .. } => None,
        }
    }
}

/// A logged event with its position in the wallet's log
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventRecord {
    /// Zero-based, gap-free sequence number
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event: WalletEvent,
}

/// Append-only event log
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append an event and return its sequence number
    pub fn emit(&mut self, event: WalletEvent, timestamp: DateTime<Utc>) -> u64 {
        let seq = self.records.len() as u64;
        log::trace!("event #{}: {:?}", seq, event);
        self.records.push(EventRecord {
            seq,
            timestamp,
            event,
        });
        seq
    }

    /// All records in emission order
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `seq >= cursor`, for polling subscribers
    pub fn since(&self, cursor: u64) -> &[EventRecord] {
        let start = usize::try_from(cursor)
            .unwrap_or(usize::MAX)
            .min(self.records.len());
        &self.records[start..]
    }

    /// Sequence number the next event will get
    pub fn next_seq(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
