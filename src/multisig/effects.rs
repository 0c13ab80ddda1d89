//! Execution effects
//!
//! The wallet debits its own balance; anything outside the wallet (crediting
//! the recipient, running call data) is delegated to an [`EffectHandler`].

use crate::core::Address;
use crate::multisig::transaction::{Transaction, TxId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Refusal from an effect handler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EffectError(pub String);

/// Outcome of a successful execution
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ExecutionReceipt {
    pub id: TxId,
    pub wallet: Address,
    pub to: Address,
    pub symbol: String,
    pub amount: u128,
    pub data: Vec<u8>,
    pub executed_by: Address,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionReceipt {
    pub(crate) fn new(
        wallet: &Address,
        tx: &Transaction,
        executed_by: &Address,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: tx.id,
            wallet: wallet.clone(),
            to: tx.to.clone(),
            symbol: tx.symbol.clone(),
            amount: tx.amount,
            data: tx.data.clone(),
            executed_by: executed_by.clone(),
            executed_at,
        }
    }
}

/// Applies the external part of an execution
///
/// Called after every precondition has passed and before the wallet changes
/// any state. Returning an error aborts the execution with the wallet
/// untouched.
pub trait EffectHandler {
    fn apply(&mut self, receipt: &ExecutionReceipt) -> Result<(), EffectError>;
}

/// Handler with no side effect beyond the wallet's own debit
#[derive(Clone, Copy, Debug, Default)]
pub struct LedgerTransfer;

impl EffectHandler for LedgerTransfer {
    fn apply(&mut self, _receipt: &ExecutionReceipt) -> Result<(), EffectError> {
        Ok(())
    }
}

/// Handler that records applied transfers for the host to settle
#[derive(Clone, Debug, Default)]
pub struct OutboundTransfers {
    transfers: Vec<ExecutionReceipt>,
}

impl OutboundTransfers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transfers(&self) -> &[ExecutionReceipt] {
        &self.transfers
    }

    /// Total amount sent to `recipient` in `symbol`
    pub fn total_to(&self, recipient: &Address, symbol: &str) -> u128 {
        self.transfers
            .iter()
            .filter(|t| &t.to == recipient && t.symbol == symbol)
            .map(|t| t.amount)
            .sum()
    }

    /// Hand the recorded transfers over, leaving the recorder empty
    pub fn drain(&mut self) -> Vec<ExecutionReceipt> {
        std::mem::take(&mut self.transfers)
    }
}

impl EffectHandler for OutboundTransfers {
    fn apply(&mut self, receipt: &ExecutionReceipt) -> Result<(), EffectError> {
        self.transfers.push(receipt.clone());
        Ok(())
    }
}

impl<F> EffectHandler for F
where
    F: FnMut(&ExecutionReceipt) -> Result<(), EffectError>,
{
    fn apply(&mut self, receipt: &ExecutionReceipt) -> Result<(), EffectError> {
        self(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(to: &str, symbol: &str, amount: u128) -> ExecutionReceipt {
        ExecutionReceipt {
            id: 0,
            wallet: Address::from("0xwallet"),
            to: Address::from(to),
            symbol: symbol.to_string(),
            amount,
            data: vec![],
            executed_by: Address::from("relayer"),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn test_outbound_transfers_records() {
        let mut outbound = OutboundTransfers::new();
        outbound.apply(&receipt("bob", "ETH", 10)).unwrap();
        outbound.apply(&receipt("bob", "ETH", 5)).unwrap();
        outbound.apply(&receipt("bob", "USDC", 7)).unwrap();

        assert_eq!(outbound.transfers().len(), 3);
        assert_eq!(outbound.total_to(&Address::from("bob"), "ETH"), 15);

        let drained = outbound.drain();
        assert_eq!(drained.len(), 3);
        assert!(outbound.transfers().is_empty());
    }

    #[test]
    fn test_closure_handler() {
        let mut refuse = |_: &ExecutionReceipt| -> Result<(), EffectError> {
            Err(EffectError("recipient rejected".to_string()))
        };
        let result = refuse.apply(&receipt("bob", "ETH", 1));
        assert_eq!(result, Err(EffectError("recipient rejected".to_string())));
    }
}
