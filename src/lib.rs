//! Quorum Wallet: quorum-based multi-signature wallets in Rust
//!
//! This crate provides:
//! - Wallets with a fixed owner set and per-transaction quorum
//! - Submit / approve / revoke / execute lifecycle with all-or-nothing calls
//! - Expiring transactions, evaluated against caller-supplied time
//! - Per-asset balances and a pluggable execution effect
//! - Append-only lifecycle event logs for external observers
//! - A wallet factory with label lookup and JSON snapshot persistence
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use quorum_wallet::{Address, TransactionRequest, WalletFactory};
//!
//! let now = Utc::now();
//! let deployer = Address::from("deployer");
//! let alice = Address::from("alice");
//! let bob = Address::from("bob");
//!
//! // Create a wallet
//! let mut factory = WalletFactory::new();
//! let address = factory
//!     .create_wallet(&deployer, "mama", vec![alice.clone(), bob.clone()], now)
//!     .unwrap();
//!
//! // Propose and approve a transfer
//! let wallet = factory.wallet_mut(&address).unwrap();
//! wallet.deposit("ETH", 10, now).unwrap();
//! let id = wallet
//!     .submit(&alice, TransactionRequest::new("carol", 4, 2), now)
//!     .unwrap();
//! wallet.approve(&alice, id, now).unwrap();
//! wallet.approve(&bob, id, now).unwrap();
//!
//! // Execute
//! let receipt = wallet.execute(&deployer, id, now).unwrap();
//! println!("sent {} {} to {}", receipt.amount, receipt.symbol, receipt.to);
//! assert_eq!(wallet.native_balance(), 6);
//! ```

pub mod core;
pub mod crypto;
pub mod multisig;
pub mod storage;

// Re-export commonly used types
pub use crate::core::Address;
pub use multisig::{
    EffectHandler, ExecutionReceipt, FactoryConfig, MultisigError, MultisigWallet,
    TransactionRequest, TxId, WalletConfig, WalletEvent, WalletFactory,
};
pub use storage::{FactoryStore, StorageError, StoreConfig};
