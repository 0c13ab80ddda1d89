//! Quorum multi-signature wallets
//!
//! A fixed set of owners authorizes transactions: each transaction carries its
//! own quorum, collects distinct owner approvals, and may be executed once by
//! anyone after the quorum is reached.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use quorum_wallet::core::Address;
//! use quorum_wallet::multisig::{TransactionRequest, WalletFactory};
//!
//! let now = Utc::now();
//! let (a, b, c) = (Address::from("A"), Address::from("B"), Address::from("C"));
//!
//! let mut factory = WalletFactory::new();
//! let address = factory
//!     .create_wallet(&a, "treasury", vec![a.clone(), b.clone(), c.clone()], now)
//!     .unwrap();
//! let wallet = factory.wallet_mut(&address).unwrap();
//! wallet.deposit("ETH", 100, now).unwrap();
//!
//! // 2-of-3 transfer
//! let id = wallet
//!     .submit(&a, TransactionRequest::new("X", 10, 2), now)
//!     .unwrap();
//! wallet.approve(&a, id, now).unwrap();
//! wallet.approve(&b, id, now).unwrap();
//!
//! // Any relayer may trigger execution once quorum is met
//! wallet.execute(&Address::from("relayer"), id, now).unwrap();
//! assert_eq!(wallet.native_balance(), 90);
//! ```

pub mod effects;
pub mod events;
pub mod factory;
pub mod owners;
pub mod transaction;
pub mod wallet;

pub use effects::{EffectError, EffectHandler, ExecutionReceipt, LedgerTransfer, OutboundTransfers};
pub use events::{EventLog, EventRecord, WalletEvent};
pub use factory::{FactoryConfig, WalletFactory};
pub use owners::{Capability, OwnerRegistry};
pub use transaction::{
    Approval, Transaction, TransactionLedger, TransactionRequest, TxId, TxState,
};
pub use wallet::{MultisigError, MultisigWallet, WalletConfig, DEFAULT_NATIVE_SYMBOL};
