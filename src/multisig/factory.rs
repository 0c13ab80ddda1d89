//! Wallet factory
//!
//! Creates labelled wallets and keeps them for later lookup. The factory holds
//! no approval state of its own; every wallet it creates is independent.

use crate::core::Address;
use crate::multisig::wallet::{MultisigError, MultisigWallet, WalletConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Factory-wide settings
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FactoryConfig {
    /// Policy given to every wallet the factory creates
    pub wallet: WalletConfig,
}

/// Registry of wallets by address and label
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WalletFactory {
    config: FactoryConfig,
    /// Wallets by address
    wallets: HashMap<Address, MultisigWallet>,
    /// Addresses in creation order
    created: Vec<Address>,
    /// Addresses per label, in creation order (rebuilt on load)
    #[serde(skip)]
    labels: HashMap<String, Vec<Address>>,
    /// Creation counter for address derivation
    nonce: u64,
}

impl WalletFactory {
    /// Create a new empty factory
    pub fn new() -> Self {
        Self::with_config(FactoryConfig::default())
    }

    pub fn with_config(config: FactoryConfig) -> Self {
        Self {
            config,
            wallets: HashMap::new(),
            created: Vec::new(),
            labels: HashMap::new(),
            nonce: 0,
        }
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Create a new wallet owned by `owners`
    ///
    /// `creator` is recorded but only becomes an owner if listed in `owners`.
    /// Labels need not be unique.
    pub fn create_wallet(
        &mut self,
        creator: &Address,
        label: &str,
        owners: Vec<Address>,
        now: DateTime<Utc>,
    ) -> Result<Address, MultisigError> {
        let address = self.generate_address(creator, label);
        let wallet = MultisigWallet::new(
            address.clone(),
            label,
            creator.clone(),
            owners,
            self.config.wallet.clone(),
            now,
        )
        .map_err(|e| {
            log::debug!("create_wallet '{}' by {} rejected: {}", label, creator, e);
            e
        })?;

        self.nonce += 1;
        log::info!(
            "created wallet {} '{}' for {} owners (by {})",
            address,
            label,
            wallet.owner_count(),
            creator
        );

        self.wallets.insert(address.clone(), wallet);
        self.created.push(address.clone());
        self.labels
            .entry(label.to_string())
            .or_default()
            .push(address.clone());

        Ok(address)
    }

    /// Generate a unique wallet address
    fn generate_address(&self, creator: &Address, label: &str) -> Address {
        Address::derive(&format!("{}:{}:{}", creator, label, self.nonce))
    }

    /// Get a wallet by address
    pub fn wallet(&self, address: &Address) -> Option<&MultisigWallet> {
        self.wallets.get(address)
    }

    /// Get a mutable reference to a wallet
    pub fn wallet_mut(&mut self, address: &Address) -> Option<&mut MultisigWallet> {
        self.wallets.get_mut(address)
    }

    /// Get a wallet by address or fail with `WalletNotFound`
    pub fn require_wallet(&self, address: &Address) -> Result<&MultisigWallet, MultisigError> {
        self.wallets
            .get(address)
            .ok_or_else(|| MultisigError::WalletNotFound(address.clone()))
    }

    /// Mutable variant of [`WalletFactory::require_wallet`]
    pub fn require_wallet_mut(
        &mut self,
        address: &Address,
    ) -> Result<&mut MultisigWallet, MultisigError> {
        self.wallets
            .get_mut(address)
            .ok_or_else(|| MultisigError::WalletNotFound(address.clone()))
    }

    /// All wallets in creation order
    pub fn wallets(&self) -> Vec<&MultisigWallet> {
        self.created
            .iter()
            .filter_map(|address| self.wallets.get(address))
            .collect()
    }

    /// Get wallet count
    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    /// Check if an address belongs to a wallet of this factory
    pub fn is_wallet(&self, address: &Address) -> bool {
        self.wallets.contains_key(address)
    }

    /// Every wallet created under `label`, oldest first
    pub fn wallets_by_label(&self, label: &str) -> Vec<&MultisigWallet> {
        self.labels
            .get(label)
            .map(|addresses| {
                addresses
                    .iter()
                    .filter_map(|address| self.wallets.get(address))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recently created wallet under `label`
    pub fn latest_by_label(&self, label: &str) -> Option<&MultisigWallet> {
        self.labels
            .get(label)
            .and_then(|addresses| addresses.last())
            .and_then(|address| self.wallets.get(address))
    }

    /// Wallets where `owner` is one of the owners, in creation order
    pub fn wallets_for_owner(&self, owner: &Address) -> Vec<&MultisigWallet> {
        self.wallets()
            .into_iter()
            .filter(|wallet| wallet.is_owner(owner))
            .collect()
    }

    /// Rebuild the label index from the wallet set
    ///
    /// The index is not serialized; call this after deserializing.
    pub fn rebuild_label_index(&mut self) {
        self.labels.clear();
        for address in &self.created {
            if let Some(wallet) = self.wallets.get(address) {
                self.labels
                    .entry(wallet.label().to_string())
                    .or_default()
                    .push(address.clone());
            }
        }
    }

    /// Check that the registry and every wallet in it are consistent
    ///
    /// Each stored wallet must sit under its own address and appear exactly
    /// once in creation order.
    pub fn verify(&self) -> Result<(), MultisigError> {
        if self.created.len() != self.wallets.len() {
            return Err(MultisigError::InconsistentState(format!(
                "{} wallets but {} in creation order",
                self.wallets.len(),
                self.created.len()
            )));
        }

        let mut seen = HashSet::with_capacity(self.created.len());
        for address in &self.created {
            if !seen.insert(address) {
                return Err(MultisigError::InconsistentState(format!(
                    "wallet {} listed twice in creation order",
                    address
                )));
            }
            let wallet = self.require_wallet(address)?;
            if wallet.address() != address {
                return Err(MultisigError::InconsistentState(format!(
                    "wallet {} stored under {}",
                    wallet.address(),
                    address
                )));
            }
            wallet.verify()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multisig::transaction::TransactionRequest;

    fn owners(names: &[&str]) -> Vec<Address> {
        names.iter().map(|n| Address::from(*n)).collect()
    }

    #[test]
    fn test_factory_creation() {
        let factory = WalletFactory::new();
        assert_eq!(factory.wallet_count(), 0);
        assert!(factory.wallets().is_empty());
    }

    #[test]
    fn test_wallet_creation() {
        let mut factory = WalletFactory::new();
        let creator = Address::from("deployer");
        let now = Utc::now();

        let address = factory
            .create_wallet(&creator, "mama", owners(&["alice"]), now)
            .unwrap();
        assert!(address.as_str().starts_with("0x"));
        assert!(factory.is_wallet(&address));

        let wallet = factory.wallet(&address).unwrap();
        assert_eq!(wallet.label(), "mama");
        assert_eq!(wallet.created_by(), &creator);
        assert_eq!(wallet.owners(), &owners(&["alice"])[..]);

        // The creator is not an owner unless listed
        assert!(!wallet.is_owner(&creator));
    }

    #[test]
    fn test_invalid_owner_lists_rejected() {
        let mut factory = WalletFactory::new();
        let creator = Address::from("deployer");
        let now = Utc::now();

        assert!(matches!(
            factory.create_wallet(&creator, "empty", vec![], now),
            Err(MultisigError::EmptyOwnerSet)
        ));
        assert!(matches!(
            factory.create_wallet(&creator, "dup", owners(&["a", "a"]), now),
            Err(MultisigError::DuplicateOwner(_))
        ));
        assert_eq!(factory.wallet_count(), 0);
        assert!(factory.wallets_by_label("empty").is_empty());
    }

    #[test]
    fn test_same_label_creates_distinct_wallets() {
        let mut factory = WalletFactory::new();
        let creator = Address::from("deployer");
        let now = Utc::now();

        let first = factory
            .create_wallet(&creator, "team", owners(&["a", "b"]), now)
            .unwrap();
        let second = factory
            .create_wallet(&creator, "team", owners(&["a", "b"]), now)
            .unwrap();
        factory
            .create_wallet(&creator, "other", owners(&["c"]), now)
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(factory.wallet_count(), 3);

        let team: Vec<&Address> = factory
            .wallets_by_label("team")
            .into_iter()
            .map(|w| w.address())
            .collect();
        assert_eq!(team, vec![&first, &second]);
        assert_eq!(factory.latest_by_label("team").unwrap().address(), &second);
        assert!(factory.latest_by_label("missing").is_none());
    }

    #[test]
    fn test_wallets_are_independent() {
        let mut factory = WalletFactory::new();
        let creator = Address::from("deployer");
        let alice = Address::from("alice");
        let now = Utc::now();

        let first = factory
            .create_wallet(&creator, "one", vec![alice.clone()], now)
            .unwrap();
        let second = factory
            .create_wallet(&creator, "two", vec![alice.clone()], now)
            .unwrap();

        let wallet = factory.require_wallet_mut(&first).unwrap();
        let id = wallet
            .submit(&alice, TransactionRequest::new("x", 0, 1), now)
            .unwrap();
        wallet.approve(&alice, id, now).unwrap();

        assert_eq!(factory.wallet(&first).unwrap().transaction_count(), 1);
        assert_eq!(factory.wallet(&second).unwrap().transaction_count(), 0);
        assert!(matches!(
            factory.wallet(&second).unwrap().approval_count(0),
            Err(MultisigError::UnknownTransaction(0))
        ));
    }

    #[test]
    fn test_wallets_for_owner() {
        let mut factory = WalletFactory::new();
        let creator = Address::from("deployer");
        let now = Utc::now();

        let first = factory
            .create_wallet(&creator, "one", owners(&["alice", "bob"]), now)
            .unwrap();
        factory
            .create_wallet(&creator, "two", owners(&["carol"]), now)
            .unwrap();
        let third = factory
            .create_wallet(&creator, "three", owners(&["bob"]), now)
            .unwrap();

        let bobs: Vec<&Address> = factory
            .wallets_for_owner(&Address::from("bob"))
            .into_iter()
            .map(|w| w.address())
            .collect();
        assert_eq!(bobs, vec![&first, &third]);
    }

    #[test]
    fn test_require_wallet() {
        let factory = WalletFactory::new();
        let missing = Address::from("0xmissing");
        assert!(matches!(
            factory.require_wallet(&missing),
            Err(MultisigError::WalletNotFound(a)) if a == missing
        ));
    }

    #[test]
    fn test_config_propagates_to_wallets() {
        let config = FactoryConfig {
            wallet: WalletConfig {
                native_symbol: "MATIC".to_string(),
                auto_approve_submitter: true,
            },
        };
        let mut factory = WalletFactory::with_config(config);
        let alice = Address::from("alice");
        let now = Utc::now();

        let address = factory
            .create_wallet(&alice, "poly", vec![alice.clone()], now)
            .unwrap();
        let wallet = factory.wallet_mut(&address).unwrap();
        let id = wallet
            .submit(&alice, TransactionRequest::new("x", 0, 1), now)
            .unwrap();

        assert_eq!(wallet.transaction(id).unwrap().symbol, "MATIC");
        assert_eq!(wallet.approval_count(id).unwrap(), 1);
    }

    #[test]
    fn test_rebuild_label_index_after_deserialize() {
        let mut factory = WalletFactory::new();
        let creator = Address::from("deployer");
        let now = Utc::now();

        let address = factory
            .create_wallet(&creator, "mama", owners(&["alice"]), now)
            .unwrap();

        let json = serde_json::to_string(&factory).unwrap();
        let mut restored: WalletFactory = serde_json::from_str(&json).unwrap();
        assert!(restored.latest_by_label("mama").is_none());

        restored.rebuild_label_index();
        assert_eq!(
            restored.latest_by_label("mama").unwrap().address(),
            &address
        );

        // The nonce survives, so new wallets never collide with old ones
        let next = restored
            .create_wallet(&creator, "mama", owners(&["alice"]), now)
            .unwrap();
        assert_ne!(next, address);
    }

    #[test]
    fn test_label_index_follows_wallet_mut() {
        let mut factory = WalletFactory::new();
        let alice = Address::from("alice");
        let now = Utc::now();

        let address = factory
            .create_wallet(&alice, "old", vec![alice.clone()], now)
            .unwrap();
        let wallet = factory.wallet_mut(&address).unwrap();
        wallet.deposit("ETH", 5, now).unwrap();
        wallet
            .submit(&alice, TransactionRequest::new("x", 1, 1), now)
            .unwrap();

        // Mutable access cannot move a wallet between labels or addresses
        let latest = factory.latest_by_label("old").unwrap();
        assert_eq!(latest.label(), "old");
        assert_eq!(latest.address(), &address);
        assert!(factory.wallets_by_label("new").is_empty());
        assert!(factory.verify().is_ok());
    }

    #[test]
    fn test_verify_detects_tampered_registry() {
        let mut factory = WalletFactory::new();
        let creator = Address::from("deployer");
        let now = Utc::now();
        factory
            .create_wallet(&creator, "one", owners(&["alice"]), now)
            .unwrap();
        let second = factory
            .create_wallet(&creator, "two", owners(&["bob"]), now)
            .unwrap();

        let json = serde_json::to_value(&factory).unwrap();

        // Wallet stored under another wallet's key
        let mut moved = json.clone();
        moved["wallets"][second.as_str()]["address"] = serde_json::json!("0xelsewhere");
        let moved: WalletFactory = serde_json::from_value(moved).unwrap();
        assert!(matches!(
            moved.verify(),
            Err(MultisigError::InconsistentState(_))
        ));

        // Creation order missing a wallet
        let mut dropped = json;
        dropped["created"].as_array_mut().unwrap().pop();
        let dropped: WalletFactory = serde_json::from_value(dropped).unwrap();
        assert!(matches!(
            dropped.verify(),
            Err(MultisigError::InconsistentState(_))
        ));
    }
}
