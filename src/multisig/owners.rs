//! Owner registry
//!
//! Holds the fixed set of identities allowed to submit, approve and revoke.

use crate::core::Address;
use crate::multisig::wallet::MultisigError;
use serde::{Deserialize, Serialize};

/// Who may invoke an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Only registered owners
    Owner,
    /// Any identity, including non-owner relayers
    Anyone,
}

/// The immutable owner set of a wallet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OwnerRegistry {
    /// Owners in the order they were supplied at creation
    owners: Vec<Address>,
}

impl OwnerRegistry {
    /// Create a registry from an initial owner list
    ///
    /// # Errors
    /// Returns error if the list is empty or contains the same owner twice
    pub fn new(owners: Vec<Address>) -> Result<Self, MultisigError> {
        let registry = Self { owners };
        registry.verify()?;
        Ok(registry)
    }

    /// Re-check the creation rules, e.g. after deserializing
    pub fn verify(&self) -> Result<(), MultisigError> {
        if self.owners.is_empty() {
            return Err(MultisigError::EmptyOwnerSet);
        }

        let mut sorted: Vec<&Address> = self.owners.iter().collect();
        sorted.sort();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                return Err(MultisigError::DuplicateOwner(pair[0].clone()));
            }
        }

        Ok(())
    }

    /// Membership test
    pub fn is_owner(&self, identity: &Address) -> bool {
        self.owners.iter().any(|o| o == identity)
    }

    /// Number of owners (N)
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    /// All owners, in creation order
    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    /// Check that `caller` holds `capability`
    pub fn authorize(&self, caller: &Address, capability: Capability) -> Result<(), MultisigError> {
        match capability {
            Capability::Anyone => Ok(()),
            Capability::Owner if self.is_owner(caller) => Ok(()),
            Capability::Owner => Err(MultisigError::NotAuthorized(caller.clone())),
        }
    }

    /// Check a per-transaction quorum against the owner count
    pub fn validate_quorum(&self, quorum: usize) -> Result<(), MultisigError> {
        if quorum == 0 || quorum > self.owners.len() {
            return Err(MultisigError::InvalidQuorum {
                quorum,
                owners: self.owners.len(),
            });
        }
        Ok(())
    }
}
