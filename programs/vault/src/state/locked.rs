//! Discounted time-locked deposits
//!
//! A locked deposit pays less than the shares are worth. The shares sit in
//! the vault's own account until the lock expires; the discount becomes a
//! vault liability when the deposit is unlocked.

use std::collections::BTreeMap;

use pinocchio::pubkey::Pubkey;
use serde::Serialize;

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockedDeposit {
    pub owner: Pubkey,
    pub shares: i128,
    /// Assets actually paid in
    pub assets_deposited: i128,
    /// Value of the shares above `assets_deposited`
    pub assets_discount: i128,
    pub at_timestamp: u64,
    pub lock_duration: u64,
}

impl LockedDeposit {
    pub fn unlocks_at(&self) -> u64 {
        self.at_timestamp.saturating_add(self.lock_duration)
    }

    pub fn is_unlocked(&self, now: u64) -> bool {
        now >= self.unlocks_at()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedDeposits {
    deposits: BTreeMap<u64, LockedDeposit>,
    next_id: u64,
}

impl Default for LockedDeposits {
    fn default() -> Self {
        Self {
            deposits: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl LockedDeposits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deposit: LockedDeposit) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.deposits.insert(id, deposit);
        id
    }

    pub fn get(&self, id: u64) -> VaultResult<&LockedDeposit> {
        self.deposits.get(&id).ok_or(VaultError::UnknownLockedDeposit(id))
    }

    pub fn remove(&mut self, id: u64) -> VaultResult<LockedDeposit> {
        self.deposits.remove(&id).ok_or(VaultError::UnknownLockedDeposit(id))
    }

    pub fn count(&self) -> usize {
        self.deposits.len()
    }

    pub fn owned_by<'a>(
        &'a self,
        owner: &'a Pubkey,
    ) -> impl Iterator<Item = (u64, &'a LockedDeposit)> + 'a {
        self.deposits
            .iter()
            .filter(move |(_, d)| d.owner == *owner)
            .map(|(id, d)| (*id, d))
    }
}
