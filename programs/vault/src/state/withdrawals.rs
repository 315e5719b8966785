//! Epoch clock and epoch-locked withdraw requests
//!
//! Shares are requested for withdrawal at `current_epoch + WITHDRAW_EPOCHS_LOCK`
//! and become redeemable only during that exact epoch. Requests for past
//! epochs are stale and no longer count against the owner's balance.

use std::collections::BTreeMap;

use pinocchio::pubkey::Pubkey;
use vault_math::*;

use crate::constants::WITHDRAW_EPOCHS_LOCK;
use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochState {
    pub current_epoch: u64,
    pub current_epoch_start: u64,
    /// Positive open PnL recorded at the last settlement
    pub current_epoch_positive_open_pnl: i128,
}

impl Default for EpochState {
    fn default() -> Self {
        Self {
            current_epoch: 1,
            current_epoch_start: 0,
            current_epoch_positive_open_pnl: 0,
        }
    }
}

impl EpochState {
    pub fn advance(&mut self, now: u64, positive_open_pnl: i128) -> MathResult<u64> {
        self.current_epoch = self.current_epoch.checked_add(1).ok_or(MathError::Overflow)?;
        self.current_epoch_start = now;
        self.current_epoch_positive_open_pnl = positive_open_pnl;
        Ok(self.current_epoch)
    }
}

/// Number of epochs between a request and its unlock epoch
pub fn withdraw_epochs_timelock() -> u64 {
    WITHDRAW_EPOCHS_LOCK
}

/// Pending requests keyed by `(owner, unlock_epoch)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawalQueue {
    requests: BTreeMap<(Pubkey, u64), i128>,
}

impl WithdrawalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, owner: &Pubkey, unlock_epoch: u64) -> i128 {
        self.requests.get(&(*owner, unlock_epoch)).copied().unwrap_or(0)
    }

    /// Shares committed from `current_epoch` through the furthest unlock epoch
    pub fn total_shares_being_withdrawn(&self, owner: &Pubkey, current_epoch: u64) -> i128 {
        let last = current_epoch.saturating_add(withdraw_epochs_timelock());
        self.requests
            .range((*owner, current_epoch)..=(*owner, last))
            .map(|(_, shares)| *shares)
            .sum()
    }

    /// Add shares to a slot, returning the slot's new total
    pub fn add(&mut self, owner: &Pubkey, unlock_epoch: u64, shares: i128) -> MathResult<i128> {
        let slot = self.requests.entry((*owner, unlock_epoch)).or_insert(0);
        *slot = add(*slot, shares)?;
        Ok(*slot)
    }

    /// Remove shares from a slot; empty slots are dropped
    pub fn remove(&mut self, owner: &Pubkey, unlock_epoch: u64, shares: i128) -> VaultResult<i128> {
        let key = (*owner, unlock_epoch);
        let current = self.requests.get(&key).copied().unwrap_or(0);
        if shares > current {
            return Err(VaultError::MoreThanWithdrawAmount);
        }

        let left = current - shares;
        if left == 0 {
            self.requests.remove(&key);
        } else {
            self.requests.insert(key, left);
        }
        Ok(left)
    }

    /// Drop an owner's slots whose unlock epoch has passed
    ///
    /// Those shares can no longer be redeemed, so the slots only cost storage.
    /// Returns the number of slots removed.
    pub fn prune_stale(&mut self, owner: &Pubkey, current_epoch: u64) -> usize {
        let stale: Vec<_> = self
            .requests
            .range((*owner, 0)..(*owner, current_epoch))
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            self.requests.remove(key);
        }
        stale.len()
    }

    /// All non-empty slots of an owner, oldest first
    pub fn pending_requests(&self, owner: &Pubkey) -> Vec<(u64, i128)> {
        self.requests
            .range((*owner, 0)..=(*owner, u64::MAX))
            .map(|((_, epoch), shares)| (*epoch, *shares))
            .collect()
    }
}
