//! In-memory collaborators
//!
//! Cloneable handles over shared state, so a test or the keeper can hand one
//! copy to the vault and keep another to inspect balances and inject
//! failures.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pinocchio::pubkey::Pubkey;

use crate::interfaces::*;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct AssetBook {
    balances: BTreeMap<Pubkey, u128>,
    fail_transfer: Option<String>,
    fail_transfer_from: Option<String>,
}

/// Base asset ledger; `transfer` moves funds out of the vault's account
#[derive(Debug, Clone)]
pub struct InMemoryAsset {
    vault: Pubkey,
    book: Arc<Mutex<AssetBook>>,
}

impl InMemoryAsset {
    pub fn new(vault: Pubkey) -> Self {
        Self {
            vault,
            book: Arc::default(),
        }
    }

    /// Faucet
    pub fn credit(&self, who: &Pubkey, amount: u128) {
        let mut book = lock(&self.book);
        let balance = book.balances.entry(*who).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Make outbound transfers fail until cleared with `None`
    pub fn fail_transfers(&self, reason: Option<&str>) {
        lock(&self.book).fail_transfer = reason.map(str::to_owned);
    }

    /// Make pulls into the vault fail until cleared with `None`
    pub fn fail_transfers_from(&self, reason: Option<&str>) {
        lock(&self.book).fail_transfer_from = reason.map(str::to_owned);
    }

    fn move_funds(
        book: &mut AssetBook,
        from: &Pubkey,
        to: &Pubkey,
        amount: u128,
    ) -> Result<(), ExternalError> {
        let from_balance = book.balances.get(from).copied().unwrap_or(0);
        if from_balance < amount {
            return Err(ExternalError::AssetTransfer(format!(
                "balance {} below {}",
                from_balance, amount
            )));
        }
        book.balances.insert(*from, from_balance - amount);
        let to_balance = book.balances.entry(*to).or_insert(0);
        *to_balance = to_balance.saturating_add(amount);
        Ok(())
    }
}

impl AssetToken for InMemoryAsset {
    fn transfer(&mut self, to: &Pubkey, amount: u128) -> Result<(), ExternalError> {
        let mut book = lock(&self.book);
        if let Some(reason) = &book.fail_transfer {
            return Err(ExternalError::AssetTransfer(reason.clone()));
        }
        Self::move_funds(&mut book, &self.vault, to, amount)
    }

    fn transfer_from(
        &mut self,
        from: &Pubkey,
        to: &Pubkey,
        amount: u128,
    ) -> Result<(), ExternalError> {
        let mut book = lock(&self.book);
        if let Some(reason) = &book.fail_transfer_from {
            return Err(ExternalError::AssetTransfer(reason.clone()));
        }
        Self::move_funds(&mut book, from, to, amount)
    }

    fn balance_of(&self, who: &Pubkey) -> u128 {
        lock(&self.book).balances.get(who).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct BackingBook {
    balances: BTreeMap<Pubkey, u128>,
    total_supply: u128,
    fail_mint: Option<String>,
    fail_burn: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBacking {
    book: Arc<Mutex<BackingBook>>,
}

impl InMemoryBacking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, who: &Pubkey) -> u128 {
        lock(&self.book).balances.get(who).copied().unwrap_or(0)
    }

    /// Mint outside the vault (initial distribution)
    pub fn credit(&self, who: &Pubkey, amount: u128) {
        let mut book = lock(&self.book);
        book.total_supply = book.total_supply.saturating_add(amount);
        let balance = book.balances.entry(*who).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    pub fn fail_mints(&self, reason: Option<&str>) {
        lock(&self.book).fail_mint = reason.map(str::to_owned);
    }

    pub fn fail_burns(&self, reason: Option<&str>) {
        lock(&self.book).fail_burn = reason.map(str::to_owned);
    }
}

impl BackingToken for InMemoryBacking {
    fn mint(&mut self, to: &Pubkey, amount: u128) -> Result<(), ExternalError> {
        let mut book = lock(&self.book);
        if let Some(reason) = &book.fail_mint {
            return Err(ExternalError::BackingToken(reason.clone()));
        }
        book.total_supply = book
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| ExternalError::BackingToken("supply overflow".into()))?;
        let balance = book.balances.entry(*to).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    fn burn(&mut self, from: &Pubkey, amount: u128) -> Result<(), ExternalError> {
        let mut book = lock(&self.book);
        if let Some(reason) = &book.fail_burn {
            return Err(ExternalError::BackingToken(reason.clone()));
        }
        let balance = book.balances.get(from).copied().unwrap_or(0);
        if balance < amount {
            return Err(ExternalError::BackingToken(format!(
                "burn {} above balance {}",
                amount, balance
            )));
        }
        book.balances.insert(*from, balance - amount);
        book.total_supply -= amount;
        Ok(())
    }

    fn total_supply(&self) -> u128 {
        lock(&self.book).total_supply
    }
}

/// Oracle answering a settable price regardless of the request payload
#[derive(Debug, Clone)]
pub struct StaticOracle {
    price: Arc<Mutex<Result<u128, String>>>,
}

impl StaticOracle {
    pub fn new(price: u128) -> Self {
        Self {
            price: Arc::new(Mutex::new(Ok(price))),
        }
    }

    pub fn set_price(&self, price: u128) {
        *lock(&self.price) = Ok(price);
    }

    pub fn fail(&self, reason: &str) {
        *lock(&self.price) = Err(reason.to_owned());
    }
}

impl PriceOracle for StaticOracle {
    fn price(&self, _request: &[u8]) -> Result<u128, ExternalError> {
        lock(&self.price).clone().map_err(ExternalError::Oracle)
    }
}

#[derive(Debug, Default)]
struct FeedState {
    pending_requests: u64,
    pokes: u64,
    fail: Option<String>,
}

/// Open PnL feed driven by hand
#[derive(Debug, Clone, Default)]
pub struct ManualFeed {
    state: Arc<Mutex<FeedState>>,
}

impl ManualFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an epoch-advance request in flight
    pub fn set_pending_requests(&self, count: u64) {
        lock(&self.state).pending_requests = count;
    }

    pub fn pokes(&self) -> u64 {
        lock(&self.state).pokes
    }

    pub fn fail(&self, reason: Option<&str>) {
        lock(&self.state).fail = reason.map(str::to_owned);
    }
}

impl OpenPnlFeed for ManualFeed {
    fn next_epoch_values_request_count(&self) -> u64 {
        lock(&self.state).pending_requests
    }

    fn request_next_epoch_values_or_advance(&mut self) -> Result<(), ExternalError> {
        let mut state = lock(&self.state);
        if let Some(reason) = &state.fail {
            return Err(ExternalError::Feed(reason.clone()));
        }
        state.pokes += 1;
        Ok(())
    }
}

/// Observer keeping every notification
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    seen: Arc<Mutex<Vec<(Pubkey, u128)>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self) -> Vec<(Pubkey, u128)> {
        lock(&self.seen).clone()
    }
}

impl BalanceObserver for RecordingObserver {
    fn balance_changed(&mut self, account: &Pubkey, balance: u128) {
        lock(&self.seen).push((*account, balance));
    }
}
