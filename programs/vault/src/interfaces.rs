//! Collaborators consumed by the vault
//!
//! Amounts cross these interfaces as unsigned integers. Every fallible call
//! reports an [`ExternalError`] which aborts the vault operation, except the
//! open PnL feed's advance request.

use pinocchio::pubkey::Pubkey;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    #[error("asset transfer failed: {0}")]
    AssetTransfer(String),
    #[error("backing token call failed: {0}")]
    BackingToken(String),
    #[error("price oracle call failed: {0}")]
    Oracle(String),
    #[error("open pnl feed call failed: {0}")]
    Feed(String),
}

/// Base asset held by the vault
pub trait AssetToken: Send {
    /// Move `amount` out of the vault's own account
    fn transfer(&mut self, to: &Pubkey, amount: u128) -> Result<(), ExternalError>;
    /// Move `amount` from `from` to `to` (the vault pulls deposits this way)
    fn transfer_from(
        &mut self,
        from: &Pubkey,
        to: &Pubkey,
        amount: u128,
    ) -> Result<(), ExternalError>;
    fn balance_of(&self, who: &Pubkey) -> u128;
}

/// Secondary token minted on refill and burned on deplete
pub trait BackingToken: Send {
    fn mint(&mut self, to: &Pubkey, amount: u128) -> Result<(), ExternalError>;
    fn burn(&mut self, from: &Pubkey, amount: u128) -> Result<(), ExternalError>;
    fn total_supply(&self) -> u128;
}

/// Backing token price in assets, HS_PRECISION scaled
pub trait PriceOracle: Send {
    /// `request` is the opaque payload configured for the vault
    fn price(&self, request: &[u8]) -> Result<u128, ExternalError>;
}

/// Upstream open PnL feed
pub trait OpenPnlFeed: Send {
    /// Nonzero while an epoch-advance request is in flight
    fn next_epoch_values_request_count(&self) -> u64;
    /// Fire-and-forget; failures are tolerated by the vault
    fn request_next_epoch_values_or_advance(&mut self) -> Result<(), ExternalError>;
}

/// Optional listener told about share balance changes after commit
pub trait BalanceObserver: Send {
    fn balance_changed(&mut self, account: &Pubkey, balance: u128);
}
