//! Accounting core of a tokenized collateral vault
//!
//! Depositors receive shares whose value tracks the closed and open PnL of an
//! external trading system. Withdrawals go through epoch-locked requests, and
//! a backing token is minted or burned to rebalance collateralization.

pub mod constants;
pub mod error;
pub mod access;
pub mod interfaces;
pub mod events;
pub mod params;
pub mod state;
pub mod sim;
pub mod vault;

pub use access::*;
pub use error::*;
pub use events::*;
pub use interfaces::*;
pub use params::*;
pub use vault::*;

pub use pinocchio::pubkey::Pubkey;
