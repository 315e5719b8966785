//! Protocol constants

pub use vault_math::{HS_PRECISION, ONE_HUNDRED_P, PRECISION};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// Epochs a withdraw request waits before it can be redeemed
pub const WITHDRAW_EPOCHS_LOCK: u64 = 3;

/// Lower bound for the daily accumulated PnL delta cap (0.1 per share)
pub const MIN_DAILY_ACC_PNL_DELTA: i128 = PRECISION / 10;

/// Upper bound for the daily supply growth cap (50%)
pub const MAX_SUPPLY_INCREASE_DAILY_P: i128 = 50 * PRECISION;

/// Upper bound for the share of received losses diverted to the deplete buffer (25%)
pub const MAX_LOSSES_BURN_P: i128 = 25 * PRECISION;

/// Upper bound for the daily backing token mint, relative to its supply (0.05%)
pub const MAX_HS_SUPPLY_MINT_DAILY_P: i128 = PRECISION / 20;

/// Upper bound for the locked deposit discount (10%)
pub const MAX_DISCOUNT_P: i128 = 10 * PRECISION;

pub const MIN_LOCK_DURATION: u64 = 7 * SECONDS_PER_DAY;
pub const MAX_LOCK_DURATION: u64 = 365 * SECONDS_PER_DAY;
