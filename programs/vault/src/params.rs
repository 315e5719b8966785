//! Vault parameters (governance configurable)
//!
//! Percentages are PRECISION-scaled (`100 * PRECISION` = 100%). Per-share
//! deltas are PRECISION-scaled fractions of one share.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{VaultError, VaultResult};

/// PnL rate limits, updated by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Max per-share move a single open PnL settlement may apply
    pub max_acc_open_pnl_delta: i128,
    /// Max per-share closed PnL a rolling day may accumulate
    pub max_daily_acc_pnl_delta: i128,
    /// Daily growth allowance of the share supply while under-collateralized
    pub max_supply_increase_daily_p: i128,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_acc_open_pnl_delta: PRECISION / 20,       // 0.05 per share per epoch
            max_daily_acc_pnl_delta: PRECISION / 10,      // 0.1 per share per day
            max_supply_increase_daily_p: 10 * PRECISION,  // 10% per day
        }
    }
}

impl RiskParams {
    pub fn validate(&self) -> VaultResult<()> {
        if self.max_acc_open_pnl_delta <= 0 {
            return Err(VaultError::InvalidParameter("max_acc_open_pnl_delta"));
        }
        if self.max_daily_acc_pnl_delta < MIN_DAILY_ACC_PNL_DELTA {
            return Err(VaultError::InvalidParameter("max_daily_acc_pnl_delta"));
        }
        if self.max_supply_increase_daily_p < 0
            || self.max_supply_increase_daily_p > MAX_SUPPLY_INCREASE_DAILY_P
        {
            return Err(VaultError::InvalidParameter("max_supply_increase_daily_p"));
        }
        Ok(())
    }
}

/// Deplete/refill and discount settings, updated by the admin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceParams {
    /// Share of received losses diverted to the deplete buffer
    pub losses_burn_p: i128,
    /// Daily backing token mint cap relative to its total supply
    pub max_hs_supply_mint_daily_p: i128,
    /// Discount granted to a full-length lock at or below 100% collateralization
    pub max_discount_p: i128,
    /// Collateralization above which locked deposits earn nothing
    pub max_discount_threshold_p: i128,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        Self {
            losses_burn_p: 25 * PRECISION,              // 25%
            max_hs_supply_mint_daily_p: PRECISION / 20, // 0.05%
            max_discount_p: 5 * PRECISION,              // 5%
            max_discount_threshold_p: 120 * PRECISION,  // 120%
        }
    }
}

impl RebalanceParams {
    pub fn validate(&self) -> VaultResult<()> {
        if self.losses_burn_p < 0 || self.losses_burn_p > MAX_LOSSES_BURN_P {
            return Err(VaultError::InvalidParameter("losses_burn_p"));
        }
        if self.max_hs_supply_mint_daily_p < 0
            || self.max_hs_supply_mint_daily_p > MAX_HS_SUPPLY_MINT_DAILY_P
        {
            return Err(VaultError::InvalidParameter("max_hs_supply_mint_daily_p"));
        }
        if self.max_discount_p < 0 || self.max_discount_p > MAX_DISCOUNT_P {
            return Err(VaultError::InvalidParameter("max_discount_p"));
        }
        if self.max_discount_threshold_p <= ONE_HUNDRED_P {
            return Err(VaultError::InvalidParameter("max_discount_threshold_p"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParams {
    pub risk: RiskParams,
    pub rebalance: RebalanceParams,
}

impl VaultParams {
    pub fn validate(&self) -> VaultResult<()> {
        self.risk.validate()?;
        self.rebalance.validate()
    }
}
