//! Daily rate limits
//!
//! Each limit lives in a 24h window that resets lazily: the first operation
//! touching it after the window elapsed zeroes the counter and restarts the
//! window at the current time.

use vault_math::*;

use crate::constants::SECONDS_PER_DAY;
use crate::error::{VaultError, VaultResult};

/// Lazily restarted 24h window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyWindow {
    pub last_reset: u64,
}

impl DailyWindow {
    /// Restart the window if a full day has passed since the last reset
    ///
    /// Returns true when the window restarted.
    pub fn try_roll(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_reset) < SECONDS_PER_DAY {
            return false;
        }
        self.last_reset = now;
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupplyGovernor {
    /// Per-share closed PnL accumulated in the current window (signed)
    pub daily_acc_pnl_delta: i128,
    pub acc_pnl_window: DailyWindow,
    /// Backing tokens minted by refills in the current window
    pub daily_minted_hs: i128,
    pub mint_window: DailyWindow,
    /// Supply ceiling applied while under-collateralized
    pub current_max_supply: i128,
    pub max_supply_window: DailyWindow,
}

impl SupplyGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_reset_daily_acc_pnl_delta(&mut self, now: u64) -> bool {
        if !self.acc_pnl_window.try_roll(now) {
            return false;
        }
        self.daily_acc_pnl_delta = 0;
        true
    }

    pub fn try_reset_daily_minted_hs(&mut self, now: u64) -> bool {
        if !self.mint_window.try_roll(now) {
            return false;
        }
        self.daily_minted_hs = 0;
        true
    }

    /// Accumulate a per-share delta against the daily cap
    pub fn add_acc_pnl_delta(
        &mut self,
        delta: i128,
        max_daily_acc_pnl_delta: i128,
    ) -> VaultResult<()> {
        self.daily_acc_pnl_delta = add(self.daily_acc_pnl_delta, delta)?;
        if self.daily_acc_pnl_delta > max_daily_acc_pnl_delta {
            return Err(VaultError::MaxDailyPnl);
        }
        Ok(())
    }

    /// Accumulate minted backing tokens against the daily inflation cap
    ///
    /// The cap is `backing_supply * max_hs_supply_mint_daily_p / 100%`.
    pub fn add_minted_hs(
        &mut self,
        amount: i128,
        backing_supply: i128,
        max_hs_supply_mint_daily_p: i128,
    ) -> VaultResult<()> {
        self.daily_minted_hs = add(self.daily_minted_hs, amount)?;
        let cap = percent_of(backing_supply, max_hs_supply_mint_daily_p, Rounding::Down)?;
        if self.daily_minted_hs > cap {
            return Err(VaultError::AboveInflationLimit);
        }
        Ok(())
    }

    /// Ratchet the supply ceiling once per window
    ///
    /// Returns the new ceiling when it was recomputed.
    pub fn try_update_current_max_supply(
        &mut self,
        now: u64,
        supply: i128,
        max_supply_increase_daily_p: i128,
    ) -> MathResult<Option<i128>> {
        if now.saturating_sub(self.max_supply_window.last_reset) < SECONDS_PER_DAY {
            return Ok(None);
        }
        let max_supply = mul_div(
            supply,
            add(ONE_HUNDRED_P, max_supply_increase_daily_p)?,
            ONE_HUNDRED_P,
            Rounding::Down,
        )?;
        self.max_supply_window.last_reset = now;
        self.current_max_supply = max_supply;
        Ok(Some(max_supply))
    }

    /// Shares that may still be minted
    ///
    /// Unbounded (`i128::MAX`) unless the vault is under-collateralized.
    pub fn max_mint(&self, supply: i128, acc_pnl_per_token_used: i128) -> i128 {
        if acc_pnl_per_token_used > 0 {
            self.current_max_supply - self.current_max_supply.min(supply)
        } else {
            i128::MAX
        }
    }
}
