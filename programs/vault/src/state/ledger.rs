//! Per-share PnL ledger and share price
//!
//! Tracks:
//! - Live accumulated PnL per share (`acc_pnl_per_token`)
//! - The epoch snapshot the share price derives from (`acc_pnl_per_token_used`)
//! - Accumulated rewards per share, which raise the price ceiling
//! - Liability and lifetime statistics
//!
//! A positive accumulated PnL means the vault owes traders. Every per-share
//! delta is rounded so the vault never owes less than it paid out.

use vault_math::*;

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnlLedger {
    /// Live accumulated PnL per share (signed, PRECISION-scaled)
    pub acc_pnl_per_token: i128,
    /// Snapshot of `acc_pnl_per_token` taken at the last epoch boundary
    pub acc_pnl_per_token_used: i128,
    /// Rewards distributed per share
    pub acc_rewards_per_token: i128,
    /// Published price of one share in assets
    pub share_to_assets_price: i128,
    /// Assets owed to share holders
    pub total_liability: i128,
    pub total_deposited: i128,
    pub total_closed_pnl: i128,
    pub total_rewards: i128,
    pub total_discounts: i128,
    pub total_locked_discounts: i128,
    pub total_depleted: i128,
    pub total_refilled: i128,
}

impl Default for PnlLedger {
    fn default() -> Self {
        Self {
            acc_pnl_per_token: 0,
            acc_pnl_per_token_used: 0,
            acc_rewards_per_token: 0,
            share_to_assets_price: PRECISION,
            total_liability: 0,
            total_deposited: 0,
            total_closed_pnl: 0,
            total_rewards: 0,
            total_discounts: 0,
            total_locked_discounts: 0,
            total_depleted: 0,
            total_refilled: 0,
        }
    }
}

impl PnlLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_acc_pnl_per_token(&self) -> MathResult<i128> {
        max_acc_pnl_per_token(self.acc_rewards_per_token)
    }

    pub fn collateralization_p(&self) -> MathResult<i128> {
        collateralization_p(self.max_acc_pnl_per_token()?, self.acc_pnl_per_token_used)
    }

    /// Recompute the share price from the snapshot and rewards
    ///
    /// Returns the new price so the caller can publish it.
    pub fn update_share_to_assets_price(&mut self) -> MathResult<i128> {
        self.share_to_assets_price =
            share_to_assets_price(self.max_acc_pnl_per_token()?, self.acc_pnl_per_token_used)?;
        Ok(self.share_to_assets_price)
    }

    /// Rescale per-share state around a supply change
    ///
    /// `supply` is the share supply before the change. A negative
    /// accumulated PnL is spread over the new supply (rounded toward zero); a
    /// positive one keeps its per-share value and the liability follows the
    /// supply instead.
    pub fn scale_variables(
        &mut self,
        supply: i128,
        shares: i128,
        assets: i128,
        is_deposit: bool,
    ) -> MathResult<()> {
        let new_supply = if is_deposit { add(supply, shares)? } else { sub(supply, shares)? };

        if self.acc_pnl_per_token < 0 {
            // Negative numerator: Up is toward zero
            self.acc_pnl_per_token =
                mul_div(self.acc_pnl_per_token, supply, new_supply, Rounding::Up)?;
        } else if self.acc_pnl_per_token > 0 {
            let liability_delta = mul_div(shares, self.total_liability, supply, Rounding::Down)?;
            self.total_liability = if is_deposit {
                add(self.total_liability, liability_delta)?
            } else {
                sub(self.total_liability, liability_delta)?
            };
        }

        self.total_deposited = if is_deposit {
            add(self.total_deposited, assets)?
        } else {
            sub(self.total_deposited, assets)?
        };
        Ok(())
    }

    /// Record closed PnL paid out of the vault
    ///
    /// Returns the per-share delta applied (rounded up).
    pub fn record_outbound(&mut self, assets: i128, supply: i128) -> VaultResult<i128> {
        let delta = per_share(assets, supply, Rounding::Up)?;
        self.acc_pnl_per_token = add(self.acc_pnl_per_token, delta)?;
        self.ensure_below_max()?;

        self.total_liability = add(self.total_liability, assets)?;
        self.total_closed_pnl = add(self.total_closed_pnl, assets)?;
        Ok(delta)
    }

    /// Record closed PnL paid into the vault
    ///
    /// Returns the (negative) per-share delta applied. Its magnitude is
    /// rounded down.
    pub fn record_inbound(&mut self, assets: i128, supply: i128) -> VaultResult<i128> {
        let delta = neg(per_share(assets, supply, Rounding::Down)?)?;
        self.acc_pnl_per_token = add(self.acc_pnl_per_token, delta)?;
        self.ensure_below_max()?;

        self.total_liability = sub(self.total_liability, assets)?;
        self.total_closed_pnl = sub(self.total_closed_pnl, assets)?;
        Ok(delta)
    }

    /// Upper bound of an open PnL settlement delta, in assets
    pub fn max_open_pnl_delta(
        &self,
        supply: i128,
        max_acc_open_pnl_delta: i128,
    ) -> MathResult<i128> {
        let headroom = sub(self.max_acc_pnl_per_token()?, self.acc_pnl_per_token)?;
        Ok(per_share_to_assets(headroom, supply, Rounding::Down)?
            .min(per_share_to_assets(max_acc_open_pnl_delta, supply, Rounding::Down)?))
    }

    /// Apply an already clamped open PnL delta and take the epoch snapshot
    pub fn settle_open_pnl(&mut self, delta: i128, supply: i128) -> MathResult<()> {
        if delta != 0 {
            let per_token = per_share(delta, supply, Rounding::Up)?;
            self.acc_pnl_per_token = add(self.acc_pnl_per_token, per_token)?;
            self.total_liability = add(self.total_liability, delta)?;
        }
        self.acc_pnl_per_token_used = self.acc_pnl_per_token;
        Ok(())
    }

    /// Accrue rewards to every share (rounded down)
    pub fn distribute_reward(&mut self, assets: i128, supply: i128) -> MathResult<()> {
        let delta = per_share(assets, supply, Rounding::Down)?;
        self.acc_rewards_per_token = add(self.acc_rewards_per_token, delta)?;
        self.total_rewards = add(self.total_rewards, assets)?;
        Ok(())
    }

    /// Assets a refill may still cover: the positive snapshot over the supply
    pub fn refill_capacity(&self, supply: i128) -> MathResult<i128> {
        per_share_to_assets(clamp_pos(self.acc_pnl_per_token_used), supply, Rounding::Down)
    }

    /// Lower both the live value and the snapshot by a refill
    pub fn apply_refill(&mut self, assets: i128, supply: i128) -> MathResult<()> {
        let delta = per_share(assets, supply, Rounding::Down)?;
        self.acc_pnl_per_token = sub(self.acc_pnl_per_token, delta)?;
        self.acc_pnl_per_token_used = sub(self.acc_pnl_per_token_used, delta)?;
        self.total_refilled = add(self.total_refilled, assets)?;
        Ok(())
    }

    pub fn record_depleted(&mut self, assets: i128) -> MathResult<()> {
        self.total_depleted = add(self.total_depleted, assets)?;
        Ok(())
    }

    pub fn record_discount(&mut self, discount: i128) -> MathResult<()> {
        self.total_discounts = add(self.total_discounts, discount)?;
        self.total_locked_discounts = add(self.total_locked_discounts, discount)?;
        Ok(())
    }

    /// Realize an unlocked deposit's discount as PnL owed by the vault
    ///
    /// Returns the per-share delta applied (rounded up).
    pub fn realize_discount(&mut self, discount: i128, supply: i128) -> VaultResult<i128> {
        let delta = per_share(discount, supply, Rounding::Up)?;
        self.acc_pnl_per_token = add(self.acc_pnl_per_token, delta)?;
        self.ensure_below_max()?;

        self.total_liability = add(self.total_liability, discount)?;
        self.total_locked_discounts = sub(self.total_locked_discounts, discount)?;
        Ok(delta)
    }

    pub fn convert_to_shares(&self, assets: i128, rounding: Rounding) -> VaultResult<i128> {
        if self.share_to_assets_price == 0 {
            return Err(VaultError::ZeroSharePrice);
        }
        Ok(assets_to_shares(assets, self.share_to_assets_price, rounding)?)
    }

    pub fn convert_to_assets(&self, shares: i128, rounding: Rounding) -> MathResult<i128> {
        shares_to_assets(shares, self.share_to_assets_price, rounding)
    }

    /// Assets the vault would hold at a zero accumulated PnL
    pub fn tvl(&self, supply: i128) -> MathResult<i128> {
        per_share_to_assets(self.max_acc_pnl_per_token()?, supply, Rounding::Down)
    }

    /// Assets backing the supply after the last snapshot
    pub fn available_assets(&self, supply: i128) -> MathResult<i128> {
        let per_share_value = sub(self.max_acc_pnl_per_token()?, self.acc_pnl_per_token_used)?;
        per_share_to_assets(per_share_value, supply, Rounding::Down)
    }

    pub fn market_cap(&self, supply: i128) -> MathResult<i128> {
        shares_to_assets(supply, self.share_to_assets_price, Rounding::Down)
    }

    fn ensure_below_max(&self) -> VaultResult<()> {
        if self.acc_pnl_per_token > self.max_acc_pnl_per_token()? {
            return Err(VaultError::NotEnoughAssets);
        }
        Ok(())
    }
}
