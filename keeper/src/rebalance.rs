//! Rebalance planning
//!
//! Pure decision logic: given a vault status and the keeper's balances,
//! pick at most one deplete or refill to submit this tick.

use collateral_vault::VaultStatus;
use vault_math::{backing_amount, mul_div, Rounding, HS_PRECISION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceAction {
    /// Buy assets out of the deplete buffer
    Deplete(u128),
    /// Cover part of the shortfall
    Refill(u128),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalancePolicy {
    pub min_deplete_assets: u128,
    pub max_refill_assets_per_tick: u128,
}

/// What the keeper can spend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeeperBalances {
    pub assets: u128,
    pub backing: u128,
}

/// Choose this tick's action
///
/// A shortfall is covered before the deplete buffer is drained.
pub fn plan(
    status: &VaultStatus,
    balances: KeeperBalances,
    backing_price: u128,
    policy: &RebalancePolicy,
) -> Option<RebalanceAction> {
    if backing_price == 0 {
        return None;
    }

    if status.acc_pnl_per_token_used > 0 {
        let capacity = u128::try_from(status.refill_capacity).ok()?;
        let assets = capacity
            .min(policy.max_refill_assets_per_tick)
            .min(balances.assets);
        return (assets > 0).then_some(RebalanceAction::Refill(assets));
    }

    let buffer = u128::try_from(status.assets_to_deplete).ok()?;
    if buffer == 0 || buffer < policy.min_deplete_assets {
        return None;
    }

    let price = i128::try_from(backing_price).ok()?;
    let buffer_signed = i128::try_from(buffer).ok()?;
    let burn_needed = backing_amount(buffer_signed, price, Rounding::Up).ok()?;
    let backing = i128::try_from(balances.backing).ok()?;

    let assets = if backing >= burn_needed {
        buffer
    } else {
        // Largest deplete whose rounded-up burn the keeper can still cover
        let affordable = mul_div(backing, price, HS_PRECISION, Rounding::Down).ok()?;
        u128::try_from(affordable).ok()?
    };

    (assets > 0 && assets >= policy.min_deplete_assets).then_some(RebalanceAction::Deplete(assets))
}
