//! Share pricing and conversion formulas
//!
//! All values are PRECISION-scaled unless the name says otherwise. The
//! backing token price is HS_PRECISION-scaled.

use crate::math::*;

/// Theoretical maximum per-share value: PRECISION + accumulated rewards
pub fn max_acc_pnl_per_token(acc_rewards_per_token: i128) -> MathResult<i128> {
    add(PRECISION, acc_rewards_per_token)
}

/// Price of one share in assets
///
/// Only a positive locked-in PnL (vault owes traders) lowers the price
pub fn share_to_assets_price(
    max_acc_pnl_per_token: i128,
    acc_pnl_per_token_used: i128,
) -> MathResult<i128> {
    sub(max_acc_pnl_per_token, clamp_pos(acc_pnl_per_token_used))
}

/// Collateralization percentage (100% = PRECISION * 100)
///
/// The distance to the maximum shrinks by a positive snapshot and grows by the
/// magnitude of a negative one.
pub fn collateralization_p(
    max_acc_pnl_per_token: i128,
    acc_pnl_per_token_used: i128,
) -> MathResult<i128> {
    let distance = if acc_pnl_per_token_used > 0 {
        sub(max_acc_pnl_per_token, acc_pnl_per_token_used)?
    } else {
        add(max_acc_pnl_per_token, neg(acc_pnl_per_token_used)?)?
    };
    mul_div(distance, ONE_HUNDRED_P, max_acc_pnl_per_token, Rounding::Down)
}

/// Per-share equivalent of an asset amount
pub fn per_share(assets: i128, supply: i128, rounding: Rounding) -> MathResult<i128> {
    mul_div(assets, PRECISION, supply, rounding)
}

/// Asset equivalent of a per-share value over the whole supply
pub fn per_share_to_assets(
    per_share_value: i128,
    supply: i128,
    rounding: Rounding,
) -> MathResult<i128> {
    mul_div(per_share_value, supply, PRECISION, rounding)
}

/// Shares bought by `assets` at `price`
pub fn assets_to_shares(assets: i128, price: i128, rounding: Rounding) -> MathResult<i128> {
    mul_div(assets, PRECISION, price, rounding)
}

/// Assets owed for `shares` at `price`
pub fn shares_to_assets(shares: i128, price: i128, rounding: Rounding) -> MathResult<i128> {
    mul_div(shares, price, PRECISION, rounding)
}

/// Backing token units worth `assets` at an HS_PRECISION-scaled price
pub fn backing_amount(assets: i128, backing_price: i128, rounding: Rounding) -> MathResult<i128> {
    mul_div(assets, HS_PRECISION, backing_price, rounding)
}

/// Discount granted to a locked deposit
///
/// Full `max_discount_p` at or below 100% collateralization, linearly
/// decreasing to zero at `max_discount_threshold_p`, then scaled by the lock
/// duration relative to `max_lock_duration`.
pub fn lock_discount_p(
    collat_p: i128,
    lock_duration: u64,
    max_lock_duration: u64,
    max_discount_p: i128,
    max_discount_threshold_p: i128,
) -> MathResult<i128> {
    let base = if collat_p <= ONE_HUNDRED_P {
        max_discount_p
    } else if collat_p <= max_discount_threshold_p {
        mul_div(
            max_discount_p,
            sub(max_discount_threshold_p, collat_p)?,
            sub(max_discount_threshold_p, ONE_HUNDRED_P)?,
            Rounding::Down,
        )?
    } else {
        0
    };

    mul_div(
        base,
        i128::from(lock_duration),
        i128::from(max_lock_duration),
        Rounding::Down,
    )
}
