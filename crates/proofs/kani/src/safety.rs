//! Kani proofs for rounding direction and share pricing bounds

use kani::{any, assume};
use vault_math::*;

use crate::{generators::*, sanitizer::*};

/// Rounding up never yields less than rounding down, and never more than one unit above
#[kani::proof]
fn mul_div_up_is_down_plus_at_most_one() {
    let a: i64 = any();
    let b: i64 = any();
    let d: i64 = any();
    assume(d != 0);

    let down = mul_div(a as i128, b as i128, d as i128, Rounding::Down);
    let up = mul_div(a as i128, b as i128, d as i128, Rounding::Up);

    if let (Ok(down), Ok(up)) = (down, up) {
        kani::assert(up >= down, "Up must not be below Down");
        kani::assert(up - down <= 1, "Up and Down differ by at most one unit");
    }
}

/// The share price never exceeds PRECISION + rewards
#[kani::proof]
fn share_price_bounded_by_max() {
    let inputs = any_pricing_inputs().sanitize();
    let max = max_acc_pnl_per_token(inputs.acc_rewards_per_token).unwrap();
    let price = share_to_assets_price(max, inputs.acc_pnl_per_token_used).unwrap();

    kani::assert(price <= max, "price above max_acc_pnl_per_token");
    kani::assert(price >= 0, "price negative below the ceiling");
    if inputs.acc_pnl_per_token_used <= 0 {
        kani::assert(price == max, "negative snapshot must not move the price");
    }
}

/// At or above 100% exactly when the vault owes nothing
#[kani::proof]
fn collateralization_tracks_snapshot_sign() {
    let inputs = any_pricing_inputs().sanitize();
    let max = max_acc_pnl_per_token(inputs.acc_rewards_per_token).unwrap();
    let collat = collateralization_p(max, inputs.acc_pnl_per_token_used).unwrap();

    if inputs.acc_pnl_per_token_used > 0 {
        kani::assert(collat < ONE_HUNDRED_P, "owed pnl must be under 100%");
    } else {
        kani::assert(collat >= ONE_HUNDRED_P, "non-positive snapshot must be at least 100%");
    }
}

/// Outbound per-share deltas cover the assets paid; inbound ones never overshoot
#[kani::proof]
fn per_share_rounding_favors_vault() {
    let inputs = any_pricing_inputs().sanitize();

    let outbound = per_share(inputs.assets, inputs.supply, Rounding::Up).unwrap();
    let inbound = per_share(inputs.assets, inputs.supply, Rounding::Down).unwrap();

    let paid = per_share_to_assets(outbound, inputs.supply, Rounding::Down).unwrap();
    let credited = per_share_to_assets(inbound, inputs.supply, Rounding::Up).unwrap();

    kani::assert(paid >= inputs.assets, "outbound delta under-records the payout");
    kani::assert(credited <= inputs.assets, "inbound delta over-credits the vault");
}

/// Burning on deplete costs at least what refill would mint for the same assets
#[kani::proof]
fn backing_conversion_spread() {
    let inputs = any_pricing_inputs().sanitize();
    let price = any_backing_price();

    let burned = backing_amount(inputs.assets, price, Rounding::Up).unwrap();
    let minted = backing_amount(inputs.assets, price, Rounding::Down).unwrap();

    kani::assert(burned >= minted, "deplete burn below refill mint");
}

/// Lock discounts stay within [0, max_discount_p]
#[kani::proof]
fn lock_discount_bounded() {
    let collat_raw: u16 = any();
    let lock_raw: u16 = any();
    let max_discount_raw: u8 = any();
    let threshold_raw: u8 = any();

    let collat = (collat_raw as i128) * (PRECISION / 100);
    let max_lock: u64 = 365 * 86_400;
    let lock = (lock_raw as u64) * 600;
    assume(lock <= max_lock);
    let max_discount = ((max_discount_raw as i128) % 11) * PRECISION;
    let threshold = ONE_HUNDRED_P + ((threshold_raw as i128) + 1) * PRECISION;

    let discount = lock_discount_p(collat, lock, max_lock, max_discount, threshold).unwrap();

    kani::assert(discount >= 0, "negative discount");
    kani::assert(discount <= max_discount, "discount above max");
}
