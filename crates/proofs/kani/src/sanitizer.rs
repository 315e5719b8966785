//! Input space sanitizer - bounds values for Kani exploration

use vault_math::*;

use crate::generators::PricingInputs;

/// Bounds for tractable verification
const MAX_REWARDS: i128 = 10 * PRECISION;
const MAX_USED_ABS: i128 = 2 * PRECISION;
const MAX_ASSETS: i128 = 1_000_000 * PRECISION;
const MAX_SUPPLY: i128 = 1_000_000 * PRECISION;

pub trait Sanitize {
    fn sanitize(self) -> Self;
}

impl Sanitize for PricingInputs {
    fn sanitize(mut self) -> PricingInputs {
        // Rewards only ever accumulate
        self.acc_rewards_per_token = self.acc_rewards_per_token.rem_euclid(MAX_REWARDS);

        // The ceiling check keeps the snapshot at or below the maximum
        let max = PRECISION + self.acc_rewards_per_token;
        self.acc_pnl_per_token_used = self
            .acc_pnl_per_token_used
            .clamp(-MAX_USED_ABS, max);

        self.assets = self.assets.rem_euclid(MAX_ASSETS);

        // Never divide by an empty supply
        self.supply = self.supply.rem_euclid(MAX_SUPPLY).max(1);

        self
    }
}
