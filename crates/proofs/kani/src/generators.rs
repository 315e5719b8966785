//! Generators for arbitrary pricing inputs (for Kani)

#[cfg(kani)]
use kani::any;
#[cfg(kani)]
use vault_math::*;

/// Ledger values the pricing formulas read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingInputs {
    pub acc_rewards_per_token: i128,
    pub acc_pnl_per_token_used: i128,
    pub assets: i128,
    pub supply: i128,
}

// Values are built from small raw integers scaled up, which keeps the
// SAT problem small while still crossing the PRECISION boundaries
#[cfg(kani)]
pub fn any_pricing_inputs() -> PricingInputs {
    let rewards_raw: u8 = any();
    let used_raw: i16 = any();
    let assets_raw: u32 = any();
    let supply_raw: u32 = any();

    PricingInputs {
        acc_rewards_per_token: (rewards_raw as i128) * (PRECISION / 100),
        acc_pnl_per_token_used: (used_raw as i128) * (PRECISION / 1_000),
        assets: assets_raw as i128,
        supply: supply_raw as i128,
    }
}

#[cfg(kani)]
pub fn any_backing_price() -> i128 {
    let raw: u16 = any();
    ((raw as i128) + 1) * (HS_PRECISION / 100)
}
