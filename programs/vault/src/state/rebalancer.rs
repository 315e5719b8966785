//! Deplete buffer and backing token conversion
//!
//! Part of every loss received while the vault is over-collateralized is set
//! aside in the deplete buffer. Anyone may buy it out by burning backing
//! tokens (`deplete`); a shortfall is covered by selling freshly minted
//! backing tokens (`refill`).

use vault_math::*;

use crate::error::{VaultError, VaultResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebalanceBuffer {
    /// Assets that may be paid out against burned backing tokens
    pub assets_to_deplete: i128,
}

impl RebalanceBuffer {
    /// Set aside `losses_burn_p` of received assets
    ///
    /// Returns the diverted amount.
    pub fn divert_losses(&mut self, assets: i128, losses_burn_p: i128) -> MathResult<i128> {
        let diverted = percent_of(assets, losses_burn_p, Rounding::Down)?;
        self.assets_to_deplete = add(self.assets_to_deplete, diverted)?;
        Ok(diverted)
    }

    pub fn take(&mut self, assets: i128) -> VaultResult<()> {
        if assets > self.assets_to_deplete {
            return Err(VaultError::DepleteTooBig);
        }
        self.assets_to_deplete -= assets;
        Ok(())
    }
}

/// Backing tokens burned by a deplete of `assets` (rounded up)
pub fn deplete_burn_amount(assets: i128, backing_price: i128) -> VaultResult<i128> {
    if backing_price == 0 {
        return Err(VaultError::ZeroOraclePrice);
    }
    Ok(backing_amount(assets, backing_price, Rounding::Up)?)
}

/// Backing tokens minted by a refill of `assets` (rounded down)
pub fn refill_mint_amount(assets: i128, backing_price: i128) -> VaultResult<i128> {
    if backing_price == 0 {
        return Err(VaultError::ZeroOraclePrice);
    }
    Ok(backing_amount(assets, backing_price, Rounding::Down)?)
}
