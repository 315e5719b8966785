//! Checked signed fixed-point helpers - products go through a 256-bit
//! intermediate, rounding direction is always explicit

use thiserror::Error;
use uint::construct_uint;

construct_uint! {
    /// 256-bit intermediate for `a * b / c`
    pub struct U256(4);
}

/// Scale of every per-share value, price and percentage (1e18)
pub const PRECISION: i128 = 1_000_000_000_000_000_000;

/// Scale of the backing token price (1e10)
pub const HS_PRECISION: i128 = 10_000_000_000;

/// 100% expressed as a PRECISION-scaled percentage
pub const ONE_HUNDRED_P: i128 = 100 * PRECISION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("negative value where an unsigned amount is required")]
    Negative,
}

pub type MathResult<T> = Result<T, MathError>;

/// Rounding direction of a division
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward negative infinity
    Down,
    /// Toward positive infinity
    Up,
}

/// Checked i128 addition
pub fn add(a: i128, b: i128) -> MathResult<i128> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Checked i128 subtraction
pub fn sub(a: i128, b: i128) -> MathResult<i128> {
    a.checked_sub(b).ok_or(MathError::Overflow)
}

/// Checked i128 negation
pub fn neg(a: i128) -> MathResult<i128> {
    a.checked_neg().ok_or(MathError::Overflow)
}

/// Clamp negative values to zero
pub fn clamp_pos(x: i128) -> i128 {
    if x > 0 { x } else { 0 }
}

/// Convert an unsigned external amount into the internal signed representation
pub fn to_signed(amount: u128) -> MathResult<i128> {
    i128::try_from(amount).map_err(|_| MathError::Overflow)
}

/// Convert an internal value back into an unsigned external amount
pub fn to_unsigned(value: i128) -> MathResult<u128> {
    u128::try_from(value).map_err(|_| MathError::Negative)
}

/// Compute `a * b / denominator` with a 256-bit intermediate
///
/// The sign of the result follows the signs of the operands. `Rounding::Up`
/// rounds toward positive infinity and `Rounding::Down` toward negative
/// infinity, for negative results too.
pub fn mul_div(a: i128, b: i128, denominator: i128, rounding: Rounding) -> MathResult<i128> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }

    let negative = (a < 0) ^ (b < 0) ^ (denominator < 0);

    // |a| * |b| < 2^256, cannot overflow
    let product = U256::from(a.unsigned_abs()) * U256::from(b.unsigned_abs());
    let (quotient, remainder) = product.div_mod(U256::from(denominator.unsigned_abs()));

    let round_away = !remainder.is_zero()
        && match rounding {
            Rounding::Up => !negative,
            Rounding::Down => negative,
        };

    // quotient <= product / 1, so +1 never wraps
    let magnitude = if round_away {
        quotient + U256::one()
    } else {
        quotient
    };

    from_magnitude(magnitude, negative)
}

/// `value * p / 100%` for PRECISION-scaled percentages
pub fn percent_of(value: i128, p: i128, rounding: Rounding) -> MathResult<i128> {
    mul_div(value, p, ONE_HUNDRED_P, rounding)
}

fn from_magnitude(magnitude: U256, negative: bool) -> MathResult<i128> {
    if magnitude > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    let magnitude = magnitude.low_u128();

    if negative {
        if magnitude == i128::MIN.unsigned_abs() {
            return Ok(i128::MIN);
        }
        i128::try_from(magnitude)
            .map(|m| -m)
            .map_err(|_| MathError::Overflow)
    } else {
        i128::try_from(magnitude).map_err(|_| MathError::Overflow)
    }
}
