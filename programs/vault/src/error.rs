//! Vault error types

use pinocchio::program_error::ProgramError;
use thiserror::Error;
use vault_math::MathError;

use crate::access::Role;
use crate::interfaces::ExternalError;

pub type VaultResult<T> = Result<T, VaultError>;

/// Failure category of a [`VaultError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, wrong caller or exceeded balance/allowance/withdraw cap
    Precondition,
    /// A rate limit, buffer or shortfall bound was hit
    Capacity,
    /// A collaborator call failed
    External,
    /// Fixed-point overflow or division by zero
    Math,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    // Preconditions
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("share to assets price is zero")]
    ZeroSharePrice,
    #[error("caller does not hold the {0:?} role")]
    Unauthorized(Role),
    #[error("caller may not act for this owner")]
    NotAllowed,
    #[error("an epoch values request is in flight")]
    EpochRequestPending,
    #[error("insufficient share balance")]
    InsufficientBalance,
    #[error("insufficient share allowance")]
    InsufficientAllowance,
    #[error("shares are committed to pending withdraw requests")]
    PendingWithdrawal,
    #[error("withdraw requests would exceed the share balance")]
    MoreThanBalance,
    #[error("cancel exceeds the requested shares")]
    MoreThanWithdrawAmount,
    #[error("withdraw above max")]
    ExceedsMaxWithdraw,
    #[error("redeem above max")]
    ExceedsMaxRedeem,
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("no active discount")]
    NoActiveDiscount,
    #[error("lock duration below minimum")]
    LockBelowMin,
    #[error("lock duration above maximum")]
    LockAboveMax,
    #[error("deposit earns no discount")]
    NoDiscount,
    #[error("unknown locked deposit {0}")]
    UnknownLockedDeposit(u64),
    #[error("locked deposit is not unlocked yet")]
    DepositStillLocked,

    // Capacity
    #[error("deposit above max")]
    ExceedsMaxDeposit,
    #[error("mint above max")]
    ExceedsMaxMint,
    #[error("accumulated pnl per token above its maximum")]
    NotEnoughAssets,
    #[error("daily accumulated pnl delta above cap")]
    MaxDailyPnl,
    #[error("daily backing token mint above inflation limit")]
    AboveInflationLimit,
    #[error("deplete amount above the deplete buffer")]
    DepleteTooBig,
    #[error("refill amount above the shortfall")]
    RefillTooBig,
    #[error("vault is not under-collateralized")]
    NotUnderCollateralized,

    // External
    #[error("price oracle returned zero")]
    ZeroOraclePrice,
    #[error(transparent)]
    External(#[from] ExternalError),

    // Math
    #[error(transparent)]
    Math(#[from] MathError),
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        use VaultError::*;
        match self {
            ZeroAmount
            | ZeroSharePrice
            | Unauthorized(_)
            | NotAllowed
            | EpochRequestPending
            | InsufficientBalance
            | InsufficientAllowance
            | PendingWithdrawal
            | MoreThanBalance
            | MoreThanWithdrawAmount
            | ExceedsMaxWithdraw
            | ExceedsMaxRedeem
            | InvalidParameter(_)
            | NoActiveDiscount
            | LockBelowMin
            | LockAboveMax
            | NoDiscount
            | UnknownLockedDeposit(_)
            | DepositStillLocked => ErrorKind::Precondition,
            ExceedsMaxDeposit
            | ExceedsMaxMint
            | NotEnoughAssets
            | MaxDailyPnl
            | AboveInflationLimit
            | DepleteTooBig
            | RefillTooBig
            | NotUnderCollateralized => ErrorKind::Capacity,
            ZeroOraclePrice | External(_) => ErrorKind::External,
            Math(_) => ErrorKind::Math,
        }
    }

    /// Stable numeric code, grouped by kind (1xx, 2xx, 3xx, 4xx)
    pub fn code(&self) -> u32 {
        use VaultError::*;
        match self {
            ZeroAmount => 100,
            ZeroSharePrice => 101,
            Unauthorized(_) => 102,
            NotAllowed => 103,
            EpochRequestPending => 104,
            InsufficientBalance => 105,
            InsufficientAllowance => 106,
            PendingWithdrawal => 107,
            MoreThanBalance => 108,
            MoreThanWithdrawAmount => 109,
            ExceedsMaxWithdraw => 110,
            ExceedsMaxRedeem => 111,
            InvalidParameter(_) => 112,
            NoActiveDiscount => 113,
            LockBelowMin => 114,
            LockAboveMax => 115,
            NoDiscount => 116,
            UnknownLockedDeposit(_) => 117,
            DepositStillLocked => 118,
            ExceedsMaxDeposit => 200,
            ExceedsMaxMint => 201,
            NotEnoughAssets => 202,
            MaxDailyPnl => 203,
            AboveInflationLimit => 204,
            DepleteTooBig => 205,
            RefillTooBig => 206,
            NotUnderCollateralized => 207,
            ZeroOraclePrice => 300,
            External(_) => 301,
            Math(MathError::Overflow) => 400,
            Math(MathError::DivisionByZero) => 401,
            Math(MathError::Negative) => 402,
        }
    }
}

impl From<VaultError> for ProgramError {
    fn from(e: VaultError) -> Self {
        ProgramError::Custom(e.code())
    }
}
