//! Structured events emitted by vault operations
//!
//! Events are buffered per operation and discarded with the rest of the
//! state when the operation fails.

use pinocchio::pubkey::Pubkey;
use serde::Serialize;

use crate::params::VaultParams;
use crate::state::LockedDeposit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum VaultEvent {
    Deposit {
        sender: Pubkey,
        owner: Pubkey,
        assets: i128,
        shares: i128,
    },
    Withdraw {
        sender: Pubkey,
        receiver: Pubkey,
        owner: Pubkey,
        assets: i128,
        shares: i128,
    },
    Transfer {
        from: Pubkey,
        to: Pubkey,
        shares: i128,
    },
    Approval {
        owner: Pubkey,
        spender: Pubkey,
        shares: i128,
    },
    WithdrawRequested {
        sender: Pubkey,
        owner: Pubkey,
        shares: i128,
        current_epoch: u64,
        unlock_epoch: u64,
    },
    WithdrawCanceled {
        sender: Pubkey,
        owner: Pubkey,
        shares: i128,
        current_epoch: u64,
        unlock_epoch: u64,
    },
    ShareToAssetsPriceUpdated {
        price: i128,
    },
    AccPnlPerTokenUsedUpdated {
        sender: Pubkey,
        new_epoch: u64,
        prev_positive_open_pnl: i128,
        new_positive_open_pnl: i128,
        new_epoch_positive_open_pnl: i128,
        new_acc_pnl_per_token_used: i128,
    },
    AssetsSent {
        sender: Pubkey,
        receiver: Pubkey,
        assets: i128,
    },
    AssetsReceived {
        sender: Pubkey,
        user: Pubkey,
        assets: i128,
        assets_to_deplete: i128,
    },
    RewardDistributed {
        sender: Pubkey,
        assets: i128,
    },
    Depleted {
        sender: Pubkey,
        assets: i128,
        backing_burned: i128,
    },
    Refilled {
        sender: Pubkey,
        assets: i128,
        backing_minted: i128,
    },
    DailyAccPnlDeltaReset {
        at: u64,
    },
    DailyMintedHsReset {
        at: u64,
    },
    CurrentMaxSupplyUpdated {
        current_max_supply: i128,
    },
    OpenPnlFeedCallFailed {
        reason: String,
    },
    DepositLocked {
        sender: Pubkey,
        owner: Pubkey,
        deposit_id: u64,
        deposit: LockedDeposit,
    },
    DepositUnlocked {
        sender: Pubkey,
        receiver: Pubkey,
        owner: Pubkey,
        deposit_id: u64,
        deposit: LockedDeposit,
    },
    ParamsUpdated {
        sender: Pubkey,
        params: VaultParams,
    },
}

impl VaultEvent {
    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            VaultEvent::Deposit { .. } => "Deposit",
            VaultEvent::Withdraw { .. } => "Withdraw",
            VaultEvent::Transfer { .. } => "Transfer",
            VaultEvent::Approval { .. } => "Approval",
            VaultEvent::WithdrawRequested { .. } => "WithdrawRequested",
            VaultEvent::WithdrawCanceled { .. } => "WithdrawCanceled",
            VaultEvent::ShareToAssetsPriceUpdated { .. } => "ShareToAssetsPriceUpdated",
            VaultEvent::AccPnlPerTokenUsedUpdated { .. } => "AccPnlPerTokenUsedUpdated",
            VaultEvent::AssetsSent { .. } => "AssetsSent",
            VaultEvent::AssetsReceived { .. } => "AssetsReceived",
            VaultEvent::RewardDistributed { .. } => "RewardDistributed",
            VaultEvent::Depleted { .. } => "Depleted",
            VaultEvent::Refilled { .. } => "Refilled",
            VaultEvent::DailyAccPnlDeltaReset { .. } => "DailyAccPnlDeltaReset",
            VaultEvent::DailyMintedHsReset { .. } => "DailyMintedHsReset",
            VaultEvent::CurrentMaxSupplyUpdated { .. } => "CurrentMaxSupplyUpdated",
            VaultEvent::OpenPnlFeedCallFailed { .. } => "OpenPnlFeedCallFailed",
            VaultEvent::DepositLocked { .. } => "DepositLocked",
            VaultEvent::DepositUnlocked { .. } => "DepositUnlocked",
            VaultEvent::ParamsUpdated { .. } => "ParamsUpdated",
        }
    }
}
