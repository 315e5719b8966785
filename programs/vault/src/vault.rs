//! Vault accounting facade
//!
//! Every public operation runs as one all-or-nothing unit through
//! [`Vault::transact`]: the state and the pending event buffer are restored
//! when the operation fails. Collaborator calls run after the state changes,
//! inbound before outbound, and a failed second call undoes the first before
//! the error propagates.

use pinocchio::pubkey::Pubkey;
use serde::Serialize;
use vault_math::*;

use crate::access::{AccessPolicy, CallContext, Role};
use crate::constants::{MAX_LOCK_DURATION, MIN_LOCK_DURATION};
use crate::error::{VaultError, VaultResult};
use crate::events::VaultEvent;
use crate::interfaces::*;
use crate::params::{RebalanceParams, RiskParams, VaultParams};
use crate::state::*;

/// Static vault settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Account holding the vault's assets and locked deposit shares
    pub address: Pubkey,
    pub params: VaultParams,
    /// Opaque payload handed to the price oracle
    pub oracle_request: Vec<u8>,
}

pub struct Collaborators {
    pub asset: Box<dyn AssetToken>,
    pub backing: Box<dyn BackingToken>,
    pub oracle: Box<dyn PriceOracle>,
    pub feed: Box<dyn OpenPnlFeed>,
    pub observer: Option<Box<dyn BalanceObserver>>,
    pub policy: Box<dyn AccessPolicy>,
}

/// Everything an operation may change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultState {
    pub params: VaultParams,
    pub ledger: PnlLedger,
    pub governor: SupplyGovernor,
    pub epoch: EpochState,
    pub withdrawals: WithdrawalQueue,
    pub buffer: RebalanceBuffer,
    pub shares: ShareLedger,
    pub locked: LockedDeposits,
}

impl VaultState {
    pub fn new(params: VaultParams) -> Self {
        Self {
            params,
            ledger: PnlLedger::new(),
            governor: SupplyGovernor::new(),
            epoch: EpochState::default(),
            withdrawals: WithdrawalQueue::new(),
            buffer: RebalanceBuffer::default(),
            shares: ShareLedger::new(),
            locked: LockedDeposits::new(),
        }
    }
}

/// Point-in-time view for keepers and dashboards
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultStatus {
    pub current_epoch: u64,
    pub current_epoch_start: u64,
    pub epoch_request_pending: bool,
    pub share_to_assets_price: i128,
    pub acc_pnl_per_token: i128,
    pub acc_pnl_per_token_used: i128,
    pub acc_rewards_per_token: i128,
    pub collateralization_p: i128,
    pub total_supply: i128,
    pub total_liability: i128,
    pub tvl: i128,
    pub available_assets: i128,
    pub market_cap: i128,
    pub assets_to_deplete: i128,
    /// Shortfall a refill may still cover
    pub refill_capacity: i128,
    pub daily_acc_pnl_delta: i128,
    pub daily_minted_hs: i128,
    pub current_max_supply: i128,
    pub locked_deposits: usize,
}

pub struct Vault {
    address: Pubkey,
    oracle_request: Vec<u8>,
    state: VaultState,
    events: Vec<VaultEvent>,
    /// Accounts whose share balance changed in the running operation
    touched: Vec<Pubkey>,
    io: Collaborators,
}

impl Vault {
    pub fn new(config: VaultConfig, io: Collaborators) -> VaultResult<Self> {
        config.params.validate()?;
        Ok(Self {
            address: config.address,
            oracle_request: config.oracle_request,
            state: VaultState::new(config.params),
            events: Vec::new(),
            touched: Vec::new(),
            io,
        })
    }

    pub fn address(&self) -> &Pubkey {
        &self.address
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn params(&self) -> &VaultParams {
        &self.state.params
    }

    /// Events emitted by committed operations, oldest first
    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Deposits and redemptions
    // ========================================================================

    /// Deposit `assets` and mint shares to `receiver`
    ///
    /// Returns the shares minted (rounded down).
    pub fn deposit(
        &mut self,
        ctx: &CallContext,
        assets: u128,
        receiver: &Pubkey,
    ) -> VaultResult<u128> {
        self.transact("deposit", |v| {
            let assets = v.checked_amount(assets)?;
            v.ensure_share_price()?;
            v.ensure_no_epoch_request()?;
            if assets > v.max_deposit_internal()? {
                return Err(VaultError::ExceedsMaxDeposit);
            }

            let shares = v.state.ledger.convert_to_shares(assets, Rounding::Down)?;
            v.execute_deposit(&ctx.caller, receiver, assets, shares)?;
            Ok(to_unsigned(shares)?)
        })
    }

    /// Mint exactly `shares` to `receiver`
    ///
    /// Returns the assets pulled (rounded up).
    pub fn mint(
        &mut self,
        ctx: &CallContext,
        shares: u128,
        receiver: &Pubkey,
    ) -> VaultResult<u128> {
        self.transact("mint", |v| {
            let shares = v.checked_amount(shares)?;
            v.ensure_share_price()?;
            v.ensure_no_epoch_request()?;
            if shares > v.max_mint_internal() {
                return Err(VaultError::ExceedsMaxMint);
            }

            let assets = v.state.ledger.convert_to_assets(shares, Rounding::Up)?;
            v.execute_deposit(&ctx.caller, receiver, assets, shares)?;
            Ok(to_unsigned(assets)?)
        })
    }

    /// Withdraw exactly `assets` from `owner`'s unlocked request
    ///
    /// Returns the shares burned (rounded up).
    pub fn withdraw(
        &mut self,
        ctx: &CallContext,
        assets: u128,
        receiver: &Pubkey,
        owner: &Pubkey,
    ) -> VaultResult<u128> {
        self.transact("withdraw", |v| {
            let assets = v.checked_amount(assets)?;
            v.ensure_share_price()?;
            if assets > v.max_withdraw_internal(owner)? {
                return Err(VaultError::ExceedsMaxWithdraw);
            }

            let shares = v.state.ledger.convert_to_shares(assets, Rounding::Up)?;
            v.execute_withdraw(&ctx.caller, receiver, owner, assets, shares)?;
            Ok(to_unsigned(shares)?)
        })
    }

    /// Redeem `shares` from `owner`'s unlocked request
    ///
    /// Returns the assets paid out (rounded down).
    pub fn redeem(
        &mut self,
        ctx: &CallContext,
        shares: u128,
        receiver: &Pubkey,
        owner: &Pubkey,
    ) -> VaultResult<u128> {
        self.transact("redeem", |v| {
            let shares = v.checked_amount(shares)?;
            v.ensure_share_price()?;
            if shares > v.max_redeem_internal(owner) {
                return Err(VaultError::ExceedsMaxRedeem);
            }

            let assets = v.state.ledger.convert_to_assets(shares, Rounding::Down)?;
            v.execute_withdraw(&ctx.caller, receiver, owner, assets, shares)?;
            Ok(to_unsigned(assets)?)
        })
    }

    // ========================================================================
    // Withdraw requests
    // ========================================================================

    /// Lock `shares` of `owner` for redemption `WITHDRAW_EPOCHS_LOCK` epochs from now
    ///
    /// Returns the unlock epoch.
    pub fn request_withdraw(
        &mut self,
        ctx: &CallContext,
        shares: u128,
        owner: &Pubkey,
    ) -> VaultResult<u64> {
        self.transact("request_withdraw", |v| {
            let shares = v.checked_amount(shares)?;
            v.ensure_no_epoch_request()?;
            v.ensure_may_act_for(&ctx.caller, owner, shares)?;

            let current_epoch = v.state.epoch.current_epoch;
            v.state.withdrawals.prune_stale(owner, current_epoch);
            let committed = v.state.withdrawals.total_shares_being_withdrawn(owner, current_epoch);
            if add(committed, shares)? > v.state.shares.balance_of(owner) {
                return Err(VaultError::MoreThanBalance);
            }

            let unlock_epoch = current_epoch
                .checked_add(withdraw_epochs_timelock())
                .ok_or(MathError::Overflow)?;
            v.state.withdrawals.add(owner, unlock_epoch, shares)?;

            v.emit(VaultEvent::WithdrawRequested {
                sender: ctx.caller,
                owner: *owner,
                shares,
                current_epoch,
                unlock_epoch,
            });
            Ok(unlock_epoch)
        })
    }

    pub fn cancel_withdraw_request(
        &mut self,
        ctx: &CallContext,
        shares: u128,
        owner: &Pubkey,
        unlock_epoch: u64,
    ) -> VaultResult<()> {
        self.transact("cancel_withdraw_request", |v| {
            let shares = v.checked_amount(shares)?;
            if shares > v.state.withdrawals.request(owner, unlock_epoch) {
                return Err(VaultError::MoreThanWithdrawAmount);
            }
            v.ensure_may_act_for(&ctx.caller, owner, shares)?;

            v.state.withdrawals.remove(owner, unlock_epoch, shares)?;
            v.emit(VaultEvent::WithdrawCanceled {
                sender: ctx.caller,
                owner: *owner,
                shares,
                current_epoch: v.state.epoch.current_epoch,
                unlock_epoch,
            });
            Ok(())
        })
    }

    // ========================================================================
    // Share transfers
    // ========================================================================

    pub fn transfer(&mut self, ctx: &CallContext, to: &Pubkey, shares: u128) -> VaultResult<()> {
        self.transact("transfer", |v| {
            let shares = to_signed(shares)?;
            v.execute_transfer(&ctx.caller, to, shares)
        })
    }

    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        from: &Pubkey,
        to: &Pubkey,
        shares: u128,
    ) -> VaultResult<()> {
        self.transact("transfer_from", |v| {
            let shares = to_signed(shares)?;
            v.state.shares.spend_allowance(from, &ctx.caller, shares)?;
            v.execute_transfer(from, to, shares)
        })
    }

    pub fn approve(
        &mut self,
        ctx: &CallContext,
        spender: &Pubkey,
        shares: u128,
    ) -> VaultResult<()> {
        self.transact("approve", |v| {
            // Anything past i128::MAX is the unlimited allowance
            let shares = i128::try_from(shares).unwrap_or(i128::MAX);
            v.state.shares.approve(&ctx.caller, spender, shares);
            v.emit(VaultEvent::Approval {
                owner: ctx.caller,
                spender: *spender,
                shares,
            });
            Ok(())
        })
    }

    // ========================================================================
    // PnL entry points
    // ========================================================================

    /// Accrue `assets` pulled from the caller to every share
    pub fn distribute_reward(&mut self, ctx: &CallContext, assets: u128) -> VaultResult<()> {
        self.transact("distribute_reward", |v| {
            let assets = v.checked_amount(assets)?;
            let supply = v.supply();
            v.state.ledger.distribute_reward(assets, supply)?;
            v.publish_share_price()?;

            v.emit(VaultEvent::RewardDistributed {
                sender: ctx.caller,
                assets,
            });
            v.pull_assets(&ctx.caller, assets)
        })
    }

    /// Pay closed trader profit out of the vault
    pub fn send_assets(
        &mut self,
        ctx: &CallContext,
        assets: u128,
        receiver: &Pubkey,
    ) -> VaultResult<()> {
        self.transact("send_assets", |v| {
            v.require_role(ctx, Role::PnlHandler)?;
            let assets = v.checked_amount(assets)?;
            let supply = v.supply();

            v.try_reset_daily_acc_pnl_delta(ctx.now);
            let delta = v.state.ledger.record_outbound(assets, supply)?;
            let max_daily = v.state.params.risk.max_daily_acc_pnl_delta;
            v.state.governor.add_acc_pnl_delta(delta, max_daily)?;
            v.try_update_current_max_supply(ctx.now)?;

            v.emit(VaultEvent::AssetsSent {
                sender: ctx.caller,
                receiver: *receiver,
                assets,
            });
            v.pay_assets(receiver, assets)?;
            v.poke_open_pnl_feed();
            Ok(())
        })
    }

    /// Take closed trader losses into the vault
    ///
    /// While both PnL values are negative (the vault is over-collateralized)
    /// `losses_burn_p` of the assets goes to the deplete buffer instead of the
    /// share price.
    pub fn receive_assets(
        &mut self,
        ctx: &CallContext,
        assets: u128,
        user: &Pubkey,
    ) -> VaultResult<()> {
        self.transact("receive_assets", |v| {
            v.require_role(ctx, Role::PnlHandler)?;
            let assets = v.checked_amount(assets)?;
            let supply = v.supply();

            let ledger = &v.state.ledger;
            let in_loss = ledger.acc_pnl_per_token_used < 0 && ledger.acc_pnl_per_token < 0;
            let assets_to_deplete = if in_loss {
                let losses_burn_p = v.state.params.rebalance.losses_burn_p;
                v.state.buffer.divert_losses(assets, losses_burn_p)?
            } else {
                0
            };
            let assets_to_acc_pnl = sub(assets, assets_to_deplete)?;

            v.try_reset_daily_acc_pnl_delta(ctx.now);
            let delta = v.state.ledger.record_inbound(assets_to_acc_pnl, supply)?;
            let max_daily = v.state.params.risk.max_daily_acc_pnl_delta;
            v.state.governor.add_acc_pnl_delta(delta, max_daily)?;
            v.try_update_current_max_supply(ctx.now)?;

            v.emit(VaultEvent::AssetsReceived {
                sender: ctx.caller,
                user: *user,
                assets,
                assets_to_deplete,
            });
            v.pull_assets(&ctx.caller, assets)
        })
    }

    /// Settle open PnL and advance the epoch
    ///
    /// `prev_positive_open_pnl` and `new_positive_open_pnl` are total asset
    /// amounts. The increase is clamped by the PnL ceiling and by
    /// `max_acc_open_pnl_delta`. Returns the recorded positive open PnL.
    pub fn settle_open_pnl(
        &mut self,
        ctx: &CallContext,
        prev_positive_open_pnl: u128,
        new_positive_open_pnl: u128,
    ) -> VaultResult<u128> {
        self.transact("settle_open_pnl", |v| {
            v.require_role(ctx, Role::OpenPnlFeed)?;
            let prev = to_signed(prev_positive_open_pnl)?;
            let new = to_signed(new_positive_open_pnl)?;
            let supply = v.supply();

            let mut delta = sub(new, prev)?;
            if supply == 0 {
                if delta != 0 {
                    log::warn!("settle_open_pnl: no shares outstanding, ignoring delta {}", delta);
                }
                delta = 0;
            } else {
                let max_delta = v
                    .state
                    .ledger
                    .max_open_pnl_delta(supply, v.state.params.risk.max_acc_open_pnl_delta)?;
                delta = delta.min(max_delta);
            }

            v.state.ledger.settle_open_pnl(delta, supply)?;
            v.publish_share_price()?;

            let positive_open_pnl = add(prev, delta)?;
            let new_epoch = v.state.epoch.advance(ctx.now, positive_open_pnl)?;
            v.try_update_current_max_supply(ctx.now)?;

            v.emit(VaultEvent::AccPnlPerTokenUsedUpdated {
                sender: ctx.caller,
                new_epoch,
                prev_positive_open_pnl: prev,
                new_positive_open_pnl: new,
                new_epoch_positive_open_pnl: positive_open_pnl,
                new_acc_pnl_per_token_used: v.state.ledger.acc_pnl_per_token_used,
            });
            Ok(to_unsigned(positive_open_pnl)?)
        })
    }

    // ========================================================================
    // Rebalancing
    // ========================================================================

    /// Buy `assets` out of the deplete buffer by burning backing tokens
    ///
    /// Returns the backing tokens burned (rounded up).
    pub fn deplete(&mut self, ctx: &CallContext, assets: u128) -> VaultResult<u128> {
        self.transact("deplete", |v| {
            let assets = v.checked_amount(assets)?;
            v.state.buffer.take(assets)?;

            let backing_burned = deplete_burn_amount(assets, v.backing_price()?)?;
            v.state.ledger.record_depleted(assets)?;
            v.emit(VaultEvent::Depleted {
                sender: ctx.caller,
                assets,
                backing_burned,
            });

            let burned = to_unsigned(backing_burned)?;
            v.io.backing.burn(&ctx.caller, burned)?;
            if let Err(e) = v.pay_assets(&ctx.caller, assets) {
                if let Err(restore) = v.io.backing.mint(&ctx.caller, burned) {
                    log::error!(
                        "deplete: could not restore {} burned backing tokens: {}",
                        burned,
                        restore
                    );
                }
                return Err(e);
            }
            Ok(burned)
        })
    }

    /// Cover part of the shortfall by selling newly minted backing tokens
    ///
    /// Returns the backing tokens minted (rounded down).
    pub fn refill(&mut self, ctx: &CallContext, assets: u128) -> VaultResult<u128> {
        self.transact("refill", |v| {
            let assets = v.checked_amount(assets)?;
            if v.state.ledger.acc_pnl_per_token_used <= 0 {
                return Err(VaultError::NotUnderCollateralized);
            }
            let supply = v.supply();
            if assets > v.state.ledger.refill_capacity(supply)? {
                return Err(VaultError::RefillTooBig);
            }

            let backing_minted = refill_mint_amount(assets, v.backing_price()?)?;
            v.try_reset_daily_minted_hs(ctx.now);
            let backing_supply = to_signed(v.io.backing.total_supply())?;
            let max_mint_p = v.state.params.rebalance.max_hs_supply_mint_daily_p;
            v.state.governor.add_minted_hs(backing_minted, backing_supply, max_mint_p)?;

            v.state.ledger.apply_refill(assets, supply)?;
            v.publish_share_price()?;
            v.emit(VaultEvent::Refilled {
                sender: ctx.caller,
                assets,
                backing_minted,
            });

            let minted = to_unsigned(backing_minted)?;
            v.pull_assets(&ctx.caller, assets)?;
            if let Err(e) = v.io.backing.mint(&ctx.caller, minted) {
                if let Err(refund) = v.pay_assets(&ctx.caller, assets) {
                    log::error!("refill: could not refund {} assets: {}", assets, refund);
                }
                return Err(e.into());
            }
            Ok(minted)
        })
    }

    // ========================================================================
    // Locked deposits
    // ========================================================================

    /// Deposit `assets` at a discount and lock the shares for `lock_duration` seconds
    ///
    /// Returns the locked deposit id.
    pub fn deposit_with_discount_and_lock(
        &mut self,
        ctx: &CallContext,
        assets: u128,
        lock_duration: u64,
        receiver: &Pubkey,
    ) -> VaultResult<u64> {
        self.transact("deposit_with_discount_and_lock", |v| {
            let assets_deposited = v.checked_amount(assets)?;
            v.ensure_share_price()?;
            v.ensure_no_epoch_request()?;
            let discount_p = v.lock_discount_p_checked(lock_duration)?;

            let assets = mul_div(
                assets_deposited,
                ONE_HUNDRED_P,
                sub(ONE_HUNDRED_P, discount_p)?,
                Rounding::Down,
            )?;
            if assets > v.max_deposit_internal()? {
                return Err(VaultError::ExceedsMaxDeposit);
            }
            let shares = v.state.ledger.convert_to_shares(assets, Rounding::Down)?;
            v.execute_discount_and_lock(
                ctx,
                assets,
                assets_deposited,
                shares,
                lock_duration,
                receiver,
            )
        })
    }

    /// Mint exactly `shares` at a discount and lock them for `lock_duration` seconds
    ///
    /// Returns the locked deposit id.
    pub fn mint_with_discount_and_lock(
        &mut self,
        ctx: &CallContext,
        shares: u128,
        lock_duration: u64,
        receiver: &Pubkey,
    ) -> VaultResult<u64> {
        self.transact("mint_with_discount_and_lock", |v| {
            let shares = v.checked_amount(shares)?;
            v.ensure_share_price()?;
            v.ensure_no_epoch_request()?;
            let discount_p = v.lock_discount_p_checked(lock_duration)?;
            if shares > v.max_mint_internal() {
                return Err(VaultError::ExceedsMaxMint);
            }

            let assets = v.state.ledger.convert_to_assets(shares, Rounding::Up)?;
            let assets_deposited = mul_div(
                assets,
                sub(ONE_HUNDRED_P, discount_p)?,
                ONE_HUNDRED_P,
                Rounding::Down,
            )?;
            v.execute_discount_and_lock(
                ctx,
                assets,
                assets_deposited,
                shares,
                lock_duration,
                receiver,
            )
        })
    }

    /// Release an expired locked deposit to `receiver`
    pub fn unlock_deposit(
        &mut self,
        ctx: &CallContext,
        deposit_id: u64,
        receiver: &Pubkey,
    ) -> VaultResult<()> {
        self.transact("unlock_deposit", |v| {
            let deposit = *v.state.locked.get(deposit_id)?;
            if deposit.owner != ctx.caller {
                return Err(VaultError::NotAllowed);
            }
            if !deposit.is_unlocked(ctx.now) {
                return Err(VaultError::DepositStillLocked);
            }
            let supply = v.supply();

            v.try_reset_daily_acc_pnl_delta(ctx.now);
            let delta = v.state.ledger.realize_discount(deposit.assets_discount, supply)?;
            let max_daily = v.state.params.risk.max_daily_acc_pnl_delta;
            v.state.governor.add_acc_pnl_delta(delta, max_daily)?;

            v.state.locked.remove(deposit_id)?;
            let vault = v.address;
            v.state.shares.move_shares(&vault, receiver, deposit.shares)?;
            v.touch(&vault);
            v.touch(receiver);

            v.emit(VaultEvent::DepositUnlocked {
                sender: ctx.caller,
                receiver: *receiver,
                owner: deposit.owner,
                deposit_id,
                deposit,
            });
            Ok(())
        })
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    pub fn update_risk_params(&mut self, ctx: &CallContext, risk: RiskParams) -> VaultResult<()> {
        self.transact("update_risk_params", |v| {
            v.require_role(ctx, Role::Manager)?;
            risk.validate()?;
            v.state.params.risk = risk;
            v.emit(VaultEvent::ParamsUpdated {
                sender: ctx.caller,
                params: v.state.params,
            });
            Ok(())
        })
    }

    pub fn update_rebalance_params(
        &mut self,
        ctx: &CallContext,
        rebalance: RebalanceParams,
    ) -> VaultResult<()> {
        self.transact("update_rebalance_params", |v| {
            v.require_role(ctx, Role::Admin)?;
            rebalance.validate()?;
            v.state.params.rebalance = rebalance;
            v.emit(VaultEvent::ParamsUpdated {
                sender: ctx.caller,
                params: v.state.params,
            });
            Ok(())
        })
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn total_supply(&self) -> u128 {
        self.supply().unsigned_abs()
    }

    pub fn balance_of(&self, who: &Pubkey) -> u128 {
        self.state.shares.balance_of(who).unsigned_abs()
    }

    pub fn allowance(&self, owner: &Pubkey, spender: &Pubkey) -> u128 {
        self.state.shares.allowance(owner, spender).unsigned_abs()
    }

    pub fn share_to_assets_price(&self) -> i128 {
        self.state.ledger.share_to_assets_price
    }

    pub fn current_epoch(&self) -> u64 {
        self.state.epoch.current_epoch
    }

    pub fn collateralization_p(&self) -> VaultResult<i128> {
        Ok(self.state.ledger.collateralization_p()?)
    }

    pub fn tvl(&self) -> VaultResult<i128> {
        Ok(self.state.ledger.tvl(self.supply())?)
    }

    pub fn available_assets(&self) -> VaultResult<i128> {
        Ok(self.state.ledger.available_assets(self.supply())?)
    }

    pub fn market_cap(&self) -> VaultResult<i128> {
        Ok(self.state.ledger.market_cap(self.supply())?)
    }

    /// Same as [`Vault::market_cap`]
    pub fn total_assets(&self) -> VaultResult<i128> {
        self.market_cap()
    }

    pub fn assets_to_deplete(&self) -> i128 {
        self.state.buffer.assets_to_deplete
    }

    pub fn withdraw_epochs_timelock(&self) -> u64 {
        withdraw_epochs_timelock()
    }

    pub fn total_shares_being_withdrawn(&self, owner: &Pubkey) -> u128 {
        self.state
            .withdrawals
            .total_shares_being_withdrawn(owner, self.state.epoch.current_epoch)
            .unsigned_abs()
    }

    pub fn withdraw_request(&self, owner: &Pubkey, unlock_epoch: u64) -> u128 {
        self.state.withdrawals.request(owner, unlock_epoch).unsigned_abs()
    }

    pub fn locked_deposit(&self, deposit_id: u64) -> VaultResult<LockedDeposit> {
        self.state.locked.get(deposit_id).copied()
    }

    pub fn convert_to_shares(&self, assets: u128) -> VaultResult<u128> {
        let shares = self.state.ledger.convert_to_shares(to_signed(assets)?, Rounding::Down)?;
        Ok(to_unsigned(shares)?)
    }

    pub fn convert_to_assets(&self, shares: u128) -> VaultResult<u128> {
        let assets = self.state.ledger.convert_to_assets(to_signed(shares)?, Rounding::Down)?;
        Ok(to_unsigned(assets)?)
    }

    pub fn preview_deposit(&self, assets: u128) -> VaultResult<u128> {
        self.convert_to_shares(assets)
    }

    pub fn preview_mint(&self, shares: u128) -> VaultResult<u128> {
        let assets = self.state.ledger.convert_to_assets(to_signed(shares)?, Rounding::Up)?;
        Ok(to_unsigned(assets)?)
    }

    pub fn preview_withdraw(&self, assets: u128) -> VaultResult<u128> {
        let shares = self.state.ledger.convert_to_shares(to_signed(assets)?, Rounding::Up)?;
        Ok(to_unsigned(shares)?)
    }

    pub fn preview_redeem(&self, shares: u128) -> VaultResult<u128> {
        self.convert_to_assets(shares)
    }

    pub fn max_deposit(&self) -> VaultResult<u128> {
        Ok(to_unsigned(self.max_deposit_internal()?)?)
    }

    pub fn max_mint(&self) -> u128 {
        self.max_mint_internal().unsigned_abs()
    }

    pub fn max_withdraw(&self, owner: &Pubkey) -> VaultResult<u128> {
        Ok(to_unsigned(self.max_withdraw_internal(owner)?)?)
    }

    pub fn max_redeem(&self, owner: &Pubkey) -> u128 {
        self.max_redeem_internal(owner).unsigned_abs()
    }

    /// Discount a lock of `lock_duration` would earn at the current collateralization
    pub fn lock_discount_p(&self, lock_duration: u64) -> VaultResult<i128> {
        let rebalance = &self.state.params.rebalance;
        Ok(lock_discount_p(
            self.state.ledger.collateralization_p()?,
            lock_duration,
            MAX_LOCK_DURATION,
            rebalance.max_discount_p,
            rebalance.max_discount_threshold_p,
        )?)
    }

    pub fn status(&self) -> VaultResult<VaultStatus> {
        let supply = self.supply();
        let ledger = &self.state.ledger;
        let governor = &self.state.governor;
        Ok(VaultStatus {
            current_epoch: self.state.epoch.current_epoch,
            current_epoch_start: self.state.epoch.current_epoch_start,
            epoch_request_pending: self.epoch_request_pending(),
            share_to_assets_price: ledger.share_to_assets_price,
            acc_pnl_per_token: ledger.acc_pnl_per_token,
            acc_pnl_per_token_used: ledger.acc_pnl_per_token_used,
            acc_rewards_per_token: ledger.acc_rewards_per_token,
            collateralization_p: ledger.collateralization_p()?,
            total_supply: supply,
            total_liability: ledger.total_liability,
            tvl: ledger.tvl(supply)?,
            available_assets: ledger.available_assets(supply)?,
            market_cap: ledger.market_cap(supply)?,
            assets_to_deplete: self.state.buffer.assets_to_deplete,
            refill_capacity: ledger.refill_capacity(supply)?,
            daily_acc_pnl_delta: governor.daily_acc_pnl_delta,
            daily_minted_hs: governor.daily_minted_hs,
            current_max_supply: governor.current_max_supply,
            locked_deposits: self.state.locked.count(),
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn transact<T>(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut Self) -> VaultResult<T>,
    ) -> VaultResult<T> {
        let snapshot = self.state.clone();
        let events_len = self.events.len();
        self.touched.clear();

        match f(self) {
            Ok(value) => {
                log::debug!("{}: committed, {} event(s)", op, self.events.len() - events_len);
                self.notify_observer();
                Ok(value)
            }
            Err(e) => {
                self.state = snapshot;
                self.events.truncate(events_len);
                self.touched.clear();
                log::debug!("{}: rolled back: {}", op, e);
                Err(e)
            }
        }
    }

    fn emit(&mut self, event: VaultEvent) {
        self.events.push(event);
    }

    fn touch(&mut self, who: &Pubkey) {
        if !self.touched.contains(who) {
            self.touched.push(*who);
        }
    }

    fn notify_observer(&mut self) {
        let touched = std::mem::take(&mut self.touched);
        if let Some(observer) = self.io.observer.as_mut() {
            for who in &touched {
                observer.balance_changed(who, self.state.shares.balance_of(who).unsigned_abs());
            }
        }
    }

    fn supply(&self) -> i128 {
        self.state.shares.total_supply()
    }

    fn checked_amount(&self, amount: u128) -> VaultResult<i128> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        Ok(to_signed(amount)?)
    }

    fn ensure_share_price(&self) -> VaultResult<()> {
        if self.state.ledger.share_to_assets_price == 0 {
            return Err(VaultError::ZeroSharePrice);
        }
        Ok(())
    }

    fn epoch_request_pending(&self) -> bool {
        self.io.feed.next_epoch_values_request_count() > 0
    }

    fn ensure_no_epoch_request(&self) -> VaultResult<()> {
        if self.epoch_request_pending() {
            return Err(VaultError::EpochRequestPending);
        }
        Ok(())
    }

    fn require_role(&self, ctx: &CallContext, role: Role) -> VaultResult<()> {
        if !self.io.policy.has_role(&ctx.caller, role) {
            return Err(VaultError::Unauthorized(role));
        }
        Ok(())
    }

    /// Caller is the owner or holds an allowance covering `shares`
    fn ensure_may_act_for(&self, caller: &Pubkey, owner: &Pubkey, shares: i128) -> VaultResult<()> {
        if caller == owner {
            return Ok(());
        }
        let allowance = self.state.shares.allowance(owner, caller);
        if allowance == 0 || allowance < shares {
            return Err(VaultError::NotAllowed);
        }
        Ok(())
    }

    fn max_mint_internal(&self) -> i128 {
        self.state
            .governor
            .max_mint(self.supply(), self.state.ledger.acc_pnl_per_token_used)
    }

    fn max_deposit_internal(&self) -> VaultResult<i128> {
        let max_mint = self.max_mint_internal();
        if max_mint == i128::MAX {
            return Ok(i128::MAX);
        }
        Ok(self.state.ledger.convert_to_assets(max_mint, Rounding::Down)?)
    }

    fn max_redeem_internal(&self, owner: &Pubkey) -> i128 {
        if self.epoch_request_pending() {
            return 0;
        }
        let requested = self
            .state
            .withdrawals
            .request(owner, self.state.epoch.current_epoch);
        requested.min(self.supply() - 1).max(0)
    }

    fn max_withdraw_internal(&self, owner: &Pubkey) -> VaultResult<i128> {
        let shares = self.max_redeem_internal(owner);
        Ok(self.state.ledger.convert_to_assets(shares, Rounding::Down)?)
    }

    fn lock_discount_p_checked(&self, lock_duration: u64) -> VaultResult<i128> {
        if self.state.params.rebalance.max_discount_p == 0 {
            return Err(VaultError::NoActiveDiscount);
        }
        if lock_duration < MIN_LOCK_DURATION {
            return Err(VaultError::LockBelowMin);
        }
        if lock_duration > MAX_LOCK_DURATION {
            return Err(VaultError::LockAboveMax);
        }
        self.lock_discount_p(lock_duration)
    }

    fn execute_deposit(
        &mut self,
        sender: &Pubkey,
        receiver: &Pubkey,
        assets: i128,
        shares: i128,
    ) -> VaultResult<()> {
        let supply = self.supply();
        self.state.ledger.scale_variables(supply, shares, assets, true)?;
        self.state.shares.mint(receiver, shares)?;
        self.touch(receiver);

        self.emit(VaultEvent::Deposit {
            sender: *sender,
            owner: *receiver,
            assets,
            shares,
        });
        self.pull_assets(sender, assets)
    }

    fn execute_withdraw(
        &mut self,
        caller: &Pubkey,
        receiver: &Pubkey,
        owner: &Pubkey,
        assets: i128,
        shares: i128,
    ) -> VaultResult<()> {
        if caller != owner {
            self.state.shares.spend_allowance(owner, caller, shares)?;
        }
        let current_epoch = self.state.epoch.current_epoch;
        self.state.withdrawals.remove(owner, current_epoch, shares)?;
        self.state.withdrawals.prune_stale(owner, current_epoch);

        let supply = self.supply();
        self.state.ledger.scale_variables(supply, shares, assets, false)?;
        self.state.shares.burn(owner, shares)?;
        self.touch(owner);

        self.emit(VaultEvent::Withdraw {
            sender: *caller,
            receiver: *receiver,
            owner: *owner,
            assets,
            shares,
        });
        self.pay_assets(receiver, assets)
    }

    fn execute_transfer(&mut self, from: &Pubkey, to: &Pubkey, shares: i128) -> VaultResult<()> {
        let balance = self.state.shares.balance_of(from);
        if shares > balance {
            return Err(VaultError::InsufficientBalance);
        }
        let committed = self
            .state
            .withdrawals
            .total_shares_being_withdrawn(from, self.state.epoch.current_epoch);
        if balance - shares < committed {
            return Err(VaultError::PendingWithdrawal);
        }

        self.state.shares.move_shares(from, to, shares)?;
        self.touch(from);
        self.touch(to);
        self.emit(VaultEvent::Transfer {
            from: *from,
            to: *to,
            shares,
        });
        Ok(())
    }

    fn execute_discount_and_lock(
        &mut self,
        ctx: &CallContext,
        assets: i128,
        assets_deposited: i128,
        shares: i128,
        lock_duration: u64,
        owner: &Pubkey,
    ) -> VaultResult<u64> {
        if assets <= assets_deposited {
            return Err(VaultError::NoDiscount);
        }
        let assets_discount = assets - assets_deposited;
        let deposit = LockedDeposit {
            owner: *owner,
            shares,
            assets_deposited,
            assets_discount,
            at_timestamp: ctx.now,
            lock_duration,
        };
        let deposit_id = self.state.locked.insert(deposit);

        self.try_update_current_max_supply(ctx.now)?;
        self.state.ledger.record_discount(assets_discount)?;

        let vault = self.address;
        self.execute_deposit(&ctx.caller, &vault, assets_deposited, shares)?;
        self.emit(VaultEvent::DepositLocked {
            sender: ctx.caller,
            owner: *owner,
            deposit_id,
            deposit,
        });
        self.poke_open_pnl_feed();
        Ok(deposit_id)
    }

    fn publish_share_price(&mut self) -> VaultResult<()> {
        let price = self.state.ledger.update_share_to_assets_price()?;
        self.emit(VaultEvent::ShareToAssetsPriceUpdated { price });
        Ok(())
    }

    fn try_reset_daily_acc_pnl_delta(&mut self, now: u64) {
        if self.state.governor.try_reset_daily_acc_pnl_delta(now) {
            self.emit(VaultEvent::DailyAccPnlDeltaReset { at: now });
        }
    }

    fn try_reset_daily_minted_hs(&mut self, now: u64) {
        if self.state.governor.try_reset_daily_minted_hs(now) {
            self.emit(VaultEvent::DailyMintedHsReset { at: now });
        }
    }

    fn try_update_current_max_supply(&mut self, now: u64) -> VaultResult<()> {
        let supply = self.supply();
        let increase_p = self.state.params.risk.max_supply_increase_daily_p;
        if let Some(current_max_supply) = self
            .state
            .governor
            .try_update_current_max_supply(now, supply, increase_p)?
        {
            self.emit(VaultEvent::CurrentMaxSupplyUpdated { current_max_supply });
        }
        Ok(())
    }

    /// Ask the feed to request the next epoch values; failures are only reported
    fn poke_open_pnl_feed(&mut self) {
        if let Err(e) = self.io.feed.request_next_epoch_values_or_advance() {
            log::warn!("open pnl feed request failed: {}", e);
            self.emit(VaultEvent::OpenPnlFeedCallFailed { reason: e.to_string() });
        }
    }

    fn backing_price(&self) -> VaultResult<i128> {
        let price = self.io.oracle.price(&self.oracle_request)?;
        if price == 0 {
            return Err(VaultError::ZeroOraclePrice);
        }
        Ok(to_signed(price)?)
    }

    fn pull_assets(&mut self, from: &Pubkey, assets: i128) -> VaultResult<()> {
        let amount = to_unsigned(assets)?;
        if amount == 0 {
            return Ok(());
        }
        self.io.asset.transfer_from(from, &self.address, amount)?;
        Ok(())
    }

    fn pay_assets(&mut self, to: &Pubkey, assets: i128) -> VaultResult<()> {
        let amount = to_unsigned(assets)?;
        if amount == 0 {
            return Ok(());
        }
        self.io.asset.transfer(to, amount)?;
        Ok(())
    }
}
