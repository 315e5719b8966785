//! Vault scenarios
//!
//! End-to-end flows through the public vault API with in-memory
//! collaborators: pricing, withdraw epochs, rebalancing, locked deposits and
//! rollback on failure.

use collateral_vault::constants::{MAX_LOCK_DURATION, MIN_LOCK_DURATION};
use collateral_vault::*;
use vault_integration_tests::*;
use vault_math::{HS_PRECISION, MathError, ONE_HUNDRED_P, PRECISION};

const P: i128 = PRECISION;

// ============================================================================
// Pricing
// ============================================================================

#[test]
fn test_closed_pnl_reaches_price_only_at_settlement() {
    let mut tv = TestVault::new();
    assert_eq!(tv.deposit(ALICE, units(1_000)), units(1_000));

    tv.send_assets(units(100), BOB).unwrap();
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token, P / 10);
    assert_eq!(tv.vault.share_to_assets_price(), P);

    tv.settle_epochs(1);
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token_used, P / 10);
    assert_eq!(tv.vault.share_to_assets_price(), P * 9 / 10);
    assert_eq!(tv.vault.collateralization_p().unwrap(), 90 * P);
    assert_eq!(tv.vault.current_epoch(), 2);
    assert_eq!(tv.asset.balance_of(&BOB), units(1_000_100));
}

#[test]
fn test_reward_raises_price() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    let ctx = tv.ctx(CAROL);
    tv.vault.distribute_reward(&ctx, units(100)).unwrap();

    assert_eq!(tv.vault.state().ledger.acc_rewards_per_token, P / 10);
    assert_eq!(tv.vault.share_to_assets_price(), P * 11 / 10);
    assert_eq!(tv.vault.collateralization_p().unwrap(), ONE_HUNDRED_P);
    assert_eq!(tv.vault.tvl().unwrap(), 1_100 * P);
    assert_eq!(tv.vault.total_assets().unwrap(), 1_100 * P);
    assert!(tv.event_names().ends_with(&["ShareToAssetsPriceUpdated", "RewardDistributed"]));
}

#[test]
fn test_reward_without_shares_fails() {
    let mut tv = TestVault::new();
    let ctx = tv.ctx(CAROL);
    let err = tv.vault.distribute_reward(&ctx, units(1)).unwrap_err();
    assert_eq!(err, VaultError::Math(MathError::DivisionByZero));
    assert_eq!(err.kind(), ErrorKind::Math);
}

#[test]
fn test_views_after_loss_snapshot() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.send_assets(units(100), BOB).unwrap();
    tv.settle_epochs(1);

    assert_eq!(tv.vault.available_assets().unwrap(), 900 * P);
    assert_eq!(tv.vault.market_cap().unwrap(), 900 * P);
    assert_eq!(tv.vault.preview_deposit(units(90)).unwrap(), units(100));
    assert_eq!(tv.vault.preview_redeem(units(100)).unwrap(), units(90));

    let status = tv.vault.status().unwrap();
    assert_eq!(status.refill_capacity, 100 * P);
    assert_eq!(status.current_epoch, 2);
    assert!(serde_json::to_string(&status).unwrap().contains("\"current_epoch\":2"));
}

#[test]
fn test_share_flows_keep_price_after_gains() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.receive_assets(units(70), CAROL).unwrap();
    tv.settle_epochs(1);
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token, -P * 7 / 100);
    assert_eq!(tv.vault.share_to_assets_price(), P);

    // Gains are spread over the larger supply
    assert_eq!(tv.deposit(BOB, units(1_000)), units(1_000));
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token, -P * 35 / 1_000);
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token_used, -P * 7 / 100);
    assert_eq!(tv.vault.share_to_assets_price(), P);

    tv.request_and_unlock(BOB, units(1_000));
    let ctx = tv.ctx(BOB);
    assert_eq!(tv.vault.redeem(&ctx, units(1_000), &BOB, &BOB).unwrap(), units(1_000));
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token, -P * 7 / 100);
    assert_eq!(tv.vault.share_to_assets_price(), P);
}

#[test]
fn test_share_flows_keep_price_after_losses() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.send_assets(units(50), CAROL).unwrap();
    tv.settle_epochs(1);
    assert_eq!(tv.vault.share_to_assets_price(), P * 95 / 100);
    assert_eq!(tv.vault.state().ledger.total_liability, 50 * P);

    // The liability grows with the supply, the per-share loss does not
    assert_eq!(tv.deposit(BOB, units(95)), units(100));
    let ledger = &tv.vault.state().ledger;
    assert_eq!(ledger.total_liability, 55 * P);
    assert_eq!(ledger.acc_pnl_per_token, P * 5 / 100);
    assert_eq!(ledger.acc_pnl_per_token_used, P * 5 / 100);
    assert_eq!(tv.vault.share_to_assets_price(), P * 95 / 100);
    assert_eq!(tv.vault.collateralization_p().unwrap(), 95 * P);
}

// ============================================================================
// Open PnL settlement
// ============================================================================

#[test]
fn test_settlement_delta_is_clamped() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    let ctx = tv.ctx(FEED);
    // Cap is 0.05 per share: 50 assets over 1000 shares
    let recorded = tv.vault.settle_open_pnl(&ctx, 0, units(80)).unwrap();
    assert_eq!(recorded, units(50));
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token_used, P / 20);
    assert_eq!(tv.vault.state().epoch.current_epoch_positive_open_pnl, 50 * P);
    assert_eq!(tv.vault.share_to_assets_price(), P * 95 / 100);

    // Decreases are not clamped
    let recorded = tv.vault.settle_open_pnl(&ctx, units(50), units(20)).unwrap();
    assert_eq!(recorded, units(20));
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token_used, P / 50);
    assert_eq!(tv.vault.current_epoch(), 3);
}

#[test]
fn test_settlement_without_shares_still_advances() {
    let mut tv = TestVault::new();
    let ctx = tv.ctx(FEED);
    assert_eq!(tv.vault.settle_open_pnl(&ctx, 0, units(10)).unwrap(), 0);
    assert_eq!(tv.vault.current_epoch(), 2);
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token_used, 0);
}

#[test]
fn test_settlement_event() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.vault.drain_events();

    let ctx = tv.ctx(FEED);
    tv.vault.settle_open_pnl(&ctx, units(5), units(15)).unwrap();

    let events = tv.vault.drain_events();
    let settled = events
        .iter()
        .find(|e| e.name() == "AccPnlPerTokenUsedUpdated")
        .unwrap();
    assert_eq!(
        settled,
        &VaultEvent::AccPnlPerTokenUsedUpdated {
            sender: FEED,
            new_epoch: 2,
            prev_positive_open_pnl: 5 * P,
            new_positive_open_pnl: 15 * P,
            new_epoch_positive_open_pnl: 15 * P,
            new_acc_pnl_per_token_used: P / 100,
        }
    );
}

// ============================================================================
// Closed PnL limits
// ============================================================================

#[test]
fn test_daily_pnl_cap_resets_after_a_day() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    tv.send_assets(units(100), BOB).unwrap();
    assert_eq!(tv.send_assets(units(1), BOB), Err(VaultError::MaxDailyPnl));

    tv.advance_time(DAY - 1);
    assert_eq!(tv.send_assets(units(1), BOB), Err(VaultError::MaxDailyPnl));

    tv.advance_time(1);
    tv.send_assets(units(1), BOB).unwrap();
    assert_eq!(tv.vault.state().governor.daily_acc_pnl_delta, P / 1_000);
    assert!(tv.event_names().contains(&"DailyAccPnlDeltaReset"));
}

#[test]
fn test_send_above_max_acc_pnl_fails() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    let mut risk = tv.vault.params().risk;
    risk.max_daily_acc_pnl_delta = 2 * P;
    let ctx = tv.ctx(MANAGER);
    tv.vault.update_risk_params(&ctx, risk).unwrap();

    assert_eq!(tv.send_assets(units(1_001), BOB), Err(VaultError::NotEnoughAssets));
    tv.send_assets(units(1_000), BOB).unwrap();
}

#[test]
fn test_send_and_receive_poke_feed() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.send_assets(units(10), BOB).unwrap();
    assert_eq!(tv.feed.pokes(), 1);

    tv.receive_assets(units(10), BOB).unwrap();
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token, 0);
    assert_eq!(tv.vault.state().ledger.total_closed_pnl, 0);
}

#[test]
fn test_only_pnl_handler_moves_closed_pnl() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    let ctx = tv.ctx(ALICE);
    assert_eq!(
        tv.vault.receive_assets(&ctx, units(1), &ALICE),
        Err(VaultError::Unauthorized(Role::PnlHandler))
    );
}

// ============================================================================
// Withdraw epochs
// ============================================================================

#[test]
fn test_deposit_then_redeem_returns_deposit() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    let shares = tv.deposit(BOB, 123_456_789_012_345_678_901);

    tv.request_and_unlock(BOB, shares);
    assert_eq!(tv.vault.max_redeem(&BOB), shares);

    let ctx = tv.ctx(BOB);
    let assets = tv.vault.redeem(&ctx, shares, &BOB, &BOB).unwrap();
    assert!(assets <= 123_456_789_012_345_678_901);
    assert!(123_456_789_012_345_678_901 - assets <= 1);
    assert_eq!(tv.vault.share_to_assets_price(), P);
    assert_eq!(tv.vault.balance_of(&BOB), 0);
}

#[test]
fn test_two_requests_both_count_and_cancel_reduces() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.deposit(BOB, units(1_000));

    let ctx = tv.ctx(ALICE);
    assert_eq!(tv.vault.request_withdraw(&ctx, units(300), &ALICE).unwrap(), 4);
    tv.settle_epochs(1);
    assert_eq!(tv.vault.request_withdraw(&ctx, units(200), &ALICE).unwrap(), 5);
    assert_eq!(tv.vault.total_shares_being_withdrawn(&ALICE), units(500));

    tv.vault.cancel_withdraw_request(&ctx, units(200), &ALICE, 5).unwrap();
    assert_eq!(tv.vault.total_shares_being_withdrawn(&ALICE), units(300));
    assert_eq!(tv.vault.withdraw_request(&ALICE, 5), 0);

    assert_eq!(
        tv.vault.cancel_withdraw_request(&ctx, units(301), &ALICE, 4),
        Err(VaultError::MoreThanWithdrawAmount)
    );
    assert_eq!(
        tv.vault.request_withdraw(&ctx, units(701), &ALICE),
        Err(VaultError::MoreThanBalance)
    );
    assert!(tv.event_names().contains(&"WithdrawCanceled"));
}

#[test]
fn test_redeem_only_in_unlock_epoch() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.deposit(BOB, units(1_000));

    let ctx = tv.ctx(ALICE);
    tv.vault.request_withdraw(&ctx, units(100), &ALICE).unwrap();
    tv.settle_epochs(2);
    assert_eq!(tv.vault.max_redeem(&ALICE), 0);
    let ctx = tv.ctx(ALICE);
    assert_eq!(
        tv.vault.redeem(&ctx, units(100), &ALICE, &ALICE),
        Err(VaultError::ExceedsMaxRedeem)
    );

    tv.settle_epochs(1);
    assert_eq!(tv.vault.max_redeem(&ALICE), units(100));
    assert_eq!(tv.vault.max_withdraw(&ALICE).unwrap(), units(100));

    // Missed the window: the request is stale
    tv.settle_epochs(1);
    assert_eq!(tv.vault.max_redeem(&ALICE), 0);
    assert_eq!(tv.vault.total_shares_being_withdrawn(&ALICE), 0);
}

#[test]
fn test_missed_requests_are_cleared() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.deposit(BOB, units(1_000));

    // Epoch 1 request unlocks at 4, epoch 2 request at 5
    let ctx = tv.ctx(ALICE);
    tv.vault.request_withdraw(&ctx, units(10), &ALICE).unwrap();
    tv.settle_epochs(1);
    let ctx = tv.ctx(ALICE);
    tv.vault.request_withdraw(&ctx, units(20), &ALICE).unwrap();
    assert_eq!(
        tv.vault.state().withdrawals.pending_requests(&ALICE),
        vec![(4, units(10) as i128), (5, units(20) as i128)]
    );

    // Epoch 5: the first request is past its window
    tv.settle_epochs(3);
    let ctx = tv.ctx(ALICE);
    tv.vault.redeem(&ctx, units(20), &ALICE, &ALICE).unwrap();
    assert!(tv.vault.state().withdrawals.pending_requests(&ALICE).is_empty());

    // A new request clears stale slots too
    let ctx = tv.ctx(BOB);
    tv.vault.request_withdraw(&ctx, units(5), &BOB).unwrap();
    tv.settle_epochs(4);
    let ctx = tv.ctx(BOB);
    tv.vault.request_withdraw(&ctx, units(7), &BOB).unwrap();
    assert_eq!(
        tv.vault.state().withdrawals.pending_requests(&BOB),
        vec![(12, units(7) as i128)]
    );
}

#[test]
fn test_last_share_cannot_be_redeemed() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(10));
    tv.request_and_unlock(ALICE, units(10));
    assert_eq!(tv.vault.max_redeem(&ALICE), units(10) - 1);
}

#[test]
fn test_withdraw_exact_assets() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.deposit(BOB, units(1_000));
    tv.request_and_unlock(ALICE, units(100));

    let ctx = tv.ctx(ALICE);
    assert_eq!(
        tv.vault.withdraw(&ctx, units(101), &ALICE, &ALICE),
        Err(VaultError::ExceedsMaxWithdraw)
    );
    let shares = tv.vault.withdraw(&ctx, units(60), &CAROL, &ALICE).unwrap();
    assert_eq!(shares, units(60));
    assert_eq!(tv.vault.withdraw_request(&ALICE, tv.vault.current_epoch()), units(40));
    assert_eq!(tv.asset.balance_of(&CAROL), units(1_000_060));
}

#[test]
fn test_operator_needs_allowance() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.deposit(BOB, units(1_000));

    let ctx = tv.ctx(ALICE);
    tv.vault.approve(&ctx, &BOB, units(500)).unwrap();

    let carol = tv.ctx(CAROL);
    assert_eq!(
        tv.vault.request_withdraw(&carol, units(1), &ALICE),
        Err(VaultError::NotAllowed)
    );

    let bob = tv.ctx(BOB);
    tv.vault.request_withdraw(&bob, units(300), &ALICE).unwrap();
    // Requesting does not spend the allowance
    assert_eq!(tv.vault.allowance(&ALICE, &BOB), units(500));

    tv.settle_epochs(3);
    let bob = tv.ctx(BOB);
    let assets = tv.vault.redeem(&bob, units(300), &BOB, &ALICE).unwrap();
    assert_eq!(assets, units(300));
    assert_eq!(tv.vault.allowance(&ALICE, &BOB), units(200));
    assert_eq!(tv.vault.balance_of(&ALICE), units(700));
}

#[test]
fn test_transfer_respects_pending_withdrawals() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    let ctx = tv.ctx(ALICE);
    tv.vault.request_withdraw(&ctx, units(300), &ALICE).unwrap();

    assert_eq!(
        tv.vault.transfer(&ctx, &CAROL, units(701)),
        Err(VaultError::PendingWithdrawal)
    );
    assert_eq!(
        tv.vault.transfer(&ctx, &CAROL, units(1_001)),
        Err(VaultError::InsufficientBalance)
    );
    tv.vault.transfer(&ctx, &CAROL, units(700)).unwrap();
    assert_eq!(tv.vault.balance_of(&CAROL), units(700));

    // Same rule on behalf of the owner
    tv.vault.approve(&ctx, &BOB, u128::MAX >> 1).unwrap();
    let bob = tv.ctx(BOB);
    assert_eq!(
        tv.vault.transfer_from(&bob, &ALICE, &BOB, units(1)),
        Err(VaultError::PendingWithdrawal)
    );
}

#[test]
fn test_transfer_from_spends_allowance() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    let ctx = tv.ctx(ALICE);
    tv.vault.approve(&ctx, &BOB, units(10)).unwrap();
    let bob = tv.ctx(BOB);
    tv.vault.transfer_from(&bob, &ALICE, &CAROL, units(4)).unwrap();
    assert_eq!(tv.vault.allowance(&ALICE, &BOB), units(6));
    assert_eq!(
        tv.vault.transfer_from(&bob, &ALICE, &CAROL, units(7)),
        Err(VaultError::InsufficientAllowance)
    );
}

#[test]
fn test_max_approval_is_unlimited() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    let ctx = tv.ctx(ALICE);
    tv.vault.approve(&ctx, &BOB, u128::MAX).unwrap();
    assert_eq!(tv.vault.allowance(&ALICE, &BOB), i128::MAX as u128);

    let bob = tv.ctx(BOB);
    tv.vault.transfer_from(&bob, &ALICE, &CAROL, units(4)).unwrap();
    tv.vault.transfer_from(&bob, &ALICE, &CAROL, units(6)).unwrap();
    assert_eq!(tv.vault.allowance(&ALICE, &BOB), i128::MAX as u128);
    assert_eq!(tv.vault.balance_of(&CAROL), units(10));
}

#[test]
fn test_pending_epoch_request_blocks_entry_and_exit() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.deposit(BOB, units(1_000));
    tv.request_and_unlock(ALICE, units(100));

    tv.feed.set_pending_requests(1);
    let ctx = tv.ctx(ALICE);
    assert_eq!(tv.vault.deposit(&ctx, units(1), &ALICE), Err(VaultError::EpochRequestPending));
    assert_eq!(tv.vault.mint(&ctx, units(1), &ALICE), Err(VaultError::EpochRequestPending));
    assert_eq!(
        tv.vault.request_withdraw(&ctx, units(1), &ALICE),
        Err(VaultError::EpochRequestPending)
    );
    assert_eq!(tv.vault.max_redeem(&ALICE), 0);
    assert_eq!(
        tv.vault.redeem(&ctx, units(100), &ALICE, &ALICE),
        Err(VaultError::ExceedsMaxRedeem)
    );

    tv.feed.set_pending_requests(0);
    tv.vault.redeem(&ctx, units(100), &ALICE, &ALICE).unwrap();
}

// ============================================================================
// Supply cap
// ============================================================================

#[test]
fn test_max_supply_limits_deposits_while_under_collateralized() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    assert_eq!(tv.vault.max_mint(), i128::MAX as u128);

    tv.send_assets(units(100), CAROL).unwrap();
    tv.settle_epochs(1);
    assert_eq!(tv.vault.state().governor.current_max_supply, 1_100 * P);
    assert_eq!(tv.vault.max_mint(), units(100));
    assert_eq!(tv.vault.max_deposit().unwrap(), units(90));

    let ctx = tv.ctx(BOB);
    assert_eq!(tv.vault.deposit(&ctx, units(91), &BOB), Err(VaultError::ExceedsMaxDeposit));
    assert_eq!(tv.vault.mint(&ctx, units(101), &BOB), Err(VaultError::ExceedsMaxMint));
    assert_eq!(tv.vault.deposit(&ctx, units(90), &BOB).unwrap(), units(100));
    assert_eq!(tv.vault.max_mint(), 0);
}

#[test]
fn test_mint_rounds_assets_up() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    let ctx = tv.ctx(CAROL);
    // Price 1.1: 3 wei of shares cost 3.3 wei
    tv.vault.distribute_reward(&ctx, units(100)).unwrap();

    let ctx = tv.ctx(BOB);
    assert_eq!(tv.vault.preview_mint(3).unwrap(), 4);
    assert_eq!(tv.vault.mint(&ctx, 3, &BOB).unwrap(), 4);
    assert_eq!(tv.vault.preview_withdraw(4).unwrap(), 4);
}

// ============================================================================
// Deplete and refill
// ============================================================================

/// Over-collateralized vault with 25 assets in the deplete buffer
fn vault_with_deplete_buffer() -> TestVault {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.receive_assets(units(100), BOB).unwrap();
    tv.settle_epochs(1);
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token_used, -P / 10);
    assert_eq!(tv.vault.share_to_assets_price(), P);

    tv.receive_assets(units(100), BOB).unwrap();
    tv
}

#[test]
fn test_losses_divert_to_deplete_buffer() {
    let tv = vault_with_deplete_buffer();
    assert_eq!(tv.vault.assets_to_deplete(), 25 * P);
    // Only 75 reached the per-share value
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token, -(P / 10) - (P * 75 / 1_000));
    assert_eq!(tv.vault.collateralization_p().unwrap(), 110 * P);
}

#[test]
fn test_deplete_buys_out_buffer() {
    let mut tv = vault_with_deplete_buffer();
    tv.oracle.set_price(3 * HS_PRECISION as u128);

    let ctx = tv.ctx(KEEPER);
    assert_eq!(tv.vault.deplete(&ctx, units(25) + 1), Err(VaultError::DepleteTooBig));

    let burned = tv.vault.deplete(&ctx, units(25)).unwrap();
    assert_eq!(burned, 8_333_333_333_333_333_334);
    assert_eq!(tv.vault.assets_to_deplete(), 0);
    assert_eq!(tv.asset.balance_of(&KEEPER), units(1_000_025));
    assert_eq!(tv.backing.balance_of(&KEEPER), units(10_000) - burned);
    assert_eq!(tv.vault.state().ledger.total_depleted, 25 * P);
}

#[test]
fn test_deplete_payout_failure_restores_backing() {
    let mut tv = vault_with_deplete_buffer();
    let before = tv.vault.state().clone();
    let events = tv.vault.events().len();

    tv.asset.fail_transfers(Some("halted"));
    let ctx = tv.ctx(KEEPER);
    let err = tv.vault.deplete(&ctx, units(25)).unwrap_err();

    assert_eq!(err, VaultError::External(ExternalError::AssetTransfer("halted".into())));
    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(tv.backing.balance_of(&KEEPER), units(10_000));
    assert_eq!(tv.vault.state(), &before);
    assert_eq!(tv.vault.events().len(), events);
}

#[test]
fn test_deplete_needs_oracle_price() {
    let mut tv = vault_with_deplete_buffer();
    let ctx = tv.ctx(KEEPER);

    tv.oracle.set_price(0);
    assert_eq!(tv.vault.deplete(&ctx, units(1)), Err(VaultError::ZeroOraclePrice));

    tv.oracle.fail("stale");
    assert_eq!(
        tv.vault.deplete(&ctx, units(1)),
        Err(VaultError::External(ExternalError::Oracle("stale".into())))
    );
    assert_eq!(tv.vault.assets_to_deplete(), 25 * P);
}

/// Under-collateralized vault owing 0.1 per share over 1000 shares
fn vault_with_shortfall() -> TestVault {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    tv.send_assets(units(100), BOB).unwrap();
    tv.settle_epochs(1);
    tv
}

#[test]
fn test_refill_requires_shortfall() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    let ctx = tv.ctx(KEEPER);
    let err = tv.vault.refill(&ctx, units(1)).unwrap_err();
    assert_eq!(err, VaultError::NotUnderCollateralized);
    assert_eq!(err.kind(), ErrorKind::Capacity);
}

#[test]
fn test_refill_covers_shortfall() {
    let mut tv = vault_with_shortfall();
    let ctx = tv.ctx(KEEPER);

    assert_eq!(tv.vault.refill(&ctx, units(101)), Err(VaultError::RefillTooBig));

    let minted = tv.vault.refill(&ctx, units(40)).unwrap();
    assert_eq!(minted, units(40));
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token, P * 6 / 100);
    assert_eq!(tv.vault.state().ledger.acc_pnl_per_token_used, P * 6 / 100);
    assert_eq!(tv.vault.share_to_assets_price(), P * 94 / 100);
    assert_eq!(tv.asset.balance_of(&KEEPER), units(1_000_000 - 40));
    assert_eq!(tv.backing.balance_of(&KEEPER), units(10_040));
    assert_eq!(tv.vault.state().governor.daily_minted_hs, 40 * P);
}

#[test]
fn test_refill_inflation_limit() {
    let mut tv = vault_with_shortfall();
    // Backing at 0.01: 40 assets mint 4000 tokens, above 0.05% of supply
    tv.oracle.set_price(HS_PRECISION as u128 / 100);
    let ctx = tv.ctx(KEEPER);
    assert_eq!(tv.vault.refill(&ctx, units(40)), Err(VaultError::AboveInflationLimit));
}

#[test]
fn test_refill_mint_failure_refunds_assets() {
    let mut tv = vault_with_shortfall();
    let before = tv.vault.state().clone();

    tv.backing.fail_mints(Some("paused"));
    let ctx = tv.ctx(KEEPER);
    let err = tv.vault.refill(&ctx, units(40)).unwrap_err();

    assert_eq!(err, VaultError::External(ExternalError::BackingToken("paused".into())));
    assert_eq!(tv.asset.balance_of(&KEEPER), units(1_000_000));
    assert_eq!(tv.vault.state(), &before);
}

// ============================================================================
// Locked deposits
// ============================================================================

#[test]
fn test_locked_deposit_lifecycle() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    let ctx = tv.ctx(BOB);
    let id = tv
        .vault
        .deposit_with_discount_and_lock(&ctx, units(95), MAX_LOCK_DURATION, &BOB)
        .unwrap();
    assert_eq!(id, 1);

    let deposit = tv.vault.locked_deposit(id).unwrap();
    assert_eq!(deposit.shares, 100 * P);
    assert_eq!(deposit.assets_deposited, 95 * P);
    assert_eq!(deposit.assets_discount, 5 * P);
    assert_eq!(tv.vault.balance_of(&VAULT), units(100));
    assert_eq!(tv.asset.balance_of(&BOB), units(1_000_000 - 95));
    assert_eq!(tv.vault.state().ledger.total_locked_discounts, 5 * P);
    assert!(tv.event_names().contains(&"DepositLocked"));

    assert_eq!(tv.vault.unlock_deposit(&ctx, id, &BOB), Err(VaultError::DepositStillLocked));

    tv.advance_time(MAX_LOCK_DURATION);
    let carol = tv.ctx(CAROL);
    assert_eq!(tv.vault.unlock_deposit(&carol, id, &CAROL), Err(VaultError::NotAllowed));

    let ctx = tv.ctx(BOB);
    tv.vault.unlock_deposit(&ctx, id, &BOB).unwrap();
    assert_eq!(tv.vault.balance_of(&BOB), units(100));
    assert_eq!(tv.vault.balance_of(&VAULT), 0);

    let ledger = &tv.vault.state().ledger;
    // 5 assets over 1100 shares, rounded up
    assert_eq!(ledger.acc_pnl_per_token, 4_545_454_545_454_546);
    assert_eq!(ledger.total_liability, 5 * P);
    assert_eq!(ledger.total_locked_discounts, 0);
    assert_eq!(ledger.total_discounts, 5 * P);
    assert_eq!(
        tv.vault.locked_deposit(id),
        Err(VaultError::UnknownLockedDeposit(id))
    );
}

#[test]
fn test_mint_with_discount_and_lock() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));

    let ctx = tv.ctx(BOB);
    let id = tv
        .vault
        .mint_with_discount_and_lock(&ctx, units(100), MAX_LOCK_DURATION, &BOB)
        .unwrap();
    let deposit = tv.vault.locked_deposit(id).unwrap();
    assert_eq!(deposit.assets_deposited, 95 * P);
    assert_eq!(deposit.assets_discount, 5 * P);

    // Shorter locks earn proportionally less
    let id = tv
        .vault
        .mint_with_discount_and_lock(&ctx, units(100), MIN_LOCK_DURATION, &BOB)
        .unwrap();
    let short = tv.vault.locked_deposit(id).unwrap();
    assert!(short.assets_discount > 0);
    assert!(short.assets_discount < deposit.assets_discount);
}

#[test]
fn test_lock_duration_bounds_and_discount_switch() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    let ctx = tv.ctx(BOB);

    assert_eq!(
        tv.vault.deposit_with_discount_and_lock(&ctx, units(10), MIN_LOCK_DURATION - 1, &BOB),
        Err(VaultError::LockBelowMin)
    );
    assert_eq!(
        tv.vault.deposit_with_discount_and_lock(&ctx, units(10), MAX_LOCK_DURATION + 1, &BOB),
        Err(VaultError::LockAboveMax)
    );

    let mut rebalance = tv.vault.params().rebalance;
    rebalance.max_discount_p = 0;
    let admin = tv.ctx(ADMIN);
    tv.vault.update_rebalance_params(&admin, rebalance).unwrap();
    assert_eq!(
        tv.vault.deposit_with_discount_and_lock(&ctx, units(10), MAX_LOCK_DURATION, &BOB),
        Err(VaultError::NoActiveDiscount)
    );
}

#[test]
fn test_no_discount_when_well_collateralized() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    // Snapshot at -0.1 per share: 110% collateralization
    tv.receive_assets(units(100), BOB).unwrap();
    tv.settle_epochs(1);
    assert_eq!(tv.vault.lock_discount_p(MAX_LOCK_DURATION).unwrap(), 5 * P / 2);

    // Threshold at 105%: nothing left
    let mut rebalance = tv.vault.params().rebalance;
    rebalance.max_discount_threshold_p = 105 * P;
    let admin = tv.ctx(ADMIN);
    tv.vault.update_rebalance_params(&admin, rebalance).unwrap();

    let ctx = tv.ctx(BOB);
    assert_eq!(
        tv.vault.deposit_with_discount_and_lock(&ctx, units(10), MAX_LOCK_DURATION, &BOB),
        Err(VaultError::NoDiscount)
    );
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_parameter_updates_are_role_gated_and_validated() {
    let mut tv = TestVault::new();
    let mut risk = tv.vault.params().risk;
    risk.max_daily_acc_pnl_delta = P / 5;

    let admin = tv.ctx(ADMIN);
    assert_eq!(
        tv.vault.update_risk_params(&admin, risk),
        Err(VaultError::Unauthorized(Role::Manager))
    );

    let manager = tv.ctx(MANAGER);
    tv.vault.update_risk_params(&manager, risk).unwrap();
    assert_eq!(tv.vault.params().risk.max_daily_acc_pnl_delta, P / 5);
    assert_eq!(tv.event_names().last(), Some(&"ParamsUpdated"));

    risk.max_daily_acc_pnl_delta = P / 20;
    assert_eq!(
        tv.vault.update_risk_params(&manager, risk),
        Err(VaultError::InvalidParameter("max_daily_acc_pnl_delta"))
    );

    let rebalance = tv.vault.params().rebalance;
    assert_eq!(
        tv.vault.update_rebalance_params(&manager, rebalance),
        Err(VaultError::Unauthorized(Role::Admin))
    );
}

// ============================================================================
// Atomicity
// ============================================================================

#[test]
fn test_failed_operations_leave_no_trace() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    let before = tv.vault.state().clone();
    let events = tv.vault.events().len();
    let notifications = tv.observer.seen().len();

    // Daily cap: 0.101 per share
    assert_eq!(tv.send_assets(units(101), BOB), Err(VaultError::MaxDailyPnl));
    // Pull fails after the shares were minted
    tv.asset.fail_transfers_from(Some("frozen"));
    let ctx = tv.ctx(BOB);
    assert!(tv.vault.deposit(&ctx, units(10), &BOB).is_err());
    assert_eq!(tv.vault.request_withdraw(&ctx, units(1), &BOB), Err(VaultError::MoreThanBalance));

    assert_eq!(tv.vault.state(), &before);
    assert_eq!(tv.vault.events().len(), events);
    assert_eq!(tv.observer.seen().len(), notifications);
    assert_eq!(tv.asset.balance_of(&BOB), units(1_000_000));
}

#[test]
fn test_zero_amounts_rejected() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    let ctx = tv.ctx(ALICE);

    for result in [
        tv.vault.deposit(&ctx, 0, &ALICE).map(|_| ()),
        tv.vault.mint(&ctx, 0, &ALICE).map(|_| ()),
        tv.vault.request_withdraw(&ctx, 0, &ALICE).map(|_| ()),
        tv.vault.deplete(&ctx, 0).map(|_| ()),
    ] {
        let err = result.unwrap_err();
        assert_eq!(err, VaultError::ZeroAmount);
        assert_eq!(err.kind(), ErrorKind::Precondition);
    }
}

#[test]
fn test_observer_sees_committed_balances() {
    let mut tv = TestVault::new();
    tv.deposit(ALICE, units(1_000));
    let ctx = tv.ctx(ALICE);
    tv.vault.transfer(&ctx, &BOB, units(250)).unwrap();

    assert_eq!(
        tv.observer.seen(),
        vec![(ALICE, units(1_000)), (ALICE, units(750)), (BOB, units(250))]
    );
}
