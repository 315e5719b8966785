//! Collateral Vault Keeper
//!
//! Hosts a vault in a single-writer service and keeps it balanced: drains
//! the deplete buffer while over-collateralized and refills the shortfall
//! while under-collateralized.

mod config;
mod rebalance;
mod service;

use anyhow::{Context, Result};
use collateral_vault::sim::{InMemoryAsset, InMemoryBacking, ManualFeed, StaticOracle};
use collateral_vault::{AssetToken, CallContext, Collaborators, Pubkey, Vault, VaultConfig};
use config::{tokens, Config};
use rebalance::{plan, KeeperBalances, RebalanceAction, RebalancePolicy};
use service::{VaultHandle, VaultService};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time;

/// Handles onto the in-memory collaborators the keeper inspects
struct LocalLedgers {
    asset: InMemoryAsset,
    backing: InMemoryBacking,
    oracle_price: u128,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Collateral Vault Keeper");

    // `vault-keeper --write-default-config <path>`
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let [flag, path] = args.as_slice() {
        if flag == "--write-default-config" {
            return Config::write_default(path);
        }
    }

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using default local config", e);
        Config::default_local()
    });

    let keeper = config.keeper_pubkey()?;
    log::info!("Vault account: {}", config.vault_address);
    log::info!("Keeper identity: {}", config.keeper_identity);

    let (vault, ledgers) = build_local_vault(&config, &keeper)?;
    let (handle, _task) = VaultService::spawn(vault, config.channel_capacity);

    let policy = RebalancePolicy {
        min_deplete_assets: config.min_deplete_assets(),
        max_refill_assets_per_tick: config.max_refill_assets_per_tick(),
    };

    log::info!("Keeper service started. Polling every {}s", config.poll_interval_secs);

    // Main event loop
    let mut interval = time::interval(Duration::from_secs(config.poll_interval_secs));

    loop {
        interval.tick().await;

        if let Err(e) = process_tick(&handle, &ledgers, &keeper, &policy).await {
            log::error!("Error processing rebalance tick: {:#}", e);
        }

        if config.log_events {
            match handle.drain_events().await {
                Ok(events) => {
                    for event in events {
                        log::info!("{}", serde_json::to_string(&event)?);
                    }
                }
                Err(e) => log::error!("Failed to drain events: {}", e),
            }
        }
    }
}

/// Plan and submit at most one rebalance action
async fn process_tick(
    handle: &VaultHandle,
    ledgers: &LocalLedgers,
    keeper: &Pubkey,
    policy: &RebalancePolicy,
) -> Result<()> {
    let status = handle.status().await.context("Failed to read vault status")?;
    log::debug!(
        "epoch {} price {} collateralization {} buffer {}",
        status.current_epoch,
        status.share_to_assets_price,
        status.collateralization_p,
        status.assets_to_deplete
    );

    let balances = KeeperBalances {
        assets: ledgers.asset.balance_of(keeper),
        backing: ledgers.backing.balance_of(keeper),
    };

    let action = match plan(&status, balances, ledgers.oracle_price, policy) {
        Some(action) => action,
        None => {
            log::debug!("Nothing to rebalance");
            return Ok(());
        }
    };

    let ctx = CallContext::new(*keeper, unix_now());
    match action {
        RebalanceAction::Deplete(assets) => {
            let burned = handle.deplete(ctx, assets).await.context("Deplete failed")?;
            log::info!("Depleted {} assets, burned {} backing tokens", assets, burned);
        }
        RebalanceAction::Refill(assets) => {
            let minted = handle.refill(ctx, assets).await.context("Refill failed")?;
            log::info!("Refilled {} assets, minted {} backing tokens", assets, minted);
        }
    }
    Ok(())
}

/// Vault over in-memory collaborators, seeded from the `[local]` section
fn build_local_vault(config: &Config, keeper: &Pubkey) -> Result<(Vault, LocalLedgers)> {
    let address = config.vault_pubkey()?;
    let local = &config.local;

    let asset = InMemoryAsset::new(address);
    asset.credit(keeper, tokens(local.keeper_asset_tokens));

    let backing = InMemoryBacking::new();
    backing.credit(keeper, tokens(local.keeper_backing_tokens));
    backing.credit(&address, tokens(local.backing_float_tokens));

    let oracle_price = u128::from(local.backing_price);
    let io = Collaborators {
        asset: Box::new(asset.clone()),
        backing: Box::new(backing.clone()),
        oracle: Box::new(StaticOracle::new(oracle_price)),
        feed: Box::new(ManualFeed::new()),
        observer: None,
        policy: Box::new(config.role_registry()?),
    };

    let vault_config = VaultConfig {
        address,
        params: config.vault_params()?,
        oracle_request: Vec::new(),
    };
    let vault = Vault::new(vault_config, io).context("Failed to create vault")?;

    Ok((vault, LocalLedgers { asset, backing, oracle_price }))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
