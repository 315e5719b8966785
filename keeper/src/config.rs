//! Keeper configuration
//!
//! TOML integers are 64-bit, so amounts are whole asset tokens and
//! percentages are basis points. Both are scaled to the vault's fixed-point
//! representation on load.

use anyhow::{anyhow, Context, Result};
use collateral_vault::{Pubkey, RebalanceParams, RiskParams, RoleRegistry, VaultParams};
use serde::{Deserialize, Serialize};
use vault_math::{HS_PRECISION, PRECISION};

/// One basis point of a PRECISION-scaled percentage
const BPS_OF_PERCENT: i128 = PRECISION / 100;
/// One basis point of a PRECISION-scaled per-share value
const BPS_OF_SHARE: i128 = PRECISION / 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Vault account (base58)
    pub vault_address: String,

    /// Keeper identity used as caller for rebalancing (base58)
    pub keeper_identity: String,

    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Smallest deplete worth submitting, in whole asset tokens
    pub min_deplete_tokens: u64,

    /// Largest refill per tick, in whole asset tokens
    pub max_refill_tokens_per_tick: u64,

    /// Log drained vault events as JSON
    pub log_events: bool,

    /// Command channel capacity of the vault service
    pub channel_capacity: usize,

    pub roles: RolesConfig,
    pub risk: RiskSettings,
    pub rebalance: RebalanceSettings,
    pub local: LocalSetup,
}

/// Role holders (base58)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolesConfig {
    pub manager: String,
    pub admin: String,
    pub pnl_handler: String,
    pub open_pnl_feed: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Per-share bps of one share
    pub max_acc_open_pnl_delta_bps: u64,
    /// Per-share bps of one share
    pub max_daily_acc_pnl_delta_bps: u64,
    pub max_supply_increase_daily_bps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceSettings {
    pub losses_burn_bps: u64,
    pub max_hs_supply_mint_daily_bps: u64,
    pub max_discount_bps: u64,
    pub max_discount_threshold_bps: u64,
}

/// Balances seeded into the in-memory collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSetup {
    pub keeper_asset_tokens: u64,
    pub keeper_backing_tokens: u64,
    /// Backing token supply held outside the keeper
    pub backing_float_tokens: u64,
    /// Backing token price in assets, 1e10 scaled
    pub backing_price: u64,
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// The path comes from `VAULT_KEEPER_CONFIG` (default `keeper-config.toml`).
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VAULT_KEEPER_CONFIG")
            .unwrap_or_else(|_| "keeper-config.toml".to_string());
        Self::load_from(&config_path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let expanded = shellexpand::tilde(path);
        let config_str = std::fs::read_to_string(expanded.as_ref())
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config TOML")?;

        config.vault_params().context("Invalid vault parameters")?;
        Ok(config)
    }

    /// Create default configuration for a local in-memory vault
    pub fn default_local() -> Self {
        let params = VaultParams::default();
        Self {
            vault_address: encode_pubkey(&[0x5a; 32]),
            keeper_identity: encode_pubkey(&[0x4b; 32]),
            poll_interval_secs: 5,
            min_deplete_tokens: 1,
            max_refill_tokens_per_tick: 1_000,
            log_events: true,
            channel_capacity: 64,
            roles: RolesConfig {
                manager: encode_pubkey(&[0x01; 32]),
                admin: encode_pubkey(&[0x02; 32]),
                pnl_handler: encode_pubkey(&[0x03; 32]),
                open_pnl_feed: encode_pubkey(&[0x04; 32]),
            },
            risk: RiskSettings {
                max_acc_open_pnl_delta_bps: share_bps(params.risk.max_acc_open_pnl_delta),
                max_daily_acc_pnl_delta_bps: share_bps(params.risk.max_daily_acc_pnl_delta),
                max_supply_increase_daily_bps: percent_bps(params.risk.max_supply_increase_daily_p),
            },
            rebalance: RebalanceSettings {
                losses_burn_bps: percent_bps(params.rebalance.losses_burn_p),
                max_hs_supply_mint_daily_bps: percent_bps(
                    params.rebalance.max_hs_supply_mint_daily_p,
                ),
                max_discount_bps: percent_bps(params.rebalance.max_discount_p),
                max_discount_threshold_bps: percent_bps(params.rebalance.max_discount_threshold_p),
            },
            local: LocalSetup {
                keeper_asset_tokens: 100_000,
                keeper_backing_tokens: 100_000,
                backing_float_tokens: 10_000_000,
                backing_price: HS_PRECISION as u64, // 1.0
            },
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_local();
        let toml_str = toml::to_string_pretty(&config)
            .context("Failed to serialize config")?;

        let expanded = shellexpand::tilde(path);
        std::fs::write(expanded.as_ref(), toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }

    pub fn vault_params(&self) -> Result<VaultParams> {
        let share = |bps: u64| i128::from(bps) * BPS_OF_SHARE;
        let percent = |bps: u64| i128::from(bps) * BPS_OF_PERCENT;
        let (risk, rebalance) = (&self.risk, &self.rebalance);
        let params = VaultParams {
            risk: RiskParams {
                max_acc_open_pnl_delta: share(risk.max_acc_open_pnl_delta_bps),
                max_daily_acc_pnl_delta: share(risk.max_daily_acc_pnl_delta_bps),
                max_supply_increase_daily_p: percent(risk.max_supply_increase_daily_bps),
            },
            rebalance: RebalanceParams {
                losses_burn_p: percent(rebalance.losses_burn_bps),
                max_hs_supply_mint_daily_p: percent(rebalance.max_hs_supply_mint_daily_bps),
                max_discount_p: percent(rebalance.max_discount_bps),
                max_discount_threshold_p: percent(rebalance.max_discount_threshold_bps),
            },
        };
        params.validate()?;
        Ok(params)
    }

    pub fn role_registry(&self) -> Result<RoleRegistry> {
        Ok(RoleRegistry {
            manager: decode_pubkey(&self.roles.manager).context("roles.manager")?,
            admin: decode_pubkey(&self.roles.admin).context("roles.admin")?,
            pnl_handler: decode_pubkey(&self.roles.pnl_handler).context("roles.pnl_handler")?,
            open_pnl_feed: decode_pubkey(&self.roles.open_pnl_feed).context("roles.open_pnl_feed")?,
        })
    }

    pub fn vault_pubkey(&self) -> Result<Pubkey> {
        decode_pubkey(&self.vault_address).context("vault_address")
    }

    pub fn keeper_pubkey(&self) -> Result<Pubkey> {
        decode_pubkey(&self.keeper_identity).context("keeper_identity")
    }

    pub fn min_deplete_assets(&self) -> u128 {
        tokens(self.min_deplete_tokens)
    }

    pub fn max_refill_assets_per_tick(&self) -> u128 {
        tokens(self.max_refill_tokens_per_tick)
    }
}

/// Whole asset tokens to 18-decimal units
pub fn tokens(whole: u64) -> u128 {
    u128::from(whole) * PRECISION as u128
}

pub fn decode_pubkey(s: &str) -> Result<Pubkey> {
    let bytes = bs58::decode(s)
        .into_vec()
        .context(format!("Invalid base58: {}", s))?;
    Pubkey::try_from(bytes.as_slice())
        .map_err(|_| anyhow!("Expected 32 bytes, got {}", bytes.len()))
}

pub fn encode_pubkey(key: &Pubkey) -> String {
    bs58::encode(key).into_string()
}

fn percent_bps(p: i128) -> u64 {
    (p / BPS_OF_PERCENT) as u64
}

fn share_bps(v: i128) -> u64 {
    (v / BPS_OF_SHARE) as u64
}
