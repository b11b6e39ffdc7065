//! # Node Configuration
//!
//! A TOML file describing who administers the ledger, which chain it lives
//! on, genesis parameters, and initial role grants:
//!
//! ```toml
//! super_admin = "0x0000000000000000000000000000000000000001"
//! chain_id = 1
//! bridge_fee_per_mille = 5
//!
//! [ledger]
//! root_name = "Strata"
//! root_symbol = "STR"
//!
//! [ledger.limiter]
//! bin_count = 24
//! window_seconds = 86400
//! limit_amount = "1000000000000"
//! enabled = true
//!
//! [[roles]]
//! role = "bridge"
//! accounts = ["0x0000000000000000000000000000000000000002"]
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use strata_protocol::config::{DEFAULT_BRIDGE_FEE_PER_MILLE, FEE_DENOMINATOR};
use strata_protocol::{Address, LedgerConfig, Role, RoleTable};

/// Accounts granted one role at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: Role,
    pub accounts: Vec<Address>,
}

/// Everything the node needs to build its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Holds every role and bypasses the withdraw limiter.
    pub super_admin: Address,
    /// Chain id used by the bridge for departures.
    pub chain_id: u64,
    /// Bridge fee in units of 1/1000.
    #[serde(default = "default_fee")]
    pub bridge_fee_per_mille: u16,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
}

fn default_fee() -> u16 {
    DEFAULT_BRIDGE_FEE_PER_MILLE
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            super_admin: Address::from_low_u8(1),
            chain_id: 1,
            bridge_fee_per_mille: DEFAULT_BRIDGE_FEE_PER_MILLE,
            ledger: LedgerConfig::default(),
            roles: vec![
                RoleGrant {
                    role: Role::Bridge,
                    accounts: vec![Address::from_low_u8(2)],
                },
                RoleGrant {
                    role: Role::Creator,
                    accounts: vec![Address::from_low_u8(3)],
                },
            ],
        }
    }
}

impl NodeConfig {
    /// Reads and validates a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: NodeConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), super_admin = %config.super_admin, "config loaded");
        Ok(config)
    }

    /// Writes the config as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to encode config")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write config {}", path.display()))
    }

    /// Rejects configurations the ledger would refuse later anyway.
    pub fn validate(&self) -> Result<()> {
        if self.super_admin.is_zero() {
            bail!("super_admin must not be the zero address");
        }
        if self.chain_id == 0 {
            bail!("chain_id must be non-zero");
        }
        if self.bridge_fee_per_mille > FEE_DENOMINATOR {
            bail!(
                "bridge_fee_per_mille {} exceeds {}",
                self.bridge_fee_per_mille,
                FEE_DENOMINATOR
            );
        }
        self.ledger.validate().context("invalid [ledger] section")?;
        Ok(())
    }

    /// The access policy described by `super_admin` and `roles`.
    pub fn role_table(&self) -> RoleTable {
        let mut table = RoleTable::new(self.super_admin);
        for grant in &self.roles {
            for account in &grant.accounts {
                table.grant(grant.role, *account);
            }
        }
        table
    }
}
