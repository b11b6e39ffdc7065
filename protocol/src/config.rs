//! # Ledger Configuration & Constants
//!
//! Every tunable number in Strata lives here. Genesis-time values go into
//! [`LedgerConfig`]; everything else is a constant.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::limiter::DefaultLimiterConfig;
use crate::types::Amount;

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Bridge fees are expressed in parts per thousand.
pub const FEE_DENOMINATOR: u16 = 1000;

/// Default bridge fee: 0.5%.
pub const DEFAULT_BRIDGE_FEE_PER_MILLE: u16 = 5;

// ---------------------------------------------------------------------------
// Root Token
// ---------------------------------------------------------------------------

/// Name of the base currency.
pub const ROOT_TOKEN_NAME: &str = "Strata";

/// Ticker of the base currency.
pub const ROOT_TOKEN_SYMBOL: &str = "STR";

/// Uncapped by default; the bridge is the only producer anyway.
pub const ROOT_MAX_SUPPLY: Amount = Amount::MAX;

// ---------------------------------------------------------------------------
// Withdraw Limiter Defaults
// ---------------------------------------------------------------------------

/// Default number of bins per window.
pub const DEFAULT_LIMITER_BIN_COUNT: u32 = 24;

/// Default window: one day.
pub const DEFAULT_LIMITER_WINDOW_SECS: u64 = 86_400;

/// Default per-window outbound limit in base-token units.
pub const DEFAULT_LIMITER_LIMIT: Amount = 1_000_000_000_000;

/// Upper bound on bins per account so a single override cannot make one
/// account's check arbitrarily expensive.
pub const MAX_LIMITER_BIN_COUNT: u32 = 1024;

// ---------------------------------------------------------------------------
// LedgerConfig
// ---------------------------------------------------------------------------

/// Genesis parameters for a [`State`](crate::state::State).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Name of the root token.
    pub root_name: String,
    /// Symbol of the root token.
    pub root_symbol: String,
    /// Supply cap of the root token.
    #[serde(with = "crate::types::amount_string")]
    pub root_max_supply: Amount,
    /// Process-wide limiter defaults.
    pub limiter: DefaultLimiterConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            root_name: ROOT_TOKEN_NAME.to_string(),
            root_symbol: ROOT_TOKEN_SYMBOL.to_string(),
            root_max_supply: ROOT_MAX_SUPPLY,
            limiter: DefaultLimiterConfig::default(),
        }
    }
}

impl LedgerConfig {
    /// Checks genesis parameters before any state is built from them.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] for an empty root symbol, a zero
    /// root cap, or limiter defaults with a zero bin count or bin length.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.root_symbol.trim().is_empty() {
            return Err(LedgerError::validation("root symbol must not be empty"));
        }
        if self.root_max_supply == 0 {
            return Err(LedgerError::validation("root max supply must be non-zero"));
        }
        let limiter = &self.limiter;
        if limiter.bin_count == 0 || limiter.bin_count > MAX_LIMITER_BIN_COUNT {
            return Err(LedgerError::validation(format!(
                "limiter bin count must be between 1 and {MAX_LIMITER_BIN_COUNT}, got {}",
                limiter.bin_count
            )));
        }
        if limiter.window_seconds / u64::from(limiter.bin_count) == 0 {
            return Err(LedgerError::validation(format!(
                "limiter window of {}s is shorter than {} bins",
                limiter.window_seconds, limiter.bin_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_defaults_have_nonzero_bin_length() {
        assert!(DEFAULT_LIMITER_BIN_COUNT > 0);
        assert!(DEFAULT_LIMITER_WINDOW_SECS / u64::from(DEFAULT_LIMITER_BIN_COUNT) > 0);
        assert!(DEFAULT_LIMITER_BIN_COUNT <= MAX_LIMITER_BIN_COUNT);
    }

    #[test]
    fn default_fee_is_below_denominator() {
        assert!(DEFAULT_BRIDGE_FEE_PER_MILLE < FEE_DENOMINATOR);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(LedgerConfig::default().validate().is_ok());
    }

    #[test]
    fn unusable_genesis_rejected() {
        let mut cfg = LedgerConfig::default();
        cfg.limiter.bin_count = 0;
        assert!(matches!(cfg.validate(), Err(LedgerError::Validation(_))));

        let mut cfg = LedgerConfig::default();
        cfg.limiter.window_seconds = 10;
        cfg.limiter.bin_count = 20;
        assert!(cfg.validate().is_err());

        let mut cfg = LedgerConfig::default();
        cfg.root_symbol = " ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = LedgerConfig::default();
        cfg.root_max_supply = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: LedgerConfig = serde_json::from_str(r#"{"root_symbol":"XYZ"}"#).unwrap();
        assert_eq!(cfg.root_symbol, "XYZ");
        assert_eq!(cfg.root_name, ROOT_TOKEN_NAME);
        assert_eq!(cfg.limiter, DefaultLimiterConfig::default());
    }
}
