//! # Bridge Minter
//!
//! The only path by which base supply enters or leaves the ledger.
//!
//! - **Deposits**: the bridge operator calls [`BridgeMinter::mint_with_fee`]
//!   when value arrives from another chain. Any token may be issued,
//!   including the base token; the bridge fee is withheld.
//! - **Departures**: a holder calls [`BridgeMinter::bridge_out`] to burn
//!   value here for release on `dest_chain`. A [`BridgeOutRecord`] with a
//!   fresh transfer id is kept for the relayer.
//! - **Withdrawals**: a holder calls [`BridgeMinter::withdraw`] to unbond a
//!   first-generation child token back into base tokens at its exchange
//!   rate, minus the fee.
//!
//! Every base-token payout or departure passes the withdraw limiter unless
//! the account is the super-admin.
//!
//! The bridge keeps its settings in the `strata.bridge` partition of the
//! shared [`State`].

use serde::{Deserialize, Serialize};
use strata_protocol::config::{DEFAULT_BRIDGE_FEE_PER_MILLE, FEE_DENOMINATOR};
use strata_protocol::{Address, Amount, Env, LedgerError, Partition, Role, State, TokenId};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from bridge operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The underlying ledger rejected the operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The fee is above 100%.
    #[error("bridge fee {fee} per mille exceeds {max}")]
    FeeTooHigh {
        /// Requested fee.
        fee: u16,
        /// Largest allowed fee.
        max: u16,
    },

    /// No chain id has been configured yet.
    #[error("bridge is not configured with a chain id")]
    NotConfigured,

    /// Departure to the chain this ledger lives on.
    #[error("destination chain {0} is the source chain")]
    SameChain(u64),
}

/// Convenience alias for bridge results.
pub type BridgeResult<T> = Result<T, BridgeError>;

// ---------------------------------------------------------------------------
// Partition
// ---------------------------------------------------------------------------

/// Bridge settings and the departures it has recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Fee withheld on deposits and withdrawals, in units of 1/1000.
    pub fee_per_mille: u16,
    /// Chain this ledger lives on. `0` until configured.
    pub chain_id: u64,
    /// Departures in the order they were recorded.
    pub departures: Vec<BridgeOutRecord>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fee_per_mille: DEFAULT_BRIDGE_FEE_PER_MILLE,
            chain_id: 0,
            departures: Vec::new(),
        }
    }
}

impl Partition for BridgeConfig {
    const DOMAIN: &'static str = "strata.bridge";
}

/// A burn on this chain awaiting release on another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeOutRecord {
    /// Unique id the relayer keys the release on.
    pub transfer_id: Uuid,
    /// Account whose tokens were burned.
    pub account: Address,
    /// Token burned.
    pub token_id: TokenId,
    /// Amount burned.
    #[serde(with = "strata_protocol::types::amount_string")]
    pub amount: Amount,
    /// This chain.
    pub source_chain: u64,
    /// Chain to release on.
    pub dest_chain: u64,
    /// Unix seconds of the burn.
    pub timestamp: u64,
}

/// `amount * (1000 - fee) / 1000`, rounded down, without overflowing.
pub fn apply_fee(amount: Amount, fee_per_mille: u16) -> Amount {
    if fee_per_mille == 0 {
        return amount;
    }
    let denominator = Amount::from(FEE_DENOMINATOR);
    let keep = denominator.saturating_sub(Amount::from(fee_per_mille));
    // amount = q * 1000 + r, so amount * keep / 1000 = q * keep + r * keep / 1000.
    let (q, r) = (amount / denominator, amount % denominator);
    q * keep + r * keep / denominator
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Bridge entry points on the shared state.
pub trait BridgeMinter {
    /// Current settings, or the defaults if never configured.
    fn bridge_config(&self) -> BridgeConfig;

    /// Sets the chain id and fee. Admin only.
    fn configure_bridge(&mut self, env: Env<'_>, chain_id: u64, fee_per_mille: u16) -> BridgeResult<()>;

    /// Sets the fee withheld on deposits and withdrawals. Admin only;
    /// `fee_per_mille <= 1000`.
    fn set_bridge_fee(&mut self, env: Env<'_>, fee_per_mille: u16) -> BridgeResult<()>;

    /// Issues `amount` of `token` to `user`, less the fee. Bridge role only.
    /// Returns the amount credited.
    fn mint_with_fee(&mut self, env: Env<'_>, user: Address, token: TokenId, amount: Amount) -> BridgeResult<Amount>;

    /// Burns `amount` of the caller's `token` for release on `dest_chain`.
    fn bridge_out(&mut self, env: Env<'_>, amount: Amount, token: TokenId, dest_chain: u64) -> BridgeResult<BridgeOutRecord>;

    /// Burns `amount` of the caller's first-generation `token` and credits
    /// `amount * exchange_rate` base tokens, less the fee. Returns the
    /// amount credited.
    fn withdraw(&mut self, env: Env<'_>, amount: Amount, token: TokenId) -> BridgeResult<Amount>;
}

fn check_fee(fee_per_mille: u16) -> BridgeResult<()> {
    if fee_per_mille > FEE_DENOMINATOR {
        return Err(BridgeError::FeeTooHigh {
            fee: fee_per_mille,
            max: FEE_DENOMINATOR,
        });
    }
    Ok(())
}

impl BridgeMinter for State {
    fn bridge_config(&self) -> BridgeConfig {
        self.region::<BridgeConfig>().cloned().unwrap_or_default()
    }

    fn configure_bridge(&mut self, env: Env<'_>, chain_id: u64, fee_per_mille: u16) -> BridgeResult<()> {
        env.require_role(Role::Admin)?;
        check_fee(fee_per_mille)?;
        if chain_id == 0 {
            return Err(LedgerError::validation("chain id must be non-zero").into());
        }
        self.transact(env, |tx| {
            tx.update_region::<BridgeConfig>(move |cfg| {
                cfg.chain_id = chain_id;
                cfg.fee_per_mille = fee_per_mille;
            })?;
            tx.emit_extension(
                BridgeConfig::DOMAIN,
                "bridge_configured",
                serde_json::json!({ "chain_id": chain_id, "fee_per_mille": fee_per_mille }),
            )
        })?;
        tracing::info!(chain_id, fee_per_mille, "bridge configured");
        Ok(())
    }

    fn set_bridge_fee(&mut self, env: Env<'_>, fee_per_mille: u16) -> BridgeResult<()> {
        env.require_role(Role::Admin)?;
        check_fee(fee_per_mille)?;
        let previous = self.bridge_config().fee_per_mille;
        self.transact(env, |tx| {
            tx.update_region::<BridgeConfig>(move |cfg| cfg.fee_per_mille = fee_per_mille)?;
            tx.emit_extension(
                BridgeConfig::DOMAIN,
                "bridge_fee_updated",
                serde_json::json!({ "previous": previous, "fee_per_mille": fee_per_mille }),
            )
        })?;
        tracing::info!(previous, fee_per_mille, "bridge fee updated");
        Ok(())
    }

    fn mint_with_fee(&mut self, env: Env<'_>, user: Address, token: TokenId, amount: Amount) -> BridgeResult<Amount> {
        env.require_role(Role::Bridge)?;
        let net = apply_fee(amount, self.bridge_config().fee_per_mille);
        self.transact(env, |tx| tx.issue(user, token, net))?;
        tracing::debug!(%user, %token, gross = %amount, net = %net, "bridge deposit");
        Ok(net)
    }

    fn bridge_out(&mut self, env: Env<'_>, amount: Amount, token: TokenId, dest_chain: u64) -> BridgeResult<BridgeOutRecord> {
        let cfg = self.bridge_config();
        if cfg.chain_id == 0 {
            return Err(BridgeError::NotConfigured);
        }
        if dest_chain == cfg.chain_id {
            return Err(BridgeError::SameChain(dest_chain));
        }
        let record = BridgeOutRecord {
            transfer_id: Uuid::new_v4(),
            account: env.caller,
            token_id: token,
            amount,
            source_chain: cfg.chain_id,
            dest_chain,
            timestamp: env.now,
        };
        let payload = serde_json::to_value(&record)
            .map_err(|e| LedgerError::validation(format!("bridge record encoding: {e}")))?;

        self.transact(env, |tx| {
            tx.before_transfer(token, Some(env.caller), None)?;
            if token.is_root() {
                tx.limit_outbound(env.caller, amount)?;
            }
            tx.burn(env.caller, token, amount)?;
            let staged = record.clone();
            tx.update_region::<BridgeConfig>(move |cfg| cfg.departures.push(staged))?;
            tx.emit_extension(BridgeConfig::DOMAIN, "bridged_out", payload)
        })?;

        tracing::info!(
            transfer_id = %record.transfer_id,
            account = %record.account,
            %token,
            amount = %amount,
            dest_chain,
            "bridged out"
        );
        Ok(record)
    }

    fn withdraw(&mut self, env: Env<'_>, amount: Amount, token: TokenId) -> BridgeResult<Amount> {
        let fee = self.bridge_config().fee_per_mille;
        let net = self.transact(env, |tx| {
            let claim = tx.unbond(token, amount)?;
            let net = apply_fee(claim.gross(), fee);
            tx.pay_out(claim, net)
        })?;
        tracing::debug!(account = %env.caller, %token, amount = %amount, payout = %net, "withdrawal");
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_rounds_down() {
        assert_eq!(apply_fee(1000, 5), 995);
        assert_eq!(apply_fee(999, 5), 994);
        assert_eq!(apply_fee(1, 5), 0);
        assert_eq!(apply_fee(1234, 0), 1234);
        assert_eq!(apply_fee(1234, 1000), 0);
    }

    #[test]
    fn fee_on_huge_amounts_does_not_overflow() {
        let net = apply_fee(Amount::MAX, 1);
        assert!(net < Amount::MAX);
        assert_eq!(net, Amount::MAX / 1000 * 999 + (Amount::MAX % 1000) * 999 / 1000);
    }

    #[test]
    fn fee_bound() {
        assert!(check_fee(1000).is_ok());
        assert_eq!(
            check_fee(1001),
            Err(BridgeError::FeeTooHigh { fee: 1001, max: 1000 })
        );
    }

    #[test]
    fn default_config_uses_protocol_fee() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.fee_per_mille, DEFAULT_BRIDGE_FEE_PER_MILLE);
        assert_eq!(cfg.chain_id, 0);
    }
}
