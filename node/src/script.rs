//! # Scenario Replay
//!
//! A script is a JSON array of [`Command`]s, each tagged by `op`. The
//! [`Runner`] builds genesis state from a [`NodeConfig`], applies every
//! command in order against a [`SharedState`] with a manual clock, and
//! summarizes the outcome in a [`Report`].
//!
//! ```json
//! [
//!   { "op": "deposit", "caller": "0x…02", "to": "0x…03", "amount": "1000" },
//!   { "op": "advance", "seconds": 3600 },
//!   { "op": "transfer", "caller": "0x…03", "to": "0x…04", "amount": "10" }
//! ]
//! ```
//!
//! Amounts are decimal strings (plain JSON numbers up to `u64` also work).
//! Token ids are hex strings; `token` defaults to the base token where it
//! is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use strata_contracts::{BridgeError, BridgeMinter, BridgeOutRecord, BridgeResult};
use strata_protocol::limiter::LimiterUpdate;
use strata_protocol::types::amount_string;
use strata_protocol::{
    Address, Amount, Clock, Env, EventRecord, ManualClock, RoleTable, SharedState, State, TokenId,
    TokenParams, WithdrawStatus,
};

use crate::config::NodeConfig;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// One scripted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    CreateToken {
        caller: Address,
        #[serde(default)]
        parent: TokenId,
        name: String,
        symbol: String,
        #[serde(with = "amount_string")]
        exchange_rate: Amount,
        #[serde(with = "amount_string")]
        max_supply: Amount,
        #[serde(default)]
        uri: String,
    },
    /// Bridge deposit, fee withheld.
    Deposit {
        caller: Address,
        to: Address,
        #[serde(default)]
        token: TokenId,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    Mint {
        caller: Address,
        to: Address,
        token: TokenId,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    /// Burns from the caller's own balance.
    Burn {
        caller: Address,
        #[serde(default)]
        token: TokenId,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    Transfer {
        caller: Address,
        to: Address,
        #[serde(default)]
        token: TokenId,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    Approve {
        caller: Address,
        spender: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    TransferFrom {
        caller: Address,
        from: Address,
        to: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    SetUri {
        caller: Address,
        token: TokenId,
        uri: String,
    },
    Ban {
        caller: Address,
        operator: Address,
        #[serde(default)]
        token: Option<TokenId>,
    },
    Unban {
        caller: Address,
        operator: Address,
        #[serde(default)]
        token: Option<TokenId>,
    },
    SetPaused {
        caller: Address,
        paused: bool,
    },
    SetBridgeFee {
        caller: Address,
        fee_per_mille: u16,
    },
    BridgeOut {
        caller: Address,
        #[serde(default)]
        token: TokenId,
        #[serde(with = "amount_string")]
        amount: Amount,
        dest_chain: u64,
    },
    Withdraw {
        caller: Address,
        token: TokenId,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    Limiter {
        caller: Address,
        update: LimiterUpdate,
    },
    /// Moves the replay clock forward.
    Advance { seconds: u64 },
}

impl Command {
    /// The `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateToken { .. } => "create_token",
            Command::Deposit { .. } => "deposit",
            Command::Mint { .. } => "mint",
            Command::Burn { .. } => "burn",
            Command::Transfer { .. } => "transfer",
            Command::Approve { .. } => "approve",
            Command::TransferFrom { .. } => "transfer_from",
            Command::SetUri { .. } => "set_uri",
            Command::Ban { .. } => "ban",
            Command::Unban { .. } => "unban",
            Command::SetPaused { .. } => "set_paused",
            Command::SetBridgeFee { .. } => "set_bridge_fee",
            Command::BridgeOut { .. } => "bridge_out",
            Command::Withdraw { .. } => "withdraw",
            Command::Limiter { .. } => "limiter",
            Command::Advance { .. } => "advance",
        }
    }
}

/// Reads a script file.
pub fn load_script(path: &Path) -> Result<Vec<Command>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse script {}", path.display()))
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Result of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenRow {
    pub token_id: TokenId,
    pub symbol: String,
    #[serde(with = "amount_string")]
    pub supply: Amount,
    #[serde(with = "amount_string")]
    pub max_supply: Amount,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceRow {
    pub token_id: TokenId,
    pub account: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

/// Final state summary printed by `strata-node run`.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub version: u64,
    pub now: u64,
    pub partitions: Vec<String>,
    pub steps: Vec<StepOutcome>,
    pub tokens: Vec<TokenRow>,
    pub balances: Vec<BalanceRow>,
    pub limiter: Vec<WithdrawStatus>,
    pub departures: Vec<BridgeOutRecord>,
    pub events: Vec<EventRecord>,
}

impl Report {
    /// Number of failed steps.
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Applies commands to one shared state.
pub struct Runner {
    state: SharedState,
    roles: RoleTable,
    clock: ManualClock,
}

impl Runner {
    /// Builds genesis state and configures the bridge from `config`.
    pub fn new(config: &NodeConfig, start: u64) -> Result<Self> {
        let roles = config.role_table();
        let mut state = State::new(&config.ledger).context("failed to build genesis state")?;
        state
            .configure_bridge(
                Env::new(&roles, config.super_admin, start),
                config.chain_id,
                config.bridge_fee_per_mille,
            )
            .context("failed to configure bridge")?;

        tracing::info!(
            chain_id = config.chain_id,
            super_admin = %config.super_admin,
            grants = config.roles.len(),
            "ledger state ready"
        );

        Ok(Self {
            state: SharedState::new(state),
            roles,
            clock: ManualClock::new(start),
        })
    }

    fn env(&self, caller: Address) -> Env<'_> {
        Env::at(&self.roles, caller, &self.clock)
    }

    /// Applies a single command.
    pub fn apply(&self, command: &Command) -> BridgeResult<()> {
        if let Command::Advance { seconds } = command {
            self.clock.advance(*seconds);
            tracing::debug!(now = self.clock.now(), "clock advanced");
            return Ok(());
        }
        self.state.with(|state| self.dispatch(state, command))
    }

    fn dispatch(&self, state: &mut State, command: &Command) -> BridgeResult<()> {
        match command {
            Command::CreateToken {
                caller,
                parent,
                name,
                symbol,
                exchange_rate,
                max_supply,
                uri,
            } => {
                let params = TokenParams::new(name, symbol, *exchange_rate, *max_supply).with_uri(uri);
                let id = state.create_token(self.env(*caller), *parent, params)?;
                tracing::info!(token = %id, %parent, %symbol, "token created");
            }
            Command::Deposit {
                caller,
                to,
                token,
                amount,
            } => {
                state.mint_with_fee(self.env(*caller), *to, *token, *amount)?;
            }
            Command::Mint {
                caller,
                to,
                token,
                amount,
            } => state.mint(self.env(*caller), *to, *token, *amount)?,
            Command::Burn {
                caller,
                token,
                amount,
            } => state.burn(self.env(*caller), *caller, *token, *amount)?,
            Command::Transfer {
                caller,
                to,
                token,
                amount,
            } => state.transfer(self.env(*caller), *caller, *to, *token, *amount)?,
            Command::Approve {
                caller,
                spender,
                amount,
            } => state.approve(self.env(*caller), *spender, *amount)?,
            Command::TransferFrom {
                caller,
                from,
                to,
                amount,
            } => state.transfer_from(self.env(*caller), *from, *to, *amount)?,
            Command::SetUri { caller, token, uri } => state.set_uri(self.env(*caller), *token, uri)?,
            Command::Ban {
                caller,
                operator,
                token,
            } => state.ban(self.env(*caller), *token, *operator)?,
            Command::Unban {
                caller,
                operator,
                token,
            } => state.unban(self.env(*caller), *token, *operator)?,
            Command::SetPaused { caller, paused } => state.set_paused(self.env(*caller), *paused)?,
            Command::SetBridgeFee {
                caller,
                fee_per_mille,
            } => state.set_bridge_fee(self.env(*caller), *fee_per_mille)?,
            Command::BridgeOut {
                caller,
                token,
                amount,
                dest_chain,
            } => {
                state.bridge_out(self.env(*caller), *amount, *token, *dest_chain)?;
            }
            Command::Withdraw {
                caller,
                token,
                amount,
            } => {
                state.withdraw(self.env(*caller), *amount, *token)?;
            }
            Command::Limiter { caller, update } => state.configure_limiter(self.env(*caller), *update)?,
            Command::Advance { .. } => {}
        }
        Ok(())
    }

    /// Applies `commands` in order. Failing steps are logged and recorded;
    /// with `fail_fast` the first one stops the replay.
    pub fn run(&self, commands: &[Command], fail_fast: bool) -> Report {
        let mut steps = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter().enumerate() {
            let outcome = self.apply(command);
            if let Err(e) = &outcome {
                tracing::warn!(step = index, op = command.name(), error = %e, "step failed");
            }
            let failed = outcome.is_err();
            steps.push(StepOutcome {
                index,
                op: command.name(),
                ok: !failed,
                error: outcome.err().map(|e: BridgeError| e.to_string()),
            });
            if failed && fail_fast {
                break;
            }
        }
        let report = self.report(steps);
        tracing::info!(
            steps = report.steps.len(),
            failures = report.failures(),
            version = report.version,
            "replay finished"
        );
        report
    }

    /// Summarizes the current state.
    pub fn report(&self, steps: Vec<StepOutcome>) -> Report {
        let now = self.clock.now();
        self.state.with(|state| {
            let mut tokens = Vec::new();
            let mut balances = Vec::new();
            let mut accounts = BTreeSet::new();
            for (id, record) in state.tokens().iter() {
                tokens.push(TokenRow {
                    token_id: *id,
                    symbol: record.symbol.clone(),
                    supply: state.total_supply(id),
                    max_supply: record.max_supply,
                });
                for (account, amount) in state.ledger().holders(id) {
                    accounts.insert(account);
                    balances.push(BalanceRow {
                        token_id: *id,
                        account,
                        amount,
                    });
                }
            }

            Report {
                version: state.version(),
                now,
                partitions: state.namespaces().domains().map(str::to_string).collect(),
                steps,
                tokens,
                balances,
                limiter: accounts
                    .iter()
                    .map(|account| state.withdraw_status(account, now))
                    .collect(),
                departures: state.bridge_config().departures,
                events: state.events().records().to_vec(),
            }
        })
    }
}
