//! # Withdraw Limiter
//!
//! Bounds each account's outbound base-token flow over a rolling window.
//! The ledger consults it on every outbound move except those made by the
//! super-admin; see [`window`] for the bin arithmetic.
//!
//! ## Configuration
//!
//! A process-wide [`DefaultLimiterConfig`] applies to every account. An
//! account may carry a [`LimiterConfig`] override where each non-zero field
//! wins over the default.
//!
//! ## Bin pinning
//!
//! An account's bin array is sized from the effective bin count at its
//! first limited withdrawal and keeps that length. Later bin-count changes
//! only affect accounts that have not withdrawn yet; window and limit
//! changes apply immediately to everyone. A window change that would leave
//! any pinned array with a bin length of zero is rejected, so an accepted
//! configuration never locks an account out. [`LimiterUpdate::ResetAccount`]
//! drops an account's array so the next withdrawal re-allocates it.

pub mod window;

pub use window::{AccountWindow, Bin, Exceeded};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{
    DEFAULT_LIMITER_BIN_COUNT, DEFAULT_LIMITER_LIMIT, DEFAULT_LIMITER_WINDOW_SECS,
    MAX_LIMITER_BIN_COUNT,
};
use crate::error::{LedgerError, LedgerResult};
use crate::events::Event;
use crate::partition::Partition;
use crate::state::{Env, State};
use crate::types::{Address, Amount};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Process-wide limiter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultLimiterConfig {
    /// Bins per window. Never zero.
    pub bin_count: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
    /// Maximum outbound amount per window.
    #[serde(with = "crate::types::amount_string")]
    pub limit_amount: Amount,
    /// When `false` every withdrawal is allowed unconditionally.
    pub enabled: bool,
}

impl Default for DefaultLimiterConfig {
    fn default() -> Self {
        Self {
            bin_count: DEFAULT_LIMITER_BIN_COUNT,
            window_seconds: DEFAULT_LIMITER_WINDOW_SECS,
            limit_amount: DEFAULT_LIMITER_LIMIT,
            enabled: true,
        }
    }
}

/// Per-account override. A zero field inherits the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    pub bin_count: u32,
    pub window_seconds: u64,
    #[serde(with = "crate::types::amount_string")]
    pub limit_amount: Amount,
}

/// Resolved settings for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub bin_count: u32,
    pub window_seconds: u64,
    #[serde(with = "crate::types::amount_string")]
    pub limit_amount: Amount,
}

impl EffectiveConfig {
    fn validate(&self) -> LedgerResult<()> {
        if self.bin_count == 0 {
            return Err(LedgerError::validation("bin count must be greater than zero"));
        }
        if self.bin_count > MAX_LIMITER_BIN_COUNT {
            return Err(LedgerError::validation(format!(
                "bin count {} exceeds maximum {MAX_LIMITER_BIN_COUNT}",
                self.bin_count
            )));
        }
        if self.window_seconds / u64::from(self.bin_count) == 0 {
            return Err(LedgerError::validation(format!(
                "window of {}s is shorter than {} bins",
                self.window_seconds, self.bin_count
            )));
        }
        Ok(())
    }
}

/// An administrative limiter change. All variants are super-admin only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "setting", rename_all = "snake_case")]
pub enum LimiterUpdate {
    DefaultLimitAmount {
        #[serde(with = "crate::types::amount_string")]
        value: Amount,
    },
    DefaultWindowSeconds { value: u64 },
    DefaultBinCount { value: u32 },
    Enabled { value: bool },
    AccountConfig {
        account: Address,
        #[serde(flatten)]
        config: LimiterConfig,
    },
    ResetAccount { account: Address },
}

impl LimiterUpdate {
    fn account(&self) -> Option<Address> {
        match self {
            LimiterUpdate::AccountConfig { account, .. } | LimiterUpdate::ResetAccount { account } => {
                Some(*account)
            }
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            LimiterUpdate::DefaultLimitAmount { value } => format!("default_limit_amount={value}"),
            LimiterUpdate::DefaultWindowSeconds { value } => format!("default_window_seconds={value}"),
            LimiterUpdate::DefaultBinCount { value } => format!("default_bin_count={value}"),
            LimiterUpdate::Enabled { value } => format!("enabled={value}"),
            LimiterUpdate::AccountConfig { config, .. } => format!(
                "account_config bins={} window={} limit={}",
                config.bin_count, config.window_seconds, config.limit_amount
            ),
            LimiterUpdate::ResetAccount { .. } => "reset_account".to_string(),
        }
    }
}

/// Read-only view of an account's window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawStatus {
    pub account: Address,
    pub enabled: bool,
    /// Sum of non-expired bins.
    #[serde(with = "crate::types::amount_string")]
    pub used: Amount,
    /// `limit - used`, floored at zero.
    #[serde(with = "crate::types::amount_string")]
    pub remaining: Amount,
    #[serde(with = "crate::types::amount_string")]
    pub limit: Amount,
    pub window_seconds: u64,
    /// Length of the account's bin array, or the effective count if none yet.
    pub bin_count: u32,
    /// When the oldest active usage leaves the window.
    pub window_end: Option<u64>,
}

// ---------------------------------------------------------------------------
// LimiterStore
// ---------------------------------------------------------------------------

/// The limiter's partition: defaults, overrides and per-account windows.
#[derive(Debug, Clone, Default)]
pub struct LimiterStore {
    defaults: DefaultLimiterConfig,
    overrides: BTreeMap<Address, LimiterConfig>,
    windows: BTreeMap<Address, AccountWindow>,
}

impl Partition for LimiterStore {
    const DOMAIN: &'static str = "strata.limiter";
}

impl LimiterStore {
    /// Creates a store with the given defaults and no account state.
    pub fn new(defaults: DefaultLimiterConfig) -> Self {
        Self {
            defaults,
            overrides: BTreeMap::new(),
            windows: BTreeMap::new(),
        }
    }

    /// Process-wide defaults.
    pub fn defaults(&self) -> &DefaultLimiterConfig {
        &self.defaults
    }

    /// Returns `true` if limiting is switched on.
    pub fn is_enabled(&self) -> bool {
        self.defaults.enabled
    }

    /// The account's override, if any.
    pub fn override_for(&self, account: &Address) -> Option<&LimiterConfig> {
        self.overrides.get(account)
    }

    /// Committed window for `account`.
    pub fn window(&self, account: &Address) -> Option<&AccountWindow> {
        self.windows.get(account)
    }

    /// Resolves the account's settings: non-zero override fields win.
    pub fn effective_config(&self, account: &Address) -> EffectiveConfig {
        let o = self.overrides.get(account).copied().unwrap_or_default();
        EffectiveConfig {
            bin_count: inherit(o.bin_count, self.defaults.bin_count),
            window_seconds: inherit(o.window_seconds, self.defaults.window_seconds),
            limit_amount: inherit(o.limit_amount, self.defaults.limit_amount),
        }
    }

    /// Checks `amount` against the account's window and returns the window
    /// to stage if it fits. `current` is the caller's view of the window
    /// (staged or committed); `None` means the account is uninitialized.
    ///
    /// Returns `Ok(None)` when limiting is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::RateLimitExceeded`] if the window would go
    /// over the limit.
    pub fn check_and_record(
        &self,
        account: Address,
        current: Option<AccountWindow>,
        amount: Amount,
        now: u64,
    ) -> LedgerResult<Option<(AccountWindow, usize, Amount)>> {
        if !self.defaults.enabled {
            return Ok(None);
        }
        let cfg = self.effective_config(&account);
        let mut window = current.unwrap_or_else(|| AccountWindow::new(now, cfg.bin_count));

        match window.try_record(now, cfg.window_seconds, cfg.limit_amount, amount)? {
            Ok((index, total)) => Ok(Some((window, index, total))),
            Err(Exceeded { active }) => {
                tracing::warn!(
                    account = %account,
                    requested = %amount,
                    active = %active,
                    limit = %cfg.limit_amount,
                    "withdraw limit triggered"
                );
                Err(LedgerError::RateLimitExceeded {
                    account,
                    requested: amount,
                    active,
                    limit: cfg.limit_amount,
                })
            }
        }
    }

    /// Current usage of `account` at `now`. Does not mutate anything.
    pub fn status(&self, account: &Address, now: u64) -> WithdrawStatus {
        let cfg = self.effective_config(account);
        let (used, bin_count, window_end) = match self.windows.get(account) {
            Some(w) => (
                w.active_total(now, cfg.window_seconds),
                w.bin_count() as u32,
                w.window_end(now, cfg.window_seconds),
            ),
            None => (0, cfg.bin_count, None),
        };
        WithdrawStatus {
            account: *account,
            enabled: self.defaults.enabled,
            used,
            remaining: cfg.limit_amount.saturating_sub(used),
            limit: cfg.limit_amount,
            window_seconds: cfg.window_seconds,
            bin_count,
            window_end,
        }
    }

    pub(crate) fn put_window(&mut self, account: Address, window: AccountWindow) {
        self.windows.insert(account, window);
    }

    /// Applies `update` to a copy of the settings, validates, then commits.
    ///
    /// A change is rejected if any account would end up with a window
    /// shorter than its bin count, including accounts whose bin array is
    /// already pinned at a different length.
    fn apply(&mut self, update: &LimiterUpdate) -> LedgerResult<()> {
        let mut defaults = self.defaults;
        let mut overrides = self.overrides.clone();
        match *update {
            LimiterUpdate::DefaultLimitAmount { value } => defaults.limit_amount = value,
            LimiterUpdate::DefaultWindowSeconds { value } => defaults.window_seconds = value,
            LimiterUpdate::DefaultBinCount { value } => {
                if value == 0 {
                    return Err(LedgerError::validation("bin count must be greater than zero"));
                }
                defaults.bin_count = value;
            }
            LimiterUpdate::Enabled { value } => defaults.enabled = value,
            LimiterUpdate::AccountConfig { account, config } => {
                overrides.insert(account, config);
            }
            LimiterUpdate::ResetAccount { account } => {
                self.windows.remove(&account);
                return Ok(());
            }
        }

        EffectiveConfig {
            bin_count: defaults.bin_count,
            window_seconds: defaults.window_seconds,
            limit_amount: defaults.limit_amount,
        }
        .validate()?;
        let candidate = Self {
            defaults,
            overrides,
            windows: BTreeMap::new(),
        };
        // Overrides that inherit the changed field must stay valid too.
        for account in candidate.overrides.keys() {
            candidate.effective_config(account).validate()?;
        }
        for (account, window) in &self.windows {
            let cfg = candidate.effective_config(account);
            window.bin_length(cfg.window_seconds).map_err(|_| {
                LedgerError::validation(format!(
                    "window of {}s is shorter than the {} bins pinned for {account}",
                    cfg.window_seconds,
                    window.bin_count()
                ))
            })?;
        }
        self.defaults = candidate.defaults;
        self.overrides = candidate.overrides;
        Ok(())
    }
}

/// Zero means "inherit".
fn inherit<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() {
        default
    } else {
        value
    }
}

// ---------------------------------------------------------------------------
// State entry points
// ---------------------------------------------------------------------------

impl State {
    /// Applies an administrative limiter change.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotPermitted`] unless the caller is the
    /// super-admin, and [`LedgerError::Validation`] if the resulting
    /// configuration would have a zero bin count or a bin length of zero.
    pub fn configure_limiter(&mut self, env: Env<'_>, update: LimiterUpdate) -> LedgerResult<()> {
        if !env.is_super_admin() {
            return Err(LedgerError::NotPermitted {
                account: env.caller,
                action: "configure the withdraw limiter",
            });
        }
        self.limiter.apply(&update)?;
        let setting = update.describe();
        tracing::info!(account = ?update.account(), %setting, "limiter configuration updated");
        self.commit_events(
            env,
            vec![Event::LimiterConfigUpdated {
                account: update.account(),
                setting,
            }],
        );
        Ok(())
    }

    /// Sets the default per-window limit.
    pub fn set_default_limit_amount(&mut self, env: Env<'_>, value: Amount) -> LedgerResult<()> {
        self.configure_limiter(env, LimiterUpdate::DefaultLimitAmount { value })
    }

    /// Sets the default window length.
    pub fn set_default_window_seconds(&mut self, env: Env<'_>, value: u64) -> LedgerResult<()> {
        self.configure_limiter(env, LimiterUpdate::DefaultWindowSeconds { value })
    }

    /// Sets the default bin count. Must be greater than zero.
    pub fn set_default_bin_count(&mut self, env: Env<'_>, value: u32) -> LedgerResult<()> {
        self.configure_limiter(env, LimiterUpdate::DefaultBinCount { value })
    }

    /// Switches limiting on or off for everyone.
    pub fn set_limiter_enabled(&mut self, env: Env<'_>, value: bool) -> LedgerResult<()> {
        self.configure_limiter(env, LimiterUpdate::Enabled { value })
    }

    /// Installs a per-account override; zero fields inherit the default.
    pub fn set_account_config(
        &mut self,
        env: Env<'_>,
        account: Address,
        bin_count: u32,
        window_seconds: u64,
        limit_amount: Amount,
    ) -> LedgerResult<()> {
        self.configure_limiter(
            env,
            LimiterUpdate::AccountConfig {
                account,
                config: LimiterConfig {
                    bin_count,
                    window_seconds,
                    limit_amount,
                },
            },
        )
    }

    /// Forgets the account's bins so its next withdrawal re-pins them.
    pub fn reset_account(&mut self, env: Env<'_>, account: Address) -> LedgerResult<()> {
        self.configure_limiter(env, LimiterUpdate::ResetAccount { account })
    }

    /// Current window usage for `account`.
    pub fn withdraw_status(&self, account: &Address, now: u64) -> WithdrawStatus {
        self.limiter.status(account, now)
    }
}
