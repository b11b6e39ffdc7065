// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Strata Protocol — Core Library
//!
//! A shared ledger for a multi-token economy: one base fungible unit plus a
//! tree of derived token types, each with its own supply cap, creator and
//! metadata. Every mutation goes through a role-gated, all-or-nothing
//! entry point.
//!
//! ## Architecture
//!
//! - **partition** — Namespaced regions of one shared state container.
//! - **token** — 256-bit hierarchical token ids and the token registry.
//! - **ledger** — Balances, supplies, allowances, bans and staged `Tx`s.
//! - **limiter** — Bin-based sliding-window cap on outbound base value.
//! - **access** — The role interface the ledger is checked against.
//! - **events** — Append-only log of everything that was committed.
//! - **state** — The container itself plus the per-call `Env`.
//! - **config** — Protocol constants and genesis parameters.
//!
//! ## Ground rules
//!
//! 1. `supply == Σ balances` and `supply <= max_supply`, for every token,
//!    after every commit.
//! 2. A failed operation changes nothing, events included.
//! 3. Arithmetic on amounts is checked. Always.

pub mod access;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod limiter;
pub mod partition;
pub mod state;
pub mod token;
pub mod types;

pub use access::{AccessPolicy, Role, RoleTable};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use error::{LedgerError, LedgerResult};
pub use events::{Event, EventLog, EventRecord};
pub use ledger::{LedgerStore, Tx, Unbonded};
pub use limiter::{DefaultLimiterConfig, LimiterConfig, LimiterUpdate, WithdrawStatus};
pub use partition::{Namespace, Partition};
pub use state::{Env, SharedState, State};
pub use token::{TokenId, TokenParams, TokenRecord};
pub use types::{Address, Amount};
