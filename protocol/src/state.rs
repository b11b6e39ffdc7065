//! # Process-Wide State
//!
//! [`State`] is the single long-lived container every operation runs
//! against. Each core module owns one typed field (its partition); modules
//! authored elsewhere get a region in [`Regions`]. All namespaces are
//! claimed in one [`NamespaceTable`], so no two modules can alias each
//! other's data.
//!
//! [`Env`] carries the per-call context: who is calling, when, and the
//! access policy to check them against.
//!
//! Operations are synchronous and run to completion. [`SharedState`] wraps
//! a `State` in a mutex for hosts that accept calls from several threads;
//! holding the lock for the whole call keeps execution serialized.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::access::{AccessPolicy, Role};
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::events::{Event, EventLog};
use crate::ledger::transaction::Tx;
use crate::ledger::LedgerStore;
use crate::limiter::LimiterStore;
use crate::partition::{NamespaceTable, Partition, Regions};
use crate::token::TokenRegistry;
use crate::types::Address;

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

/// Per-call context.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    /// Role checks for this call.
    pub access: &'a dyn AccessPolicy,
    /// The authenticated caller.
    pub caller: Address,
    /// Unix seconds at which the call executes.
    pub now: u64,
}

impl<'a> Env<'a> {
    /// Builds a context from explicit values.
    pub fn new(access: &'a dyn AccessPolicy, caller: Address, now: u64) -> Self {
        Self {
            access,
            caller,
            now,
        }
    }

    /// Builds a context reading the time from `clock`.
    pub fn at(access: &'a dyn AccessPolicy, caller: Address, clock: &dyn Clock) -> Self {
        Self::new(access, caller, clock.now())
    }

    /// The same context with a different caller.
    pub fn with_caller(self, caller: Address) -> Self {
        Self { caller, ..self }
    }

    /// Returns `true` if the caller holds `role`.
    pub fn has_role(&self, role: Role) -> bool {
        self.access.has_role(role, &self.caller)
    }

    /// Returns `true` if the caller is the super-admin.
    pub fn is_super_admin(&self) -> bool {
        self.access.is_super_admin(&self.caller)
    }

    /// Fails unless the caller holds `role`.
    pub fn require_role(&self, role: Role) -> LedgerResult<()> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                account: self.caller,
                role,
            })
        }
    }
}

impl std::fmt::Debug for Env<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("caller", &self.caller)
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The shared, versioned ledger state.
#[derive(Debug)]
pub struct State {
    pub(crate) namespaces: NamespaceTable,
    pub(crate) tokens: TokenRegistry,
    pub(crate) ledger: LedgerStore,
    pub(crate) limiter: LimiterStore,
    pub(crate) events: EventLog,
    pub(crate) regions: Regions,
    version: u64,
}

impl State {
    /// Builds genesis state and claims every core namespace.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if two core partitions would share
    /// a namespace or if the limiter defaults are unusable.
    pub fn new(config: &LedgerConfig) -> LedgerResult<Self> {
        config.validate()?;

        let mut namespaces = NamespaceTable::new();
        namespaces.claim(TokenRegistry::DOMAIN)?;
        namespaces.claim(LedgerStore::DOMAIN)?;
        namespaces.claim(LimiterStore::DOMAIN)?;
        namespaces.claim(EventLog::DOMAIN)?;

        tracing::debug!(
            root = %config.root_symbol,
            partitions = namespaces.domains().count(),
            "state initialized"
        );

        Ok(Self {
            namespaces,
            tokens: TokenRegistry::new(config),
            ledger: LedgerStore::default(),
            limiter: LimiterStore::new(config.limiter),
            events: EventLog::new(),
            regions: Regions::default(),
            version: 0,
        })
    }

    /// Number of committed mutations since genesis.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The namespace table.
    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    /// Token records.
    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Balances, supplies, allowances and bans.
    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    /// Limiter configuration and windows.
    pub fn limiter(&self) -> &LimiterStore {
        &self.limiter
    }

    /// Committed events.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// An extension partition, if it has been allocated.
    pub fn region<P: Partition>(&self) -> Option<&P> {
        self.regions.get::<P>()
    }

    /// Mutable access to an extension partition, allocating it on first use.
    ///
    /// Direct writes bypass [`Tx`] staging; use them only for single-step
    /// administrative updates and bump the version with
    /// [`commit_events`](Self::commit_events).
    pub fn region_mut<P: Partition>(&mut self) -> LedgerResult<&mut P> {
        self.regions.get_or_claim::<P>(&mut self.namespaces)
    }

    /// Opens a staged transaction.
    pub fn begin<'s, 'e>(&'s mut self, env: Env<'e>) -> Tx<'s, 'e> {
        Tx::new(self, env)
    }

    /// Runs `f` in a transaction and commits if it succeeds.
    ///
    /// An error from `f` drops the transaction, so nothing `f` staged is
    /// applied.
    pub fn transact<T>(
        &mut self,
        env: Env<'_>,
        f: impl FnOnce(&mut Tx<'_, '_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut tx = self.begin(env);
        let out = f(&mut tx)?;
        tx.commit();
        Ok(out)
    }

    /// Bumps the version and appends `events`.
    pub fn commit_events(&mut self, env: Env<'_>, events: Vec<Event>) {
        self.version += 1;
        self.events.append(self.version, env.now, events);
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// A `State` behind a mutex; every call holds the lock to completion.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<State>>,
}

impl SharedState {
    /// Wraps `state`.
    pub fn new(state: State) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Runs `f` with exclusive access.
    pub fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Current version.
    pub fn version(&self) -> u64 {
        self.inner.lock().version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::RoleTable;
    use crate::limiter::DefaultLimiterConfig;

    #[test]
    fn genesis_claims_core_partitions() {
        let state = State::new(&LedgerConfig::default()).unwrap();
        let ns = state.namespaces();
        assert!(ns.is_claimed(TokenRegistry::DOMAIN));
        assert!(ns.is_claimed(LedgerStore::DOMAIN));
        assert!(ns.is_claimed(LimiterStore::DOMAIN));
        assert!(ns.is_claimed(EventLog::DOMAIN));
        assert_eq!(state.version(), 0);
    }

    #[test]
    fn unusable_limiter_defaults_rejected() {
        let config = LedgerConfig {
            limiter: DefaultLimiterConfig {
                bin_count: 0,
                ..DefaultLimiterConfig::default()
            },
            ..LedgerConfig::default()
        };
        assert!(State::new(&config).is_err());
    }

    #[test]
    fn env_role_checks() {
        let admin = Address::from_low_u8(1);
        let table = RoleTable::new(admin);
        let env = Env::new(&table, admin, 0);
        assert!(env.is_super_admin());
        assert!(env.require_role(Role::Admin).is_ok());

        let other = env.with_caller(Address::from_low_u8(2));
        assert!(matches!(
            other.require_role(Role::Admin),
            Err(LedgerError::Unauthorized { role: Role::Admin, .. })
        ));
    }

    #[test]
    fn shared_state_serializes_access() {
        let shared = SharedState::new(State::new(&LedgerConfig::default()).unwrap());
        let table = RoleTable::new(Address::from_low_u8(1));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                let table = table.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        shared.with(|s| {
                            s.commit_events(Env::new(&table, table.super_admin(), 0), Vec::new())
                        });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shared.version(), 100);
    }
}
