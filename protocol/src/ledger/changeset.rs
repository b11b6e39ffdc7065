//! Staged writes of an open transaction.
//!
//! Every write a [`Tx`](super::transaction::Tx) makes lands here first and
//! shadows the committed value for later reads in the same transaction.
//! Applying a changeset only overwrites values; it cannot fail, which is
//! what makes commit all-or-nothing.

use std::any::TypeId;
use std::collections::BTreeMap;

use crate::events::Event;
use crate::limiter::AccountWindow;
use crate::partition::{Namespace, NamespaceTable, Regions};
use crate::state::State;
use crate::token::{TokenId, TokenRecord};
use crate::types::{Address, Amount};

/// Deferred write into an extension partition. Allocates and claims the
/// region if this transaction is the first to touch it.
pub(crate) type RegionWrite = Box<dyn FnOnce(&mut Regions, &mut NamespaceTable)>;

#[derive(Default)]
pub(crate) struct Changeset {
    pub balances: BTreeMap<(TokenId, Address), Amount>,
    pub supplies: BTreeMap<TokenId, Amount>,
    pub tokens: BTreeMap<TokenId, TokenRecord>,
    pub allowances: BTreeMap<(Address, Address), Amount>,
    pub windows: BTreeMap<Address, AccountWindow>,
    pub regions: Vec<RegionWrite>,
    /// Namespaces this transaction will claim on commit, by partition type.
    pub claims: BTreeMap<Namespace, TypeId>,
    pub events: Vec<Event>,
}

impl Changeset {
    /// Number of staged ledger writes, events excluded.
    pub fn write_count(&self) -> usize {
        self.balances.len()
            + self.supplies.len()
            + self.tokens.len()
            + self.allowances.len()
            + self.windows.len()
            + self.regions.len()
    }

    /// Writes everything into `state`. Returns the staged events.
    pub fn apply(self, state: &mut State) -> Vec<Event> {
        for ((token, account), amount) in self.balances {
            state.ledger.put_balance(token, account, amount);
        }
        for (token, supply) in self.supplies {
            state.ledger.put_supply(token, supply);
        }
        for (id, record) in self.tokens {
            state.tokens.put(id, record);
        }
        for ((owner, spender), amount) in self.allowances {
            state.ledger.put_allowance(owner, spender, amount);
        }
        for (account, window) in self.windows {
            state.limiter.put_window(account, window);
        }
        for write in self.regions {
            write(&mut state.regions, &mut state.namespaces);
        }
        self.events
    }
}

impl std::fmt::Debug for Changeset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Changeset")
            .field("balances", &self.balances.len())
            .field("supplies", &self.supplies.len())
            .field("tokens", &self.tokens.len())
            .field("allowances", &self.allowances.len())
            .field("windows", &self.windows.len())
            .field("regions", &self.regions.len())
            .field("claims", &self.claims.len())
            .field("events", &self.events.len())
            .finish()
    }
}
