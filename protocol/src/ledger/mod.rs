//! # Ledger
//!
//! Balances, per-token supply, base-token allowances and ban lists.
//!
//! ```text
//! mod.rs         — LedgerStore, BanList, one-shot State entry points
//! changeset.rs   — staged writes of an open transaction
//! transaction.rs — Tx: every mutating ledger operation
//! ```
//!
//! ## Invariants
//!
//! 1. `supply[id] == Σ balance[id][*]` after every commit.
//! 2. `supply[id] <= max_supply[id]`.
//! 3. A failed operation leaves the state exactly as it was.
//!
//! All three follow from routing every write through a [`Tx`]: supply and
//! balance change together in the same leg, every check runs before
//! commit, and commit only copies staged values.

pub(crate) mod changeset;
pub mod transaction;

pub use transaction::{Tx, Unbonded};

use std::collections::{BTreeMap, BTreeSet};

use crate::access::Role;
use crate::error::{LedgerError, LedgerResult};
use crate::events::Event;
use crate::partition::Partition;
use crate::state::{Env, State};
use crate::token::{TokenId, TokenParams, TokenRecord};
use crate::types::{Address, Amount};

// ---------------------------------------------------------------------------
// BanList
// ---------------------------------------------------------------------------

/// Global and per-token operator bans.
#[derive(Debug, Clone, Default)]
pub struct BanList {
    global: BTreeSet<Address>,
    per_token: BTreeSet<(TokenId, Address)>,
}

impl BanList {
    /// Returns `true` if `operator` is banned globally or for `token`.
    pub fn is_banned(&self, token: &TokenId, operator: &Address) -> bool {
        self.global.contains(operator) || self.per_token.contains(&(*token, *operator))
    }

    /// Returns `true` if `operator` is banned for every token.
    pub fn is_globally_banned(&self, operator: &Address) -> bool {
        self.global.contains(operator)
    }

    /// Adds a ban. Returns `false` if it was already present.
    fn insert(&mut self, token: Option<TokenId>, operator: Address) -> bool {
        match token {
            None => self.global.insert(operator),
            Some(id) => self.per_token.insert((id, operator)),
        }
    }

    /// Lifts a ban. Returns `false` if it was not present.
    fn remove(&mut self, token: Option<TokenId>, operator: &Address) -> bool {
        match token {
            None => self.global.remove(operator),
            Some(id) => self.per_token.remove(&(id, *operator)),
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// The ledger's partition.
#[derive(Debug, Clone, Default)]
pub struct LedgerStore {
    balances: BTreeMap<(TokenId, Address), Amount>,
    supplies: BTreeMap<TokenId, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
    bans: BanList,
    paused: bool,
}

impl Partition for LedgerStore {
    const DOMAIN: &'static str = "strata.ledger";
}

impl LedgerStore {
    /// Balance of `account` in `token`; zero if never credited.
    pub fn balance(&self, token: &TokenId, account: &Address) -> Amount {
        self.balances.get(&(*token, *account)).copied().unwrap_or(0)
    }

    /// Total supply of `token`.
    pub fn supply(&self, token: &TokenId) -> Amount {
        self.supplies.get(token).copied().unwrap_or(0)
    }

    /// Base-token allowance from `owner` to `spender`.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or(0)
    }

    /// The ban list.
    pub fn bans(&self) -> &BanList {
        &self.bans
    }

    /// Returns `true` if the ledger is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Non-zero holders of `token`, in address order.
    pub fn holders(&self, token: &TokenId) -> Vec<(Address, Amount)> {
        let lower = (*token, Address::ZERO);
        self.balances
            .range(lower..)
            .take_while(|((t, _), _)| t == token)
            .filter(|(_, amount)| **amount > 0)
            .map(|((_, account), amount)| (*account, *amount))
            .collect()
    }

    /// Sum of all balances of `token`. Equals [`supply`](Self::supply)
    /// whenever the ledger is consistent.
    pub fn sum_of_balances(&self, token: &TokenId) -> Amount {
        self.holders(token)
            .iter()
            .fold(0, |acc: Amount, (_, amount)| acc.saturating_add(*amount))
    }

    /// Tokens with a non-zero supply counter.
    pub fn tokens_with_supply(&self) -> impl Iterator<Item = (&TokenId, &Amount)> {
        self.supplies.iter().filter(|(_, s)| **s > 0)
    }

    // Zero entries are dropped so the maps only hold live balances.

    pub(crate) fn put_balance(&mut self, token: TokenId, account: Address, amount: Amount) {
        if amount == 0 {
            self.balances.remove(&(token, account));
        } else {
            self.balances.insert((token, account), amount);
        }
    }

    pub(crate) fn put_supply(&mut self, token: TokenId, supply: Amount) {
        if supply == 0 {
            self.supplies.remove(&token);
        } else {
            self.supplies.insert(token, supply);
        }
    }

    pub(crate) fn put_allowance(&mut self, owner: Address, spender: Address, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }
}

// ---------------------------------------------------------------------------
// One-shot entry points
// ---------------------------------------------------------------------------

impl State {
    /// Creates a token under `parent`. See [`Tx::create_token`].
    pub fn create_token(
        &mut self,
        env: Env<'_>,
        parent: TokenId,
        params: TokenParams,
    ) -> LedgerResult<TokenId> {
        self.transact(env, |tx| tx.create_token(parent, params))
    }

    /// Creates sibling tokens atomically. See [`Tx::create_tokens`].
    pub fn create_tokens(
        &mut self,
        env: Env<'_>,
        parent: TokenId,
        params: Vec<TokenParams>,
    ) -> LedgerResult<Vec<TokenId>> {
        self.transact(env, |tx| tx.create_tokens(parent, params))
    }

    /// Mints `amount` of `token` to `to`. See [`Tx::mint`].
    pub fn mint(&mut self, env: Env<'_>, to: Address, token: TokenId, amount: Amount) -> LedgerResult<()> {
        self.transact(env, |tx| tx.mint(to, token, amount))
    }

    /// Mints several tokens to `to` atomically.
    pub fn mint_batch(
        &mut self,
        env: Env<'_>,
        to: Address,
        tokens: &[TokenId],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        self.transact(env, |tx| tx.mint_batch(to, tokens, amounts))
    }

    /// Burns `amount` of `token` held by `account`.
    pub fn burn(&mut self, env: Env<'_>, account: Address, token: TokenId, amount: Amount) -> LedgerResult<()> {
        self.transact(env, |tx| tx.burn(account, token, amount))
    }

    /// Burns several tokens held by `account` atomically.
    pub fn burn_batch(
        &mut self,
        env: Env<'_>,
        account: Address,
        tokens: &[TokenId],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        self.transact(env, |tx| tx.burn_batch(account, tokens, amounts))
    }

    /// Moves `amount` of `token` from `from` to `to`.
    pub fn transfer(
        &mut self,
        env: Env<'_>,
        from: Address,
        to: Address,
        token: TokenId,
        amount: Amount,
    ) -> LedgerResult<()> {
        self.transact(env, |tx| tx.transfer(from, to, token, amount))
    }

    /// Moves `token` from `from` to several destinations atomically.
    pub fn transfer_batch(
        &mut self,
        env: Env<'_>,
        from: Address,
        token: TokenId,
        destinations: &[Address],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        self.transact(env, |tx| tx.transfer_batch(from, token, destinations, amounts))
    }

    /// Sets the caller's base-token allowance for `spender`.
    pub fn approve(&mut self, env: Env<'_>, spender: Address, amount: Amount) -> LedgerResult<()> {
        self.transact(env, |tx| tx.approve(spender, amount))
    }

    /// Spends the caller's allowance from `from`.
    pub fn transfer_from(
        &mut self,
        env: Env<'_>,
        from: Address,
        to: Address,
        amount: Amount,
    ) -> LedgerResult<()> {
        self.transact(env, |tx| tx.transfer_from(from, to, amount))
    }

    /// Replaces a token's metadata URI.
    pub fn set_uri(&mut self, env: Env<'_>, token: TokenId, uri: &str) -> LedgerResult<()> {
        self.transact(env, |tx| tx.set_uri(token, uri))
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Bans `operator` globally (`token == None`) or for one token.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] without the admin role,
    /// [`LedgerError::UnknownToken`] for an unknown token, and
    /// [`LedgerError::Validation`] for the zero address.
    pub fn ban(&mut self, env: Env<'_>, token: Option<TokenId>, operator: Address) -> LedgerResult<()> {
        env.require_role(Role::Admin)?;
        self.check_ban_target(token, &operator)?;
        if self.ledger.bans.insert(token, operator) {
            tracing::info!(%operator, token = ?token, "operator banned");
            self.commit_events(env, vec![Event::OperatorBanned { operator, token_id: token }]);
        }
        Ok(())
    }

    /// Lifts a ban placed by [`ban`](Self::ban).
    pub fn unban(&mut self, env: Env<'_>, token: Option<TokenId>, operator: Address) -> LedgerResult<()> {
        env.require_role(Role::Admin)?;
        self.check_ban_target(token, &operator)?;
        if self.ledger.bans.remove(token, &operator) {
            tracing::info!(%operator, token = ?token, "operator unbanned");
            self.commit_events(env, vec![Event::OperatorUnbanned { operator, token_id: token }]);
        }
        Ok(())
    }

    fn check_ban_target(&self, token: Option<TokenId>, operator: &Address) -> LedgerResult<()> {
        if operator.is_zero() {
            return Err(LedgerError::validation("cannot ban the zero address"));
        }
        if let Some(id) = token {
            self.tokens.require(&id)?;
        }
        Ok(())
    }

    /// Pauses or unpauses every balance-moving operation.
    pub fn set_paused(&mut self, env: Env<'_>, paused: bool) -> LedgerResult<()> {
        if !env.has_role(Role::Pauser) && !env.has_role(Role::Admin) {
            return Err(LedgerError::Unauthorized {
                account: env.caller,
                role: Role::Pauser,
            });
        }
        if self.ledger.paused != paused {
            self.ledger.paused = paused;
            tracing::info!(paused, "ledger pause state changed");
            self.commit_events(env, vec![Event::PauseChanged { paused }]);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Balance of `account` in `token`.
    pub fn balance_of(&self, account: &Address, token: &TokenId) -> Amount {
        self.ledger.balance(token, account)
    }

    /// Balances for paired `accounts[i]`, `tokens[i]`.
    pub fn balance_of_batch(&self, accounts: &[Address], tokens: &[TokenId]) -> LedgerResult<Vec<Amount>> {
        if accounts.len() != tokens.len() {
            return Err(LedgerError::validation(format!(
                "{} accounts but {} tokens",
                accounts.len(),
                tokens.len()
            )));
        }
        Ok(accounts
            .iter()
            .zip(tokens)
            .map(|(account, token)| self.ledger.balance(token, account))
            .collect())
    }

    /// Total supply of `token`.
    pub fn total_supply(&self, token: &TokenId) -> Amount {
        self.ledger.supply(token)
    }

    /// The record for `token`, if created.
    pub fn token(&self, token: &TokenId) -> Option<&TokenRecord> {
        self.tokens.get(token)
    }

    /// Base-token allowance.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.ledger.allowance(owner, spender)
    }

    /// Returns `true` if `operator` is banned for `token`.
    pub fn is_banned(&self, token: &TokenId, operator: &Address) -> bool {
        self.ledger.bans.is_banned(token, operator)
    }

    /// Returns `true` if the ledger is paused.
    pub fn is_paused(&self) -> bool {
        self.ledger.paused
    }
}
