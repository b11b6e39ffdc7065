//! # Staged Ledger Transactions
//!
//! A [`Tx`] borrows the [`State`] mutably for its whole lifetime, reads
//! through its own staged writes, and touches the committed state only in
//! [`Tx::commit`]. Any `?` that leaves an operation early simply drops the
//! `Tx`, which discards everything it staged: balances, supplies, token
//! records, allowances, limiter bins, region writes, and events.
//!
//! ## Hook order
//!
//! Every balance-moving leg goes through [`Tx::before_transfer`] (pause and
//! ban checks) before it is staged. Token creation, uri updates and
//! approvals check the caller's ban directly. Mint legs check the supply
//! cap; outbound base-token moves go through [`Tx::limit_outbound`] unless
//! they come from the super-admin.
//!
//! ## Arithmetic
//!
//! Additions are checked. Subtractions are plain only where a comparison
//! directly above proves they cannot underflow; each such spot says so.

use std::any::TypeId;

use crate::access::Role;
use crate::error::{LedgerError, LedgerResult};
use crate::events::Event;
use crate::ledger::changeset::Changeset;
use crate::limiter::AccountWindow;
use crate::partition::{Namespace, NamespaceTable, Partition, Regions};
use crate::state::{Env, State};
use crate::token::{TokenId, TokenParams, TokenRecord};
use crate::types::{Address, Amount};

/// Proof that a first-generation token was burned for its base value.
///
/// Only [`Tx::unbond`] creates one and only [`Tx::pay_out`] consumes it,
/// so base tokens can leave a bond at most once per burn.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "unbonded value is lost unless paid out"]
pub struct Unbonded {
    account: Address,
    gross: Amount,
}

impl Unbonded {
    /// The account that burned the child token.
    pub fn account(&self) -> Address {
        self.account
    }

    /// Base-token value before any fee.
    pub fn gross(&self) -> Amount {
        self.gross
    }
}

/// An open, uncommitted ledger transaction.
pub struct Tx<'s, 'e> {
    state: &'s mut State,
    env: Env<'e>,
    changes: Changeset,
}

impl<'s, 'e> Tx<'s, 'e> {
    pub(crate) fn new(state: &'s mut State, env: Env<'e>) -> Self {
        Self {
            state,
            env,
            changes: Changeset::default(),
        }
    }

    /// The call context.
    pub fn env(&self) -> Env<'e> {
        self.env
    }

    /// The committed state, without this transaction's staged writes.
    pub fn committed(&self) -> &State {
        self.state
    }

    // -----------------------------------------------------------------------
    // Staged reads
    // -----------------------------------------------------------------------

    /// Balance including staged writes.
    pub fn balance(&self, token: &TokenId, account: &Address) -> Amount {
        self.changes
            .balances
            .get(&(*token, *account))
            .copied()
            .unwrap_or_else(|| self.state.ledger.balance(token, account))
    }

    /// Supply including staged writes.
    pub fn supply(&self, token: &TokenId) -> Amount {
        self.changes
            .supplies
            .get(token)
            .copied()
            .unwrap_or_else(|| self.state.ledger.supply(token))
    }

    /// Token record including staged writes.
    pub fn token(&self, id: &TokenId) -> LedgerResult<TokenRecord> {
        match self.changes.tokens.get(id) {
            Some(record) => Ok(record.clone()),
            None => self.state.tokens.require(id).cloned(),
        }
    }

    /// Allowance including staged writes.
    pub fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.changes
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or_else(|| self.state.ledger.allowance(owner, spender))
    }

    fn window(&self, account: &Address) -> Option<AccountWindow> {
        self.changes
            .windows
            .get(account)
            .or_else(|| self.state.limiter.window(account))
            .cloned()
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    fn ensure_not_paused(&self) -> LedgerResult<()> {
        if self.state.ledger.is_paused() {
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    fn ensure_not_banned(&self, token: TokenId, party: Address) -> LedgerResult<()> {
        if self.state.ledger.bans().is_banned(&token, &party) {
            tracing::warn!(operator = %party, %token, "banned operator rejected");
            return Err(LedgerError::BannedOperator {
                operator: party,
                token_id: token,
            });
        }
        Ok(())
    }

    /// Runs before every balance-moving leg: rejects when paused, and when
    /// the operator, the sender or the recipient is banned for `token`.
    pub fn before_transfer(
        &self,
        token: TokenId,
        from: Option<Address>,
        to: Option<Address>,
    ) -> LedgerResult<()> {
        self.ensure_not_paused()?;
        let parties = std::iter::once(self.env.caller).chain(from).chain(to);
        for party in parties {
            self.ensure_not_banned(token, party)?;
        }
        Ok(())
    }

    /// Consults the withdraw limiter for an outbound base-token move of
    /// `amount` by `account`, staging the updated window on success.
    ///
    /// The super-admin bypasses the limiter without touching its state.
    pub fn limit_outbound(&mut self, account: Address, amount: Amount) -> LedgerResult<()> {
        if amount == 0 || self.env.access.is_super_admin(&account) {
            return Ok(());
        }
        let current = self.window(&account);
        let outcome = self
            .state
            .limiter
            .check_and_record(account, current, amount, self.env.now)?;
        if let Some((window, bin_index, active_total)) = outcome {
            self.changes.windows.insert(account, window);
            self.emit(Event::WithdrawRecorded {
                account,
                amount,
                active_total,
                bin_index,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Primitive legs
    // -----------------------------------------------------------------------

    fn credit(&mut self, token: TokenId, account: Address, amount: Amount) -> LedgerResult<()> {
        let balance = self
            .balance(&token, &account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow("balance"))?;
        self.changes.balances.insert((token, account), balance);
        Ok(())
    }

    fn debit(&mut self, token: TokenId, account: Address, amount: Amount) -> LedgerResult<()> {
        let balance = self.balance(&token, &account);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                token_id: token,
                account,
                available: balance,
                requested: amount,
            });
        }
        // balance >= amount checked above.
        self.changes.balances.insert((token, account), balance - amount);
        Ok(())
    }

    fn mint_leg(&mut self, token: TokenId, to: Address, amount: Amount, max_supply: Amount) -> LedgerResult<()> {
        let supply = self.supply(&token);
        let new_supply = supply
            .checked_add(amount)
            .filter(|s| *s <= max_supply)
            .ok_or(LedgerError::SupplyExceeded {
                token_id: token,
                supply,
                amount,
                max_supply,
            })?;
        self.credit(token, to, amount)?;
        self.changes.supplies.insert(token, new_supply);
        self.emit(Event::Minted {
            operator: self.env.caller,
            to,
            token_id: token,
            amount,
        });
        Ok(())
    }

    fn burn_leg(&mut self, token: TokenId, from: Address, amount: Amount) -> LedgerResult<()> {
        let supply = self.supply(&token);
        if amount > supply {
            return Err(LedgerError::SupplyUnderflow {
                token_id: token,
                supply,
                amount,
            });
        }
        self.debit(token, from, amount)?;
        // amount <= supply checked above.
        self.changes.supplies.insert(token, supply - amount);
        self.emit(Event::Burned {
            operator: self.env.caller,
            from,
            token_id: token,
            amount,
        });
        Ok(())
    }

    fn require_creator_or_admin(&self, record: &TokenRecord, action: &'static str) -> LedgerResult<()> {
        if record.creator == self.env.caller || self.env.has_role(Role::Admin) {
            Ok(())
        } else {
            Err(LedgerError::NotPermitted {
                account: self.env.caller,
                action,
            })
        }
    }

    fn require_self_or_admin(&self, account: &Address, action: &'static str) -> LedgerResult<()> {
        if *account == self.env.caller || self.env.has_role(Role::Admin) {
            Ok(())
        } else {
            Err(LedgerError::NotPermitted {
                account: self.env.caller,
                action,
            })
        }
    }

    // -----------------------------------------------------------------------
    // Token creation
    // -----------------------------------------------------------------------

    /// Creates a token under `parent` and returns its id.
    ///
    /// Under the root the caller needs the creator or admin role and a
    /// non-zero exchange rate. Under any other token the caller must be
    /// that token's creator or an admin.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownToken`] if the parent was never created,
    /// [`LedgerError::Unauthorized`] / [`LedgerError::NotPermitted`] for a
    /// caller without rights, [`LedgerError::Validation`] for an empty
    /// symbol, a zero root-child exchange rate, or a parent too deep to
    /// have children.
    pub fn create_token(&mut self, parent: TokenId, params: TokenParams) -> LedgerResult<TokenId> {
        let mut parent_record = self.token(&parent)?;
        self.ensure_not_banned(parent, self.env.caller)?;
        if parent.is_root() {
            if !self.env.has_role(Role::Creator) && !self.env.has_role(Role::Admin) {
                return Err(LedgerError::Unauthorized {
                    account: self.env.caller,
                    role: Role::Creator,
                });
            }
            if params.exchange_rate == 0 {
                return Err(LedgerError::validation("exchange rate must be greater than zero"));
            }
        } else {
            self.require_creator_or_admin(&parent_record, "create children of this token")?;
        }
        if params.symbol.trim().is_empty() {
            return Err(LedgerError::validation("symbol must not be empty"));
        }

        let id = TokenId::encode(parent, parent_record.child_index)?;
        parent_record.child_index = parent_record
            .child_index
            .checked_add(1)
            .ok_or(LedgerError::Overflow("child index"))?;

        let record = TokenRecord {
            name: params.name,
            symbol: params.symbol,
            uri: params.uri,
            exchange_rate: params.exchange_rate,
            max_supply: params.max_supply,
            creator: self.env.caller,
            child_index: 1,
            created: true,
        };
        self.emit(Event::TokenCreated {
            token_id: id,
            parent,
            creator: record.creator,
            name: record.name.clone(),
            symbol: record.symbol.clone(),
            exchange_rate: record.exchange_rate,
            max_supply: record.max_supply,
        });
        self.changes.tokens.insert(parent, parent_record);
        self.changes.tokens.insert(id, record);
        Ok(id)
    }

    /// Creates `params.len()` siblings under `parent`. Any failing item
    /// rejects the whole batch.
    pub fn create_tokens(&mut self, parent: TokenId, params: Vec<TokenParams>) -> LedgerResult<Vec<TokenId>> {
        if params.is_empty() {
            return Err(LedgerError::validation("empty token batch"));
        }
        params
            .into_iter()
            .map(|p| self.create_token(parent, p))
            .collect()
    }

    /// Replaces the metadata URI. Creator or admin only.
    pub fn set_uri(&mut self, token: TokenId, uri: &str) -> LedgerResult<()> {
        let mut record = self.token(&token)?;
        self.ensure_not_banned(token, self.env.caller)?;
        self.require_creator_or_admin(&record, "update the token uri")?;
        record.uri = uri.to_string();
        self.changes.tokens.insert(token, record);
        self.emit(Event::UriUpdated {
            token_id: token,
            uri: uri.to_string(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mint & burn
    // -----------------------------------------------------------------------

    /// Mints `amount` of a child token to `to`.
    ///
    /// The caller must be the token's creator or an admin. For a
    /// first-generation token the caller first burns
    /// `amount * exchange_rate` base tokens as the bond.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] for the zero address or the root token,
    /// [`LedgerError::SupplyExceeded`] past the cap,
    /// [`LedgerError::InsufficientBalance`] if the bond cannot be paid.
    pub fn mint(&mut self, to: Address, token: TokenId, amount: Amount) -> LedgerResult<()> {
        if to.is_zero() {
            return Err(LedgerError::validation("cannot mint to the zero address"));
        }
        if token.is_root() {
            return Err(LedgerError::validation(
                "the base token is only issued through the bridge",
            ));
        }
        let record = self.token(&token)?;
        self.require_creator_or_admin(&record, "mint this token")?;

        if token.is_first_generation() {
            let bond = amount
                .checked_mul(record.exchange_rate)
                .ok_or(LedgerError::Overflow("bonding cost"))?;
            let payer = self.env.caller;
            self.before_transfer(TokenId::ROOT, Some(payer), None)?;
            self.burn_leg(TokenId::ROOT, payer, bond)?;
        }

        self.before_transfer(token, None, Some(to))?;
        self.mint_leg(token, to, amount, record.max_supply)
    }

    /// Mints `amounts[i]` of `tokens[i]` to `to`, leg by leg.
    ///
    /// Legs see each other's effects, so repeating an id counts toward its
    /// cap cumulatively.
    pub fn mint_batch(&mut self, to: Address, tokens: &[TokenId], amounts: &[Amount]) -> LedgerResult<()> {
        check_batch(tokens.len(), amounts.len())?;
        for (token, amount) in tokens.iter().zip(amounts) {
            self.mint(to, *token, *amount)?;
        }
        Ok(())
    }

    /// Issues `amount` of any token, the root included, to `to` without a
    /// bond. This is the deposit path; the caller needs the bridge role.
    pub fn issue(&mut self, to: Address, token: TokenId, amount: Amount) -> LedgerResult<()> {
        self.env.require_role(Role::Bridge)?;
        if to.is_zero() {
            return Err(LedgerError::validation("cannot issue to the zero address"));
        }
        let record = self.token(&token)?;
        self.before_transfer(token, None, Some(to))?;
        self.mint_leg(token, to, amount, record.max_supply)
    }

    /// Burns `amount` of `token` from `account`. The caller must be the
    /// account itself or an admin.
    ///
    /// # Errors
    ///
    /// [`LedgerError::SupplyUnderflow`] if `amount` exceeds the total
    /// supply, [`LedgerError::InsufficientBalance`] if it exceeds the
    /// account's balance.
    pub fn burn(&mut self, account: Address, token: TokenId, amount: Amount) -> LedgerResult<()> {
        self.require_self_or_admin(&account, "burn from this account")?;
        self.token(&token)?;
        self.before_transfer(token, Some(account), None)?;
        self.burn_leg(token, account, amount)
    }

    /// Burns `amounts[i]` of `tokens[i]` from `account`.
    pub fn burn_batch(&mut self, account: Address, tokens: &[TokenId], amounts: &[Amount]) -> LedgerResult<()> {
        check_batch(tokens.len(), amounts.len())?;
        for (token, amount) in tokens.iter().zip(amounts) {
            self.burn(account, *token, *amount)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------------

    /// Single-leg [`transfer_batch`](Self::transfer_batch).
    pub fn transfer(&mut self, from: Address, to: Address, token: TokenId, amount: Amount) -> LedgerResult<()> {
        self.transfer_batch(from, token, &[to], &[amount])
    }

    /// Moves `amounts[i]` of `token` from `from` to `destinations[i]`.
    ///
    /// The caller must be `from`. Base-token batches are checked against the
    /// withdraw limiter once, for the aggregate amount.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Validation`] for mismatched or empty arrays and zero
    /// destinations, [`LedgerError::BannedOperator`] if any party is banned,
    /// [`LedgerError::RateLimitExceeded`] over the window limit and
    /// [`LedgerError::InsufficientBalance`] if any leg cannot be covered.
    pub fn transfer_batch(
        &mut self,
        from: Address,
        token: TokenId,
        destinations: &[Address],
        amounts: &[Amount],
    ) -> LedgerResult<()> {
        check_batch(destinations.len(), amounts.len())?;
        if from != self.env.caller {
            return Err(LedgerError::NotPermitted {
                account: self.env.caller,
                action: "transfer from another account",
            });
        }
        self.token(&token)?;

        let mut total: Amount = 0;
        for (to, amount) in destinations.iter().zip(amounts) {
            if to.is_zero() {
                return Err(LedgerError::validation("cannot transfer to the zero address"));
            }
            self.before_transfer(token, Some(from), Some(*to))?;
            total = total
                .checked_add(*amount)
                .ok_or(LedgerError::Overflow("batch total"))?;
        }

        if token.is_root() {
            self.limit_outbound(from, total)?;
        }

        for (to, amount) in destinations.iter().zip(amounts) {
            self.move_balance(token, from, *to, *amount)?;
        }
        Ok(())
    }

    fn move_balance(&mut self, token: TokenId, from: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        self.debit(token, from, amount)?;
        self.credit(token, to, amount)?;
        self.emit(Event::Transferred {
            operator: self.env.caller,
            from,
            to,
            token_id: token,
            amount,
        });
        Ok(())
    }

    /// Sets the caller's base-token allowance for `spender`.
    /// `Amount::MAX` is unlimited.
    pub fn approve(&mut self, spender: Address, amount: Amount) -> LedgerResult<()> {
        self.ensure_not_paused()?;
        let owner = self.env.caller;
        self.ensure_not_banned(TokenId::ROOT, owner)?;
        if owner.is_zero() || spender.is_zero() {
            return Err(LedgerError::validation("approval involves the zero address"));
        }
        self.changes.allowances.insert((owner, spender), amount);
        self.emit(Event::Approval {
            owner,
            spender,
            amount,
        });
        Ok(())
    }

    /// Moves base tokens from `from` to `to` on the caller's allowance.
    ///
    /// An unlimited allowance is never decremented.
    pub fn transfer_from(&mut self, from: Address, to: Address, amount: Amount) -> LedgerResult<()> {
        let spender = self.env.caller;
        if to.is_zero() {
            return Err(LedgerError::validation("cannot transfer to the zero address"));
        }
        self.before_transfer(TokenId::ROOT, Some(from), Some(to))?;
        let allowance = self.allowance(&from, &spender);
        if allowance != Amount::MAX {
            if allowance < amount {
                return Err(LedgerError::InsufficientAllowance {
                    owner: from,
                    spender,
                    available: allowance,
                    requested: amount,
                });
            }
            // allowance >= amount checked above.
            self.changes.allowances.insert((from, spender), allowance - amount);
        }
        self.limit_outbound(from, amount)?;
        self.move_balance(TokenId::ROOT, from, to, amount)
    }

    // -----------------------------------------------------------------------
    // Bond release
    // -----------------------------------------------------------------------

    /// Burns `amount` of the caller's first-generation `token` and returns
    /// its base value (`amount * exchange_rate`) as an [`Unbonded`] claim.
    pub fn unbond(&mut self, token: TokenId, amount: Amount) -> LedgerResult<Unbonded> {
        if !token.is_first_generation() {
            return Err(LedgerError::validation(format!(
                "token {token} is not bonded against the base token"
            )));
        }
        let record = self.token(&token)?;
        let account = self.env.caller;
        let gross = amount
            .checked_mul(record.exchange_rate)
            .ok_or(LedgerError::Overflow("unbond value"))?;
        self.before_transfer(token, Some(account), None)?;
        self.burn_leg(token, account, amount)?;
        Ok(Unbonded { account, gross })
    }

    /// Credits `net` base tokens for an [`Unbonded`] claim. `net` may be
    /// less than the gross value (the difference is never issued) but not
    /// more. The payout goes through the withdraw limiter.
    pub fn pay_out(&mut self, claim: Unbonded, net: Amount) -> LedgerResult<Amount> {
        if net > claim.gross {
            return Err(LedgerError::validation(format!(
                "payout {net} exceeds unbonded value {}",
                claim.gross
            )));
        }
        let root = self.token(&TokenId::ROOT)?;
        self.before_transfer(TokenId::ROOT, None, Some(claim.account))?;
        self.limit_outbound(claim.account, net)?;
        self.mint_leg(TokenId::ROOT, claim.account, net, root.max_supply)?;
        Ok(net)
    }

    // -----------------------------------------------------------------------
    // Extensions
    // -----------------------------------------------------------------------

    fn emit(&mut self, event: Event) {
        self.changes.events.push(event);
    }

    /// Stages an event from an extension partition. `domain` must be
    /// claimed already or by an earlier write in this transaction.
    pub fn emit_extension(
        &mut self,
        domain: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> LedgerResult<()> {
        let staged = self.changes.claims.contains_key(&Namespace::derive(domain));
        if !staged && !self.state.namespaces.is_claimed(domain) {
            return Err(LedgerError::validation(format!("partition {domain} is not claimed")));
        }
        self.emit(Event::Extension {
            domain: domain.to_string(),
            kind: kind.to_string(),
            payload,
        });
        Ok(())
    }

    /// Stages a write into extension partition `P`, applied at commit.
    ///
    /// A region that does not exist yet is allocated and its namespace
    /// claimed at commit, so a dropped `Tx` leaves neither behind.
    pub fn update_region<P: Partition>(&mut self, f: impl FnOnce(&mut P) + 'static) -> LedgerResult<()> {
        let ns = P::namespace();
        match self.changes.claims.get(&ns) {
            Some(staged) if *staged != TypeId::of::<P>() => {
                return Err(LedgerError::validation(format!(
                    "partition {} holds a foreign type",
                    P::DOMAIN
                )));
            }
            Some(_) => {}
            None if self.state.regions.get::<P>().is_some() => {}
            None => {
                self.state.regions.check_claim::<P>(&self.state.namespaces)?;
                self.changes.claims.insert(ns, TypeId::of::<P>());
            }
        }
        self.changes.regions.push(Box::new(
            move |regions: &mut Regions, table: &mut NamespaceTable| {
                // Checked when staged.
                if let Ok(region) = regions.get_or_claim::<P>(table) {
                    f(region);
                }
            },
        ));
        Ok(())
    }

    /// Applies every staged write and appends the staged events. Returns
    /// the new state version.
    pub fn commit(self) -> u64 {
        let Tx { state, env, changes } = self;
        let writes = changes.write_count();
        let events = changes.apply(state);
        if writes == 0 && events.is_empty() {
            return state.version();
        }
        let event_count = events.len();
        state.commit_events(env, events);
        tracing::debug!(
            version = state.version(),
            writes,
            events = event_count,
            caller = %env.caller,
            "transaction committed"
        );
        state.version()
    }
}

fn check_batch(left: usize, right: usize) -> LedgerResult<()> {
    if left != right {
        return Err(LedgerError::validation(format!(
            "batch length mismatch: {left} vs {right}"
        )));
    }
    if left == 0 {
        return Err(LedgerError::validation("empty batch"));
    }
    Ok(())
}
