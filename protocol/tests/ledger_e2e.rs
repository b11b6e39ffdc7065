//! End-to-end tests for the Strata ledger.
//!
//! These tests drive the public `State` entry points the way a host would:
//! one shared state, one access policy, a manual clock for anything
//! time-dependent. Each test builds its own state; nothing is shared.

use proptest::prelude::*;

use strata_protocol::{
    Address, Amount, Clock, Env, Event, LedgerConfig, LedgerError, LedgerResult, ManualClock, Role,
    RoleTable, State, TokenId, TokenParams,
};

const ADMIN: Address = Address::from_low_u8(0x01);
const BRIDGE: Address = Address::from_low_u8(0x02);
const PAUSER: Address = Address::from_low_u8(0x03);
const ALICE: Address = Address::from_low_u8(0xa1);
const BOB: Address = Address::from_low_u8(0xb0);
const CAROL: Address = Address::from_low_u8(0xc0);

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn roles() -> RoleTable {
    let mut roles = RoleTable::new(ADMIN);
    roles.grant(Role::Bridge, BRIDGE);
    roles.grant(Role::Pauser, PAUSER);
    roles.grant(Role::Creator, ALICE);
    roles
}

fn fresh() -> State {
    State::new(&LedgerConfig::default()).unwrap()
}

/// Deposits `amount` base tokens to `to` through the bridge role.
fn deposit(state: &mut State, roles: &RoleTable, to: Address, amount: Amount) {
    state
        .transact(Env::new(roles, BRIDGE, 0), |tx| tx.issue(to, TokenId::ROOT, amount))
        .unwrap();
}

fn create(state: &mut State, roles: &RoleTable, parent: TokenId, rate: Amount, max: Amount) -> TokenId {
    state
        .create_token(
            Env::new(roles, ALICE, 0),
            parent,
            TokenParams::new("Gold", "GLD", rate, max),
        )
        .unwrap()
}

/// Window of 100s split into 10 bins with a limit of 1000.
fn tight_limiter(state: &mut State, roles: &RoleTable) {
    let env = Env::new(roles, ADMIN, 0);
    state.set_default_window_seconds(env, 100).unwrap();
    state.set_default_bin_count(env, 10).unwrap();
    state.set_default_limit_amount(env, 1000).unwrap();
}

fn assert_consistent(state: &State, tokens: &[TokenId]) {
    for token in tokens {
        let supply = state.total_supply(token);
        assert_eq!(state.ledger().sum_of_balances(token), supply, "token {token}");
        if let Some(record) = state.token(token) {
            assert!(supply <= record.max_supply, "token {token} over cap");
        }
    }
}

// ---------------------------------------------------------------------------
// Token identity
// ---------------------------------------------------------------------------

#[test]
fn hierarchy_ids_encode_parent_and_index() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 100);
    let nugget = create(&mut state, &roles, gold, 0, 100);

    assert_eq!(gold, TokenId::from(1u128));
    assert_eq!(nugget.decode(), (gold, 1));
    assert_eq!(nugget.parent(), gold);
    assert_eq!(state.tokens().children(&gold), vec![nugget]);
}

#[test]
fn only_the_creator_extends_a_token() {
    let mut roles = roles();
    roles.grant(Role::Creator, BOB);
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 100);

    let err = state
        .create_token(Env::new(&roles, BOB, 0), gold, TokenParams::new("X", "X", 1, 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotPermitted { .. }));

    // Admins may extend any token.
    state
        .create_token(Env::new(&roles, ADMIN, 0), gold, TokenParams::new("Y", "Y", 1, 1))
        .unwrap();
}

#[test]
fn second_generation_cannot_have_children() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 100);
    let nugget = create(&mut state, &roles, gold, 1, 100);

    let err = state
        .create_token(Env::new(&roles, ALICE, 0), nugget, TokenParams::new("Z", "Z", 1, 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn root_child_needs_creator_role_and_rate() {
    let roles = roles();
    let mut state = fresh();
    let err = state
        .create_token(Env::new(&roles, BOB, 0), TokenId::ROOT, TokenParams::new("G", "G", 1, 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { role: Role::Creator, .. }));

    let err = state
        .create_token(Env::new(&roles, ALICE, 0), TokenId::ROOT, TokenParams::new("G", "G", 0, 1))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn unknown_parent_rejected() {
    let roles = roles();
    let mut state = fresh();
    let err = state
        .create_token(
            Env::new(&roles, ADMIN, 0),
            TokenId::from(99u128),
            TokenParams::new("G", "G", 1, 1),
        )
        .unwrap_err();
    assert_eq!(err, LedgerError::UnknownToken(TokenId::from(99u128)));
}

// ---------------------------------------------------------------------------
// Mint, burn, supply cap
// ---------------------------------------------------------------------------

#[test]
fn supply_cap_is_enforced() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 100);
    let nugget = create(&mut state, &roles, gold, 1, 100);
    let env = Env::new(&roles, ALICE, 0);

    state.mint(env, BOB, nugget, 60).unwrap();
    let err = state.mint(env, BOB, nugget, 50).unwrap_err();
    assert_eq!(
        err,
        LedgerError::SupplyExceeded {
            token_id: nugget,
            supply: 60,
            amount: 50,
            max_supply: 100,
        }
    );
    assert_eq!(state.total_supply(&nugget), 60);
}

#[test]
fn batch_mint_counts_repeated_ids_against_cap() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 1000);
    let nugget = create(&mut state, &roles, gold, 1, 100);

    let err = state
        .mint_batch(Env::new(&roles, ALICE, 0), BOB, &[nugget, nugget], &[60, 50])
        .unwrap_err();
    assert!(matches!(err, LedgerError::SupplyExceeded { supply: 60, .. }));
    assert_eq!(state.total_supply(&nugget), 0);
    assert_eq!(state.balance_of(&BOB, &nugget), 0);
}

#[test]
fn mint_rejects_zero_address_and_root() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 100);
    let env = Env::new(&roles, ALICE, 0);

    assert!(matches!(
        state.mint(env, Address::ZERO, gold, 1),
        Err(LedgerError::Validation(_))
    ));
    assert!(matches!(
        state.mint(Env::new(&roles, ADMIN, 0), BOB, TokenId::ROOT, 1),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn first_generation_mint_burns_base_bond() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    deposit(&mut state, &roles, CAROL, 100);
    let gold = create(&mut state, &roles, TokenId::ROOT, 5, 1000);

    state.mint(Env::new(&roles, ALICE, 0), BOB, gold, 10).unwrap();
    assert_eq!(state.balance_of(&ALICE, &TokenId::ROOT), 50);
    assert_eq!(state.total_supply(&TokenId::ROOT), 150);
    assert_eq!(state.balance_of(&BOB, &gold), 10);

    let err = state.mint(Env::new(&roles, ALICE, 0), BOB, gold, 11).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientBalance { available: 50, requested: 55, .. }
    ));
    assert_eq!(state.balance_of(&BOB, &gold), 10);
}

#[test]
fn second_generation_mint_needs_no_bond() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 5, 1000);
    let nugget = create(&mut state, &roles, gold, 1, 1000);

    state.mint(Env::new(&roles, ALICE, 0), BOB, nugget, 500).unwrap();
    assert_eq!(state.total_supply(&TokenId::ROOT), 0);
    assert_eq!(state.total_supply(&nugget), 500);
}

#[test]
fn burn_beyond_supply_reports_underflow() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 10);
    let err = state
        .burn(Env::new(&roles, ALICE, 0), ALICE, TokenId::ROOT, 11)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::SupplyUnderflow {
            token_id: TokenId::ROOT,
            supply: 10,
            amount: 11,
        }
    );
}

#[test]
fn burn_of_someone_else_needs_admin() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 10);

    assert!(matches!(
        state.burn(Env::new(&roles, BOB, 0), ALICE, TokenId::ROOT, 1),
        Err(LedgerError::NotPermitted { .. })
    ));
    state.burn(Env::new(&roles, ADMIN, 0), ALICE, TokenId::ROOT, 4).unwrap();
    assert_eq!(state.balance_of(&ALICE, &TokenId::ROOT), 6);
    assert_eq!(state.total_supply(&TokenId::ROOT), 6);
}

// ---------------------------------------------------------------------------
// Transfers & batch atomicity
// ---------------------------------------------------------------------------

#[test]
fn failing_leg_rolls_back_whole_batch() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    let version = state.version();
    let events = state.events().len();

    let dests = [BOB, CAROL, BOB, CAROL, BOB];
    let err = state
        .transfer_batch(Env::new(&roles, ALICE, 0), ALICE, TokenId::ROOT, &dests, &[30, 30, 50, 10, 10])
        .unwrap_err();

    assert!(matches!(
        err,
        LedgerError::InsufficientBalance { available: 40, requested: 50, .. }
    ));
    assert_eq!(state.balance_of(&ALICE, &TokenId::ROOT), 100);
    assert_eq!(state.balance_of(&BOB, &TokenId::ROOT), 0);
    assert_eq!(state.balance_of(&CAROL, &TokenId::ROOT), 0);
    assert_eq!(state.version(), version);
    assert_eq!(state.events().len(), events);
    // The limiter saw the batch total, but the bins were staged too.
    assert_eq!(state.withdraw_status(&ALICE, 0).used, 0);
}

#[test]
fn batch_transfer_moves_every_leg() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    state
        .transfer_batch(Env::new(&roles, ALICE, 0), ALICE, TokenId::ROOT, &[BOB, CAROL], &[30, 20])
        .unwrap();

    let balances = state
        .balance_of_batch(&[ALICE, BOB, CAROL], &[TokenId::ROOT; 3])
        .unwrap();
    assert_eq!(balances, vec![50, 30, 20]);
    assert_eq!(state.withdraw_status(&ALICE, 0).used, 50);
}

#[test]
fn mismatched_batch_rejected() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    assert!(matches!(
        state.transfer_batch(Env::new(&roles, ALICE, 0), ALICE, TokenId::ROOT, &[BOB], &[1, 2]),
        Err(LedgerError::Validation(_))
    ));
    assert!(state.balance_of_batch(&[ALICE], &[]).is_err());
}

#[test]
fn transfer_of_another_account_rejected() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    assert!(matches!(
        state.transfer(Env::new(&roles, BOB, 0), ALICE, BOB, TokenId::ROOT, 1),
        Err(LedgerError::NotPermitted { .. })
    ));
}

#[test]
fn transfer_emits_event() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    state
        .transfer(Env::new(&roles, ALICE, 9), ALICE, BOB, TokenId::ROOT, 25)
        .unwrap();

    let last = state.events().last().unwrap();
    assert_eq!(last.timestamp, 9);
    assert_eq!(
        last.event,
        Event::Transferred {
            operator: ALICE,
            from: ALICE,
            to: BOB,
            token_id: TokenId::ROOT,
            amount: 25,
        }
    );
}

// ---------------------------------------------------------------------------
// Allowances
// ---------------------------------------------------------------------------

#[test]
fn transfer_from_consumes_allowance() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    state.approve(Env::new(&roles, ALICE, 0), BOB, 70).unwrap();

    let bob = Env::new(&roles, BOB, 0);
    state.transfer_from(bob, ALICE, CAROL, 60).unwrap();
    assert_eq!(state.allowance(&ALICE, &BOB), 10);
    assert_eq!(state.balance_of(&CAROL, &TokenId::ROOT), 60);

    let err = state.transfer_from(bob, ALICE, CAROL, 11).unwrap_err();
    assert_eq!(
        err,
        LedgerError::InsufficientAllowance {
            owner: ALICE,
            spender: BOB,
            available: 10,
            requested: 11,
        }
    );
    // The limiter charges the owner, not the spender.
    assert_eq!(state.withdraw_status(&ALICE, 0).used, 60);
}

#[test]
fn unlimited_allowance_is_never_decremented() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    state.approve(Env::new(&roles, ALICE, 0), BOB, Amount::MAX).unwrap();
    state.transfer_from(Env::new(&roles, BOB, 0), ALICE, BOB, 100).unwrap();
    assert_eq!(state.allowance(&ALICE, &BOB), Amount::MAX);
}

// ---------------------------------------------------------------------------
// Bans & pause
// ---------------------------------------------------------------------------

#[test]
fn global_ban_blocks_every_side() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    deposit(&mut state, &roles, BOB, 100);
    state.ban(Env::new(&roles, ADMIN, 0), None, BOB).unwrap();

    let err = state
        .transfer(Env::new(&roles, BOB, 0), BOB, ALICE, TokenId::ROOT, 1)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::BannedOperator {
            operator: BOB,
            token_id: TokenId::ROOT,
        }
    );
    assert!(matches!(
        state.transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, TokenId::ROOT, 1),
        Err(LedgerError::BannedOperator { operator: BOB, .. })
    ));

    state.unban(Env::new(&roles, ADMIN, 0), None, BOB).unwrap();
    state
        .transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, TokenId::ROOT, 1)
        .unwrap();
}

#[test]
fn token_ban_is_scoped_to_that_token() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 1000);
    let nugget = create(&mut state, &roles, gold, 1, 1000);
    deposit(&mut state, &roles, BOB, 100);
    state.mint(Env::new(&roles, ALICE, 0), BOB, nugget, 100).unwrap();

    state.ban(Env::new(&roles, ADMIN, 0), Some(nugget), BOB).unwrap();
    assert!(state.is_banned(&nugget, &BOB));
    assert!(!state.is_banned(&TokenId::ROOT, &BOB));

    let bob = Env::new(&roles, BOB, 0);
    assert!(state.transfer(bob, BOB, CAROL, nugget, 1).is_err());
    state.transfer(bob, BOB, CAROL, TokenId::ROOT, 1).unwrap();
}

#[test]
fn globally_banned_operator_changes_nothing() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    deposit(&mut state, &roles, BOB, 100);
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 1000);
    state.mint(Env::new(&roles, ALICE, 0), ALICE, gold, 10).unwrap();
    state.approve(Env::new(&roles, BOB, 0), ALICE, 50).unwrap();
    state.ban(Env::new(&roles, ADMIN, 0), None, ALICE).unwrap();

    let version = state.version();
    let holdings = [
        state.balance_of(&ALICE, &TokenId::ROOT),
        state.balance_of(&ALICE, &gold),
        state.balance_of(&BOB, &TokenId::ROOT),
        state.total_supply(&TokenId::ROOT),
        state.total_supply(&gold),
    ];

    let alice = Env::new(&roles, ALICE, 0);
    let attempts: Vec<(&str, LedgerResult<()>)> = vec![
        (
            "create_token",
            state
                .create_token(alice, TokenId::ROOT, TokenParams::new("X", "X", 1, 1))
                .map(drop),
        ),
        (
            "create_child",
            state
                .create_token(alice, gold, TokenParams::new("Y", "Y", 1, 1))
                .map(drop),
        ),
        ("set_uri", state.set_uri(alice, gold, "ipfs://new")),
        ("approve", state.approve(alice, CAROL, 1)),
        ("mint", state.mint(alice, ALICE, gold, 1)),
        ("mint_batch", state.mint_batch(alice, CAROL, &[gold], &[1])),
        ("burn", state.burn(alice, ALICE, gold, 1)),
        ("burn_batch", state.burn_batch(alice, ALICE, &[gold], &[1])),
        ("transfer", state.transfer(alice, ALICE, BOB, TokenId::ROOT, 1)),
        (
            "transfer_batch",
            state.transfer_batch(alice, ALICE, TokenId::ROOT, &[BOB, CAROL], &[1, 1]),
        ),
        ("transfer_from", state.transfer_from(alice, BOB, CAROL, 1)),
        (
            "issue_to_banned",
            state.transact(Env::new(&roles, BRIDGE, 0), |tx| tx.issue(ALICE, TokenId::ROOT, 1)),
        ),
    ];
    for (name, result) in attempts {
        assert!(
            matches!(result, Err(LedgerError::BannedOperator { operator: ALICE, .. })),
            "{name}: {result:?}"
        );
    }

    assert_eq!(state.version(), version);
    assert_eq!(
        holdings,
        [
            state.balance_of(&ALICE, &TokenId::ROOT),
            state.balance_of(&ALICE, &gold),
            state.balance_of(&BOB, &TokenId::ROOT),
            state.total_supply(&TokenId::ROOT),
            state.total_supply(&gold),
        ]
    );
    assert_eq!(state.allowance(&BOB, &ALICE), 50);
    assert_eq!(state.allowance(&ALICE, &CAROL), 0);
    assert_eq!(state.token(&gold).unwrap().child_index, 1);
    assert_eq!(state.token(&TokenId::ROOT).unwrap().child_index, 2);
    assert_ne!(state.token(&gold).unwrap().uri, "ipfs://new");
}

#[test]
fn ban_requires_admin() {
    let roles = roles();
    let mut state = fresh();
    assert!(matches!(
        state.ban(Env::new(&roles, ALICE, 0), None, BOB),
        Err(LedgerError::Unauthorized { role: Role::Admin, .. })
    ));
}

#[test]
fn pause_halts_balance_moves_only() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 100);
    state.set_paused(Env::new(&roles, PAUSER, 0), true).unwrap();
    assert!(state.is_paused());

    assert_eq!(
        state.transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, TokenId::ROOT, 1),
        Err(LedgerError::Paused)
    );
    assert_eq!(
        state.transact(Env::new(&roles, BRIDGE, 0), |tx| tx.issue(BOB, TokenId::ROOT, 1)),
        Err(LedgerError::Paused)
    );
    // Administration keeps working while paused.
    state.ban(Env::new(&roles, ADMIN, 0), None, CAROL).unwrap();

    state.set_paused(Env::new(&roles, ADMIN, 0), false).unwrap();
    state
        .transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, TokenId::ROOT, 1)
        .unwrap();
}

#[test]
fn pause_requires_pauser_or_admin() {
    let roles = roles();
    let mut state = fresh();
    assert!(matches!(
        state.set_paused(Env::new(&roles, ALICE, 0), true),
        Err(LedgerError::Unauthorized { role: Role::Pauser, .. })
    ));
}

// ---------------------------------------------------------------------------
// Withdraw limiter
// ---------------------------------------------------------------------------

#[test]
fn second_withdrawal_over_window_limit_fails() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 5000);
    tight_limiter(&mut state, &roles);
    let clock = ManualClock::new(1_000);

    state
        .transfer(Env::at(&roles, ALICE, &clock), ALICE, BOB, TokenId::ROOT, 600)
        .unwrap();
    let err = state
        .transfer(Env::at(&roles, ALICE, &clock), ALICE, BOB, TokenId::ROOT, 500)
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::RateLimitExceeded {
            account: ALICE,
            requested: 500,
            active: 600,
            limit: 1000,
        }
    );
}

#[test]
fn window_slides_after_expiry() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 5000);
    tight_limiter(&mut state, &roles);
    let clock = ManualClock::new(1_000);

    state
        .transfer(Env::at(&roles, ALICE, &clock), ALICE, BOB, TokenId::ROOT, 600)
        .unwrap();
    clock.advance(101);
    state
        .transfer(Env::at(&roles, ALICE, &clock), ALICE, BOB, TokenId::ROOT, 500)
        .unwrap();

    let status = state.withdraw_status(&ALICE, clock.now());
    assert_eq!(status.used, 500);
    assert_eq!(status.remaining, 500);
}

#[test]
fn limit_boundary_is_inclusive() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 5000);
    tight_limiter(&mut state, &roles);
    let env = Env::new(&roles, ALICE, 1_000);

    state.transfer(env, ALICE, BOB, TokenId::ROOT, 600).unwrap();
    state.transfer(env, ALICE, BOB, TokenId::ROOT, 400).unwrap();
    assert!(matches!(
        state.transfer(env, ALICE, BOB, TokenId::ROOT, 1),
        Err(LedgerError::RateLimitExceeded { active: 1000, .. })
    ));
}

#[test]
fn super_admin_bypasses_limiter() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ADMIN, 10_000);
    tight_limiter(&mut state, &roles);

    state
        .transfer(Env::new(&roles, ADMIN, 0), ADMIN, BOB, TokenId::ROOT, 5_000)
        .unwrap();
    assert!(state.limiter().window(&ADMIN).is_none());
    assert_eq!(state.balance_of(&BOB, &TokenId::ROOT), 5_000);
}

#[test]
fn child_token_transfers_are_not_limited() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 100_000);
    let nugget = create(&mut state, &roles, gold, 1, 100_000);
    state.mint(Env::new(&roles, ALICE, 0), ALICE, nugget, 50_000).unwrap();
    tight_limiter(&mut state, &roles);

    state
        .transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, nugget, 50_000)
        .unwrap();
    assert!(state.limiter().window(&ALICE).is_none());
}

#[test]
fn account_override_takes_precedence() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 5000);
    tight_limiter(&mut state, &roles);
    state
        .set_account_config(Env::new(&roles, ADMIN, 0), ALICE, 0, 0, 3000)
        .unwrap();

    state
        .transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, TokenId::ROOT, 2500)
        .unwrap();
    let cfg = state.limiter().effective_config(&ALICE);
    assert_eq!(cfg.limit_amount, 3000);
    assert_eq!(cfg.window_seconds, 100);
}

#[test]
fn bins_stay_pinned_until_reset() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 5000);
    tight_limiter(&mut state, &roles);
    let admin = Env::new(&roles, ADMIN, 0);

    state
        .transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, TokenId::ROOT, 10)
        .unwrap();
    state.set_default_bin_count(admin, 5).unwrap();
    assert_eq!(state.withdraw_status(&ALICE, 0).bin_count, 10);

    state.reset_account(admin, ALICE).unwrap();
    assert_eq!(state.withdraw_status(&ALICE, 0).bin_count, 5);
    assert_eq!(state.withdraw_status(&ALICE, 0).used, 0);
}

#[test]
fn window_change_cannot_strand_a_pinned_account() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 1000);
    let admin = Env::new(&roles, ADMIN, 0);
    state.set_default_window_seconds(admin, 1000).unwrap();
    state.set_default_bin_count(admin, 100).unwrap();

    state
        .transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, TokenId::ROOT, 1)
        .unwrap();
    state.set_default_bin_count(admin, 10).unwrap();

    let version = state.version();
    assert!(matches!(
        state.set_default_window_seconds(admin, 50),
        Err(LedgerError::Validation(_))
    ));
    assert_eq!(state.version(), version);
    assert_eq!(state.limiter().defaults().window_seconds, 1000);

    state
        .transfer(Env::new(&roles, ALICE, 10), ALICE, BOB, TokenId::ROOT, 1)
        .unwrap();
    assert_eq!(state.withdraw_status(&ALICE, 10).used, 2);
}

#[test]
fn limiter_configuration_is_super_admin_only() {
    let mut roles = roles();
    roles.grant(Role::Admin, BOB);
    let mut state = fresh();
    assert!(matches!(
        state.set_default_limit_amount(Env::new(&roles, BOB, 0), 1),
        Err(LedgerError::NotPermitted { .. })
    ));
    assert!(matches!(
        state.set_default_bin_count(Env::new(&roles, ADMIN, 0), 0),
        Err(LedgerError::Validation(_))
    ));
}

#[test]
fn disabled_limiter_records_nothing() {
    let roles = roles();
    let mut state = fresh();
    deposit(&mut state, &roles, ALICE, 5000);
    tight_limiter(&mut state, &roles);
    state
        .set_limiter_enabled(Env::new(&roles, ADMIN, 0), false)
        .unwrap();

    state
        .transfer(Env::new(&roles, ALICE, 0), ALICE, BOB, TokenId::ROOT, 4000)
        .unwrap();
    assert!(state.limiter().window(&ALICE).is_none());
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[test]
fn uri_update_by_creator_only() {
    let roles = roles();
    let mut state = fresh();
    let gold = create(&mut state, &roles, TokenId::ROOT, 1, 100);

    assert!(matches!(
        state.set_uri(Env::new(&roles, BOB, 0), gold, "ipfs://nope"),
        Err(LedgerError::NotPermitted { .. })
    ));
    state
        .set_uri(Env::new(&roles, ALICE, 0), gold, "ipfs://gold")
        .unwrap();
    assert_eq!(state.token(&gold).unwrap().uri, "ipfs://gold");
}

// ---------------------------------------------------------------------------
// Conservation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Deposit(usize, Amount),
    Mint(usize, usize, Amount),
    Transfer(usize, usize, usize, Amount),
    Burn(usize, usize, Amount),
}

const ACCOUNTS: [Address; 3] = [ALICE, BOB, CAROL];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize, 0..500u128).prop_map(|(a, n)| Op::Deposit(a, n)),
        (1..3usize, 0..3usize, 0..300u128).prop_map(|(t, a, n)| Op::Mint(t, a, n)),
        (0..3usize, 0..3usize, 0..3usize, 0..400u128).prop_map(|(t, f, to, n)| Op::Transfer(t, f, to, n)),
        (0..3usize, 0..3usize, 0..200u128).prop_map(|(t, a, n)| Op::Burn(t, a, n)),
    ]
}

proptest! {
    #[test]
    fn supply_always_equals_sum_of_balances(ops in prop::collection::vec(op(), 1..60)) {
        let roles = roles();
        let mut state = fresh();
        let gold = create(&mut state, &roles, TokenId::ROOT, 2, 2_000);
        let nugget = create(&mut state, &roles, gold, 1, 1_000);
        let tokens = [TokenId::ROOT, gold, nugget];

        for op in ops {
            // Individual operations may fail; the ledger must stay consistent either way.
            let _ = match op {
                Op::Deposit(a, n) => state.transact(Env::new(&roles, BRIDGE, 0), |tx| {
                    tx.issue(ACCOUNTS[a], TokenId::ROOT, n)
                }),
                Op::Mint(t, a, n) => state.mint(Env::new(&roles, ALICE, 0), ACCOUNTS[a], tokens[t], n),
                Op::Transfer(t, f, to, n) => state.transfer(
                    Env::new(&roles, ACCOUNTS[f], 0),
                    ACCOUNTS[f],
                    ACCOUNTS[to],
                    tokens[t],
                    n,
                ),
                Op::Burn(t, a, n) => state.burn(Env::new(&roles, ACCOUNTS[a], 0), ACCOUNTS[a], tokens[t], n),
            };
            assert_consistent(&state, &tokens);
        }
    }
}
