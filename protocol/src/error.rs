//! # Ledger Errors
//!
//! One variant per failure kind a caller needs to tell apart. Every error
//! aborts the operation that raised it; the staged transaction is dropped
//! and no partial state survives.

use thiserror::Error;

use crate::access::Role;
use crate::token::TokenId;
use crate::types::{Address, Amount};

/// Errors raised by any ledger, limiter or partition operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Malformed input: zero address, mismatched batch lengths, zero bin
    /// count, empty batch and similar.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The caller lacks the role the operation requires.
    #[error("unauthorized: {account} lacks role {role}")]
    Unauthorized {
        /// The calling account.
        account: Address,
        /// The role that was required.
        role: Role,
    },

    /// The caller is neither the owner of the resource nor an admin.
    #[error("unauthorized: {account} may not {action}")]
    NotPermitted {
        /// The calling account.
        account: Address,
        /// What the caller tried to do.
        action: &'static str,
    },

    /// An account involved in the transfer is banned, globally or for this token.
    #[error("operator {operator} is banned for token {token_id}")]
    BannedOperator {
        /// The banned account.
        operator: Address,
        /// The token the operation targeted.
        token_id: TokenId,
    },

    /// The mint would push the supply over the token's cap.
    #[error("supply exceeded for token {token_id}: supply {supply} + {amount} > max {max_supply}")]
    SupplyExceeded {
        /// The token being minted.
        token_id: TokenId,
        /// Supply before the mint.
        supply: Amount,
        /// Amount the caller tried to mint.
        amount: Amount,
        /// The token's cap.
        max_supply: Amount,
    },

    /// The burn is larger than the token's total supply.
    #[error("burn of {amount} exceeds total supply {supply} of token {token_id}")]
    SupplyUnderflow {
        /// The token being burned.
        token_id: TokenId,
        /// Current total supply.
        supply: Amount,
        /// Amount the caller tried to burn.
        amount: Amount,
    },

    /// The debited account does not hold enough of the token.
    #[error("insufficient balance of token {token_id} for {account}: have {available}, need {requested}")]
    InsufficientBalance {
        /// The token being debited.
        token_id: TokenId,
        /// The debited account.
        account: Address,
        /// Current balance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// The spender's allowance is smaller than the transfer.
    #[error("insufficient allowance: {spender} may spend {available} of {owner}, requested {requested}")]
    InsufficientAllowance {
        /// Owner of the funds.
        owner: Address,
        /// The approved spender.
        spender: Address,
        /// Remaining allowance.
        available: Amount,
        /// Amount requested.
        requested: Amount,
    },

    /// The withdrawal would exceed the account's sliding-window quota.
    #[error("withdraw limit exceeded for {account}: requested {requested}, active {active}, limit {limit}")]
    RateLimitExceeded {
        /// The limited account.
        account: Address,
        /// Amount of the rejected withdrawal.
        requested: Amount,
        /// Sum of the non-expired bins at the time of the check.
        active: Amount,
        /// Effective limit for the account.
        limit: Amount,
    },

    /// Handing value to an external party failed.
    #[error("external transfer failed: {0}")]
    ExternalTransferFailed(String),

    /// The token id has never been created.
    #[error("unknown token: {0}")]
    UnknownToken(TokenId),

    /// The ledger is paused.
    #[error("ledger is paused")]
    Paused,

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow: {0}")]
    Overflow(&'static str),
}

/// Result alias used throughout the protocol crate.
pub type LedgerResult<T> = Result<T, LedgerError>;

impl LedgerError {
    /// Shorthand for a [`LedgerError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }
}
