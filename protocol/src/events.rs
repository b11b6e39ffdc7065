//! # Event Log
//!
//! Append-only record of what committed. Events are staged alongside the
//! ledger writes of a transaction and appended in one go at commit, so an
//! aborted operation leaves no trace here either. Nothing in the ledger
//! reads the log back.

use serde::{Deserialize, Serialize};

use crate::partition::Partition;
use crate::token::TokenId;
use crate::types::{Address, Amount};

/// A ledger notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A token record was created.
    TokenCreated {
        token_id: TokenId,
        parent: TokenId,
        creator: Address,
        name: String,
        symbol: String,
        #[serde(with = "crate::types::amount_string")]
        exchange_rate: Amount,
        #[serde(with = "crate::types::amount_string")]
        max_supply: Amount,
    },
    /// Supply was created and credited.
    Minted {
        operator: Address,
        to: Address,
        token_id: TokenId,
        #[serde(with = "crate::types::amount_string")]
        amount: Amount,
    },
    /// Supply was debited and destroyed.
    Burned {
        operator: Address,
        from: Address,
        token_id: TokenId,
        #[serde(with = "crate::types::amount_string")]
        amount: Amount,
    },
    /// A balance moved between accounts.
    Transferred {
        operator: Address,
        from: Address,
        to: Address,
        token_id: TokenId,
        #[serde(with = "crate::types::amount_string")]
        amount: Amount,
    },
    /// A base-token allowance was set.
    Approval {
        owner: Address,
        spender: Address,
        #[serde(with = "crate::types::amount_string")]
        amount: Amount,
    },
    /// A token's metadata URI changed.
    UriUpdated { token_id: TokenId, uri: String },
    /// An operator was banned. `token_id` is `None` for a global ban.
    OperatorBanned {
        operator: Address,
        token_id: Option<TokenId>,
    },
    /// A ban was lifted.
    OperatorUnbanned {
        operator: Address,
        token_id: Option<TokenId>,
    },
    /// The ledger was paused or unpaused.
    PauseChanged { paused: bool },
    /// A limited withdrawal was recorded in an account's window.
    WithdrawRecorded {
        account: Address,
        #[serde(with = "crate::types::amount_string")]
        amount: Amount,
        #[serde(with = "crate::types::amount_string")]
        active_total: Amount,
        bin_index: usize,
    },
    /// Limiter configuration changed. `account` is `None` for defaults.
    LimiterConfigUpdated {
        account: Option<Address>,
        setting: String,
    },
    /// Emitted by a module living in an extension partition.
    Extension {
        domain: String,
        kind: String,
        payload: serde_json::Value,
    },
}

/// An event together with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Zero-based position in the log.
    pub seq: u64,
    /// State version the event was committed in.
    pub version: u64,
    /// Unix seconds of the committing call.
    pub timestamp: u64,
    /// The event itself.
    pub event: Event,
}

/// Append-only event storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl Partition for EventLog {
    const DOMAIN: &'static str = "strata.events";
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `events` as one committed batch.
    pub(crate) fn append(&mut self, version: u64, timestamp: u64, events: Vec<Event>) {
        for event in events {
            let seq = self.records.len() as u64;
            self.records.push(EventRecord {
                seq,
                version,
                timestamp,
                event,
            });
        }
    }

    /// All records in commit order.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `seq >= from`.
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(self.records.len());
        &self.records[start..]
    }

    /// The most recent record.
    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been committed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
