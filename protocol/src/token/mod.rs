//! # Token Identity & Registry
//!
//! ```text
//! id.rs  — TokenId packing: (parent << 128) | local_index
//! mod.rs — TokenRecord, TokenParams, TokenRegistry
//! ```
//!
//! The registry is the partition that owns every [`TokenRecord`]. The root
//! record is present from construction; every other record is created
//! exactly once by the ledger's creation path and afterwards only its `uri`
//! and `child_index` change.

pub mod id;

pub use id::TokenId;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::partition::Partition;
use crate::types::{Address, Amount};

/// Metadata and supply policy of a single token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Human-readable name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Metadata URI. The only field mutable after creation.
    pub uri: String,
    /// Base-token units bonded per unit minted (first generation only).
    pub exchange_rate: Amount,
    /// Supply cap in smallest units.
    pub max_supply: Amount,
    /// Account that created the token.
    pub creator: Address,
    /// Local index the next child will receive. Starts at 1.
    pub child_index: u128,
    /// Set once at creation.
    pub created: bool,
}

/// Caller-supplied fields for a new token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    /// Human-readable name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Bonding rate against the base token.
    pub exchange_rate: Amount,
    /// Supply cap.
    pub max_supply: Amount,
    /// Metadata URI.
    #[serde(default)]
    pub uri: String,
}

impl TokenParams {
    /// Convenience constructor with an empty URI.
    pub fn new(name: &str, symbol: &str, exchange_rate: Amount, max_supply: Amount) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            exchange_rate,
            max_supply,
            uri: String::new(),
        }
    }

    /// Sets the metadata URI.
    pub fn with_uri(mut self, uri: &str) -> Self {
        self.uri = uri.to_string();
        self
    }
}

/// All token records, keyed by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRegistry {
    records: BTreeMap<TokenId, TokenRecord>,
}

impl Partition for TokenRegistry {
    const DOMAIN: &'static str = "strata.token.registry";
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new(&LedgerConfig::default())
    }
}

impl TokenRegistry {
    /// Creates a registry holding only the root record.
    pub fn new(config: &LedgerConfig) -> Self {
        let root = TokenRecord {
            name: config.root_name.clone(),
            symbol: config.root_symbol.clone(),
            uri: String::new(),
            exchange_rate: 1,
            max_supply: config.root_max_supply,
            creator: Address::ZERO,
            child_index: 1,
            created: true,
        };
        let mut records = BTreeMap::new();
        records.insert(TokenId::ROOT, root);
        Self { records }
    }

    /// Returns the record for `id` if it has been created.
    pub fn get(&self, id: &TokenId) -> Option<&TokenRecord> {
        self.records.get(id).filter(|r| r.created)
    }

    /// Like [`get`](Self::get) but reports an unknown id as an error.
    pub fn require(&self, id: &TokenId) -> LedgerResult<&TokenRecord> {
        self.get(id).ok_or(LedgerError::UnknownToken(*id))
    }

    /// Returns `true` if `id` names a created token.
    pub fn exists(&self, id: &TokenId) -> bool {
        self.get(id).is_some()
    }

    /// Number of created tokens, the root included.
    pub fn len(&self) -> usize {
        self.records.values().filter(|r| r.created).count()
    }

    /// Always `false`: the root record is present from construction.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all created tokens in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&TokenId, &TokenRecord)> {
        self.records.iter().filter(|(_, r)| r.created)
    }

    /// Direct children of `parent`, in creation order.
    pub fn children(&self, parent: &TokenId) -> Vec<TokenId> {
        self.iter()
            .map(|(id, _)| *id)
            .filter(|id| !id.is_root() && id.parent() == *parent)
            .collect()
    }

    /// Writes a record. Only the ledger's commit path calls this.
    pub(crate) fn put(&mut self, id: TokenId, record: TokenRecord) {
        self.records.insert(id, record);
    }
}
