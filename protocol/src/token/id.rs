//! # Hierarchical Token Identifiers
//!
//! A [`TokenId`] packs a parent/child relationship into one 256-bit value:
//!
//! ```text
//!   255            128 127              0
//!  +------------------+------------------+
//!  |     parent id    |   local index    |
//!  +------------------+------------------+
//! ```
//!
//! Id `0` is the root (base currency). First-generation tokens have a zero
//! high half, so their ids fit in 128 bits and can themselves be parents.
//! Second-generation ids use the high half and therefore cannot be encoded
//! as a parent again. Local indices start at 1, so no child ever aliases
//! its parent.

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LedgerError, LedgerResult};

/// Width of each half of the packed id.
const HALF_BITS: usize = 128;

/// A packed `(parent, local_index)` token identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(U256);

impl TokenId {
    /// The root/base token.
    pub const ROOT: TokenId = TokenId(U256([0, 0, 0, 0]));

    /// Packs `parent` and `local_index` into a child id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if `local_index` is zero or if
    /// `parent` does not fit in the 128-bit parent half.
    pub fn encode(parent: TokenId, local_index: u128) -> LedgerResult<TokenId> {
        if local_index == 0 {
            return Err(LedgerError::validation("local index 0 is reserved"));
        }
        if !parent.can_parent() {
            return Err(LedgerError::validation(format!(
                "token {parent} is too deep in the hierarchy to have children"
            )));
        }
        let high = U256::from(parent.0.low_u128()) << HALF_BITS;
        Ok(TokenId(high | U256::from(local_index)))
    }

    /// Splits the id into `(parent, local_index)`. The root decodes to
    /// `(ROOT, 0)`.
    pub fn decode(&self) -> (TokenId, u128) {
        let parent = (self.0 >> HALF_BITS).low_u128();
        (TokenId(U256::from(parent)), self.0.low_u128())
    }

    /// Returns the parent id. The root is its own parent.
    pub fn parent(&self) -> TokenId {
        self.decode().0
    }

    /// Returns the local index under the parent.
    pub fn local_index(&self) -> u128 {
        self.0.low_u128()
    }

    /// Returns `true` for the base token.
    pub fn is_root(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns `true` if this id is a direct child of the root.
    pub fn is_first_generation(&self) -> bool {
        !self.is_root() && self.parent().is_root()
    }

    /// Returns `true` if the id fits in the parent half and may therefore
    /// have children of its own.
    pub fn can_parent(&self) -> bool {
        self.0.bits() <= HALF_BITS
    }

    /// Builds an id from its raw 256-bit value.
    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    /// Returns the raw 256-bit value.
    pub fn as_raw(&self) -> U256 {
        self.0
    }
}

impl From<u128> for TokenId {
    fn from(raw: u128) -> Self {
        Self(U256::from(raw))
    }
}

impl fmt::Debug for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (parent, index) = self.decode();
        write!(f, "TokenId({:x}/{})", parent.0, index)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}
