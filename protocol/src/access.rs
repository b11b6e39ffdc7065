//! # Access Gate
//!
//! Role checks are an external collaborator: the ledger only ever asks
//! "does this account hold this role?" and "is this the super-admin?".
//! [`AccessPolicy`] is that question; [`RoleTable`] is the in-memory answer
//! used by the node and the tests.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::types::Address;

/// Roles consulted by ledger entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full administrative rights over tokens, bans and metadata.
    Admin,
    /// May create first-generation tokens under the root.
    Creator,
    /// May mint through the bridge deposit path.
    Bridge,
    /// May pause and unpause the ledger.
    Pauser,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Creator => write!(f, "creator"),
            Role::Bridge => write!(f, "bridge"),
            Role::Pauser => write!(f, "pauser"),
        }
    }
}

/// The capability every mutating entry point consults.
pub trait AccessPolicy {
    /// Returns `true` if `account` holds `role`.
    fn has_role(&self, role: Role, account: &Address) -> bool;

    /// Returns `true` if `account` is the designated super-admin.
    fn is_super_admin(&self, account: &Address) -> bool;
}

/// In-memory role assignments with a single super-admin.
///
/// The super-admin implicitly holds every role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleTable {
    super_admin: Address,
    grants: HashMap<Role, HashSet<Address>>,
}

impl RoleTable {
    /// Creates a table whose only privileged account is `super_admin`.
    pub fn new(super_admin: Address) -> Self {
        Self {
            super_admin,
            grants: HashMap::new(),
        }
    }

    /// Returns the super-admin address.
    pub fn super_admin(&self) -> Address {
        self.super_admin
    }

    /// Grants `role` to `account`. Idempotent.
    pub fn grant(&mut self, role: Role, account: Address) {
        self.grants.entry(role).or_default().insert(account);
    }

    /// Revokes `role` from `account`. Idempotent.
    pub fn revoke(&mut self, role: Role, account: &Address) {
        if let Some(set) = self.grants.get_mut(&role) {
            set.remove(account);
        }
    }
}

impl AccessPolicy for RoleTable {
    fn has_role(&self, role: Role, account: &Address) -> bool {
        if self.is_super_admin(account) {
            return true;
        }
        self.grants
            .get(&role)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }

    fn is_super_admin(&self, account: &Address) -> bool {
        !account.is_zero() && *account == self.super_admin
    }
}
