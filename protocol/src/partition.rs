//! # Storage Partitioning
//!
//! Modules written independently share one [`State`](crate::state::State)
//! without coordinating a schema. Each module names its region with a
//! human-readable domain string; the string is hashed (BLAKE3) into a
//! [`Namespace`], and the [`NamespaceTable`] refuses to hand the same
//! namespace out twice.
//!
//! Core modules get a typed field on `State`. Anything else (the bridge,
//! future extensions) lives in a [`Regions`] map keyed by namespace and
//! accessed by type through the [`Partition`] trait.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{LedgerError, LedgerResult};

/// Opaque partition key derived from a domain string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace([u8; 32]);

impl Namespace {
    /// Derives the namespace for `domain`. Deterministic across processes.
    pub fn derive(domain: &str) -> Self {
        Self(*blake3::hash(domain.as_bytes()).as_bytes())
    }

    /// Returns the raw digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A module's private region of shared state.
pub trait Partition: Default + Any + Send + Sync {
    /// Human-readable domain the namespace is derived from.
    const DOMAIN: &'static str;

    /// The namespace for this partition.
    fn namespace() -> Namespace {
        Namespace::derive(Self::DOMAIN)
    }
}

// ---------------------------------------------------------------------------
// NamespaceTable
// ---------------------------------------------------------------------------

/// Records which domain owns which namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NamespaceTable {
    owners: BTreeMap<Namespace, String>,
}

impl NamespaceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the namespace for `domain`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the domain was already claimed
    /// or if its digest collides with a different domain.
    pub fn claim(&mut self, domain: &str) -> LedgerResult<Namespace> {
        let ns = Namespace::derive(domain);
        if let Some(owner) = self.owners.get(&ns) {
            return Err(if owner == domain {
                LedgerError::validation(format!("partition {domain} already claimed"))
            } else {
                LedgerError::validation(format!(
                    "partition {domain} collides with {owner} at {ns}"
                ))
            });
        }
        self.owners.insert(ns, domain.to_string());
        Ok(ns)
    }

    /// Returns the domain that owns `ns`, if any.
    pub fn owner(&self, ns: &Namespace) -> Option<&str> {
        self.owners.get(ns).map(String::as_str)
    }

    /// Returns `true` if `domain` has been claimed.
    pub fn is_claimed(&self, domain: &str) -> bool {
        self.owners.contains_key(&Namespace::derive(domain))
    }

    /// Claimed domains in namespace order.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.owners.values().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Regions
// ---------------------------------------------------------------------------

/// Type-keyed storage for partitions that are not core fields of `State`.
#[derive(Default)]
pub struct Regions {
    slots: BTreeMap<Namespace, Box<dyn Any + Send + Sync>>,
}

impl Regions {
    /// Returns the region for `P` if it has been allocated.
    pub fn get<P: Partition>(&self) -> Option<&P> {
        self.slots
            .get(&P::namespace())
            .and_then(|slot| slot.downcast_ref::<P>())
    }

    /// Mutable access to an allocated region.
    pub fn get_mut<P: Partition>(&mut self) -> Option<&mut P> {
        self.slots
            .get_mut(&P::namespace())
            .and_then(|slot| slot.downcast_mut::<P>())
    }

    /// Returns the region for `P`, allocating it on first access.
    ///
    /// The namespace is claimed in `table` at allocation time.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if another domain already owns
    /// the namespace, or the slot holds a different type.
    pub fn get_or_claim<P: Partition>(&mut self, table: &mut NamespaceTable) -> LedgerResult<&mut P> {
        let ns = P::namespace();
        if !self.slots.contains_key(&ns) {
            table.claim(P::DOMAIN)?;
            self.slots.insert(ns, Box::new(P::default()));
        }
        self.slots
            .get_mut(&ns)
            .and_then(|slot| slot.downcast_mut::<P>())
            .ok_or_else(|| {
                LedgerError::validation(format!("partition {} holds a foreign type", P::DOMAIN))
            })
    }

    /// Checks that [`get_or_claim`](Self::get_or_claim) would succeed for
    /// `P`, without allocating or claiming anything.
    ///
    /// # Errors
    ///
    /// Same conditions as [`get_or_claim`](Self::get_or_claim).
    pub fn check_claim<P: Partition>(&self, table: &NamespaceTable) -> LedgerResult<()> {
        match self.slots.get(&P::namespace()) {
            Some(slot) if slot.is::<P>() => Ok(()),
            Some(_) => Err(LedgerError::validation(format!(
                "partition {} holds a foreign type",
                P::DOMAIN
            ))),
            None if table.is_claimed(P::DOMAIN) => Err(LedgerError::validation(format!(
                "partition {} already claimed",
                P::DOMAIN
            ))),
            None => Ok(()),
        }
    }

    /// Number of allocated regions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no region has been allocated.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for Regions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.slots.keys()).finish()
    }
}
