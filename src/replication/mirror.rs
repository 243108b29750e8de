//! Mark-and-sweep reconciliation of store snapshots against local state
//!
//! The transport never says "this peer left". Instead each snapshot of a
//! collection is diffed against the set of ids mirrored so far: ids that
//! stop appearing (deleted, or too old to trust) are reported as removed.

use std::collections::HashSet;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::StoreSnapshot;
use crate::util::time::age_ms;

use super::protocol::{parse_key, Replicated};

/// Outcome of diffing one snapshot
#[derive(Debug)]
pub struct Reconciliation<R> {
    /// Live ids not mirrored before
    pub added: Vec<(Uuid, R)>,
    /// Live ids already mirrored, with their latest record
    pub updated: Vec<(Uuid, R)>,
    /// Mirrored ids that are gone or expired
    pub removed: Vec<Uuid>,
    /// Entries that could not be decoded
    pub skipped: usize,
}

impl<R> Default for Reconciliation<R> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            skipped: 0,
        }
    }
}

impl<R> Reconciliation<R> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Ids of the remote entities currently mirrored from one collection
#[derive(Debug, Default)]
pub struct Mirror {
    known: HashSet<Uuid>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.known.contains(id)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Diff `snapshot` against the mirror and adopt it as the new membership.
    ///
    /// Records older than `ttl_ms` are treated as absent. Records for which
    /// `is_own` holds are never mirrored. A known entry that fails to decode
    /// is kept but not updated.
    pub fn reconcile<R, F>(
        &mut self,
        snapshot: &StoreSnapshot,
        now_ms: u64,
        ttl_ms: u64,
        is_own: F,
    ) -> Reconciliation<R>
    where
        R: Replicated,
        F: Fn(Uuid, &R) -> bool,
    {
        let collection = R::COLLECTION.path();
        let mut result = Reconciliation::default();
        let mut seen = HashSet::with_capacity(snapshot.len());

        for (key, value) in snapshot.iter() {
            let id = match parse_key(key) {
                Ok(id) => id,
                Err(e) => {
                    warn!(collection, error = %e, "Ignoring record");
                    result.skipped += 1;
                    continue;
                }
            };

            let record = match R::decode(value) {
                Ok(record) => record,
                Err(e) => {
                    warn!(collection, id = %id, error = %e, "Ignoring malformed record");
                    if self.known.contains(&id) {
                        seen.insert(id);
                    }
                    result.skipped += 1;
                    continue;
                }
            };

            if is_own(id, &record) {
                continue;
            }

            let age = age_ms(now_ms, record.stamp());
            if age > ttl_ms {
                debug!(collection, id = %id, age, "Record past TTL");
                continue;
            }

            seen.insert(id);
            if self.known.contains(&id) {
                result.updated.push((id, record));
            } else {
                result.added.push((id, record));
            }
        }

        result.removed = self.known.difference(&seen).copied().collect();
        self.known = seen;
        result
    }
}
