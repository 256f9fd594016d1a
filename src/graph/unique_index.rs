//! Key reservations backing atomic get-or-create on unique indexes.
//!
//! The committed index itself lives with the rest of the committed state in
//! `GraphEngine`; this table only tracks which live transaction is creating
//! the node for a key that is not committed yet. A second transaction asking
//! for the same key waits until the owner commits (and then sees the
//! committed entry) or rolls back (and then takes over the reservation).
//! A wait that would close a cycle of transactions waiting on each other
//! fails at once with `Deadlock` instead of sleeping out the timeout.
//!
//! Lock order: reservation mutex, then the engine's committed-state lock.
//! Commit never holds the committed-state lock while releasing reservations.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{BenchError, Result};
use crate::graph::NodeId;
use crate::storage::IndexKey;

/// Transaction identity used as reservation owner
pub type TxId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The caller owns the key and must create the node.
    Acquired,
    /// The key is already committed to this node.
    Existing(NodeId),
}

#[derive(Default)]
struct ReservationTable {
    /// Uncommitted key → owning transaction.
    owners: HashMap<IndexKey, TxId>,
    /// Waiting transaction → owner it waits on.
    waits_for: HashMap<TxId, TxId>,
}

impl ReservationTable {
    /// Would `tx` waiting on `owner` close a wait cycle?
    fn closes_cycle(&self, tx: TxId, owner: TxId) -> bool {
        let mut current = owner;
        for _ in 0..=self.waits_for.len() {
            if current == tx {
                return true;
            }
            match self.waits_for.get(&current) {
                Some(&next) => current = next,
                None => return false,
            }
        }
        false
    }
}

pub struct UniqueIndex {
    reservations: Mutex<ReservationTable>,
    released: Condvar,
}

impl UniqueIndex {
    pub fn new() -> Self {
        Self {
            reservations: Mutex::new(ReservationTable::default()),
            released: Condvar::new(),
        }
    }

    /// Reserve `key` for transaction `tx`, or report the committed node.
    ///
    /// `committed` looks the key up in committed state; it is re-checked
    /// under the reservation lock after every wakeup. Waits at most
    /// `timeout` for another owner to finish, and not at all when the owner
    /// is itself (transitively) waiting on `tx`.
    pub fn reserve<F>(&self, key: &IndexKey, tx: TxId, timeout: Duration, committed: F) -> Result<Reservation>
    where
        F: Fn(&IndexKey) -> Option<NodeId>,
    {
        let deadline = Instant::now() + timeout;
        let mut held = self.reservations.lock().unwrap();

        let outcome = loop {
            if let Some(node) = committed(key) {
                break Ok(Reservation::Existing(node));
            }

            match held.owners.get(key) {
                None => {
                    held.owners.insert(key.clone(), tx);
                    break Ok(Reservation::Acquired);
                }
                Some(&owner) if owner == tx => break Ok(Reservation::Acquired),
                Some(&owner) => {
                    if held.closes_cycle(tx, owner) {
                        tracing::debug!("tx {} would deadlock with tx {}", tx, owner);
                        break Err(BenchError::Deadlock {
                            index: key.index.clone(),
                            key: key.key.clone(),
                            value: key.value.clone(),
                        });
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break Err(BenchError::LockTimeout {
                            index: key.index.clone(),
                            key: key.key.clone(),
                            value: key.value.clone(),
                        });
                    }
                    tracing::debug!(
                        "tx {} waiting on tx {} for {}:{}={}",
                        tx, owner, key.index, key.key, key.value
                    );
                    held.waits_for.insert(tx, owner);
                    let (guard, _) = self.released.wait_timeout(held, deadline - now).unwrap();
                    held = guard;
                }
            }
        };

        held.waits_for.remove(&tx);
        outcome
    }

    /// Release every reservation `tx` holds among `keys` and wake waiters.
    pub fn release_all(&self, tx: TxId, keys: &[IndexKey]) {
        if keys.is_empty() {
            return;
        }
        let mut held = self.reservations.lock().unwrap();
        for key in keys {
            if held.owners.get(key) == Some(&tx) {
                held.owners.remove(key);
            }
        }
        drop(held);
        self.released.notify_all();
    }

    /// Current owner of an uncommitted key
    pub fn owner(&self, key: &IndexKey) -> Option<TxId> {
        self.reservations.lock().unwrap().owners.get(key).copied()
    }

    /// Number of outstanding reservations
    pub fn reserved_count(&self) -> usize {
        self.reservations.lock().unwrap().owners.len()
    }
}

impl Default for UniqueIndex {
    fn default() -> Self {
        Self::new()
    }
}
