//! Logical locks on named objects (entity/column/index qualified names),
//! mediated with a waits-for graph: a transaction whose wait would close a
//! cycle is aborted with `Deadlock` rather than allowed to block forever.

use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex};

use crate::core::common::types::TransactionId;
use crate::core::common::OxidbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

enum Grant {
    Shared(HashSet<TransactionId>),
    Exclusive(TransactionId),
}

struct Inner {
    locks: HashMap<String, Grant>,
    waits_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

pub struct LockManager {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { locks: HashMap::new(), waits_for: HashMap::new() }),
            changed: Condvar::new(),
        }
    }

    /// Blocks until `tx` holds `mode` on `object`.
    ///
    /// # Errors
    /// Returns `Deadlock` if granting the lock would require `tx` to wait on
    /// a transaction that (transitively) already waits on `tx`.
    pub fn acquire(&self, tx: TransactionId, object: &str, mode: LockMode) -> Result<(), OxidbError> {
        let mut guard = self.inner.lock().map_err(poison)?;
        loop {
            let blockers = match guard.locks.get(object) {
                None => HashSet::new(),
                Some(Grant::Shared(holders)) if mode == LockMode::Shared => {
                    let _ = holders;
                    HashSet::new()
                }
                Some(Grant::Shared(holders)) => {
                    // Exclusive requested: compatible only if `tx` is the sole holder (an upgrade).
                    if holders.len() == 1 && holders.contains(&tx) {
                        HashSet::new()
                    } else {
                        holders.iter().copied().filter(|h| *h != tx).collect()
                    }
                }
                Some(Grant::Exclusive(holder)) if *holder == tx => HashSet::new(),
                Some(Grant::Exclusive(holder)) => std::iter::once(*holder).collect(),
            };

            if blockers.is_empty() {
                match mode {
                    LockMode::Shared => {
                        guard
                            .locks
                            .entry(object.to_string())
                            .and_modify(|g| {
                                if let Grant::Shared(holders) = g {
                                    holders.insert(tx);
                                } else {
                                    *g = Grant::Shared(std::iter::once(tx).collect());
                                }
                            })
                            .or_insert_with(|| Grant::Shared(std::iter::once(tx).collect()));
                    }
                    LockMode::Exclusive => {
                        guard.locks.insert(object.to_string(), Grant::Exclusive(tx));
                    }
                }
                guard.waits_for.remove(&tx);
                self.changed.notify_all();
                return Ok(());
            }

            guard.waits_for.insert(tx, blockers);
            if has_cycle(&guard.waits_for, tx) {
                guard.waits_for.remove(&tx);
                return Err(OxidbError::Deadlock(object.to_string()));
            }
            guard = self.changed.wait(guard).map_err(poison)?;
        }
    }

    /// Releases every lock `tx` holds, waking any transaction waiting on one.
    pub fn release_all(&self, tx: TransactionId) {
        let Ok(mut guard) = self.inner.lock() else { return };
        guard.locks.retain(|_, grant| match grant {
            Grant::Shared(holders) => {
                holders.remove(&tx);
                !holders.is_empty()
            }
            Grant::Exclusive(holder) => *holder != tx,
        });
        guard.waits_for.remove(&tx);
        for waiters in guard.waits_for.values_mut() {
            waiters.remove(&tx);
        }
        drop(guard);
        self.changed.notify_all();
    }
}

fn has_cycle(waits_for: &HashMap<TransactionId, HashSet<TransactionId>>, start: TransactionId) -> bool {
    let mut stack: Vec<TransactionId> = waits_for.get(&start).into_iter().flatten().copied().collect();
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = waits_for.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

fn poison<T>(_: std::sync::PoisonError<T>) -> OxidbError {
    OxidbError::Other("lock manager poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_locks_are_compatible() {
        let mgr = LockManager::new();
        mgr.acquire(TransactionId(1), "warren.main.features", LockMode::Shared).unwrap();
        mgr.acquire(TransactionId(2), "warren.main.features", LockMode::Shared).unwrap();
    }

    #[test]
    fn sole_shared_holder_can_upgrade_to_exclusive() {
        let mgr = LockManager::new();
        let tx = TransactionId(1);
        mgr.acquire(tx, "warren.main.features", LockMode::Shared).unwrap();
        mgr.acquire(tx, "warren.main.features", LockMode::Exclusive).unwrap();
    }

    #[test]
    fn two_way_wait_is_detected_as_deadlock() {
        let mgr = LockManager::new();
        let (a, b) = (TransactionId(1), TransactionId(2));
        mgr.acquire(a, "x", LockMode::Exclusive).unwrap();
        mgr.acquire(b, "y", LockMode::Exclusive).unwrap();

        // b already waits on a transitively via this pre-seeded edge so that
        // a's request for y closes the cycle without needing a second thread.
        {
            let mut guard = mgr.inner.lock().unwrap();
            guard.waits_for.insert(b, std::iter::once(a).collect());
        }
        let result = mgr.acquire(a, "y", LockMode::Exclusive);
        assert!(matches!(result, Err(OxidbError::Deadlock(_))));
    }

    #[test]
    fn release_all_frees_the_lock_for_the_next_holder() {
        let mgr = LockManager::new();
        let (a, b) = (TransactionId(1), TransactionId(2));
        mgr.acquire(a, "x", LockMode::Exclusive).unwrap();
        mgr.release_all(a);
        mgr.acquire(b, "x", LockMode::Exclusive).unwrap();
    }
}
