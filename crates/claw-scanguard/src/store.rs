//! Concurrent address → reputation entry store.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::entry::{EntrySnapshot, ReputationEntry};

/// Tracks one [`ReputationEntry`] per address.
///
/// Lookups share a read lock. Only first contact and reclamation take the
/// write lock, and counter updates happen on the entry after the lock is
/// released.
#[derive(Debug)]
pub struct ReputationStore {
    /// Entries by address.
    entries: RwLock<HashMap<IpAddr, Arc<ReputationEntry>>>,
    /// Idle time after which an entry is forgotten.
    remember_secs: u64,
}

impl ReputationStore {
    /// Create a store that forgets entries idle for `remember_secs`.
    #[must_use]
    pub fn new(remember_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            remember_secs,
        }
    }

    /// Look up an entry without creating one.
    #[must_use]
    pub fn get(&self, ip: &IpAddr) -> Option<Arc<ReputationEntry>> {
        self.entries.read().get(ip).cloned()
    }

    /// Return the entry for `ip` seen at `now`, creating it if absent.
    ///
    /// Creation is exactly-once: concurrent first contact for the same
    /// address all receive the same entry. An entry idle past the retention
    /// horizon is replaced by a fresh one.
    pub fn get_or_create(&self, ip: &IpAddr, now: i64) -> Arc<ReputationEntry> {
        self.touch_or_create(ip, now).0
    }

    /// Like [`get_or_create`](Self::get_or_create), also returning the
    /// entry's `last_seen` from before this contact.
    ///
    /// The entry is touched while the map lock is held, so a concurrent
    /// [`sweep`](Self::sweep) cannot remove it between the staleness check
    /// and the touch.
    pub fn touch_or_create(&self, ip: &IpAddr, now: i64) -> (Arc<ReputationEntry>, i64) {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(ip) {
                if !entry.is_stale(now, self.remember_secs) {
                    let previous = entry.touch(now);
                    return (Arc::clone(entry), previous);
                }
            }
        }

        let mut entries = self.entries.write();

        // Re-check under the write lock: another caller may have inserted or
        // refreshed the entry in between.
        if let Some(entry) = entries.get(ip) {
            if !entry.is_stale(now, self.remember_secs) {
                let previous = entry.touch(now);
                return (Arc::clone(entry), previous);
            }
            debug!(ip = %ip, last_seen = entry.last_seen(), "Replacing stale reputation entry");
        }

        let entry = Arc::new(ReputationEntry::new(now));
        entries.insert(*ip, Arc::clone(&entry));
        (entry, now)
    }

    /// Copy the current state of an entry.
    #[must_use]
    pub fn snapshot(&self, ip: &IpAddr) -> Option<EntrySnapshot> {
        self.get(ip).map(|entry| entry.snapshot())
    }

    /// Forget an address.
    pub fn remove(&self, ip: &IpAddr) -> bool {
        self.entries.write().remove(ip).is_some()
    }

    /// Remove every entry idle past the retention horizon at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: i64) -> usize {
        let mut entries = self.entries.write();
        let initial_count = entries.len();

        entries.retain(|_, entry| !entry.is_stale(now, self.remember_secs));

        let removed = initial_count.saturating_sub(entries.len());
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Swept stale reputation entries");
        }
        removed
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
        info!("All reputation entries cleared");
    }

    /// Number of tracked addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no address is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of addresses currently in the blocking state.
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|entry| entry.is_blocking())
            .count()
    }

    /// Addresses currently in the blocking state.
    #[must_use]
    pub fn blocked_ips(&self) -> Vec<IpAddr> {
        self.entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.is_blocking())
            .map(|(ip, _)| *ip)
            .collect()
    }

    /// Retention horizon in seconds.
    #[must_use]
    pub const fn remember_secs(&self) -> u64 {
        self.remember_secs
    }
}
