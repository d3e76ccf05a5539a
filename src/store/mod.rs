//! Concurrent state-aggregation store
//!
//! Three logically independent caches, each behind its own reader-writer
//! lock so read-heavy query traffic on one never blocks writers on another:
//! - subscribers keyed by IMSI (partial-update merge semantics)
//! - NF liveness keyed by NF name (whole-record overwrite)
//! - service-message counters nested family -> instance -> message type
//!
//! The store is an explicit object constructed once at startup and handed to
//! every task as an `Arc`; mutations drive the injected metrics hooks.

mod nfstatus;
mod servicestats;
mod subscribers;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::events::{CoreSubscriber, NfFamily, NfStatusRecord};
use crate::metrics::CoreMetrics;

pub(crate) type SvcStatTable = HashMap<String, HashMap<String, u64>>;

pub struct MetricStore {
    pub(crate) subscribers: RwLock<HashMap<String, CoreSubscriber>>,
    pub(crate) nf_status: RwLock<HashMap<String, NfStatusRecord>>,
    pub(crate) svc_stats: RwLock<HashMap<NfFamily, SvcStatTable>>,
    pub(crate) active_sessions: AtomicU64,
    pub(crate) metrics: Arc<CoreMetrics>,
}

impl MetricStore {
    pub fn new(metrics: Arc<CoreMetrics>) -> Self {
        // Families without a stats table (UPF, GNB) stay unseeded on purpose;
        // queries for them answer UnknownFamily.
        let mut svc_stats = HashMap::new();
        svc_stats.insert(NfFamily::Smf, SvcStatTable::new());
        svc_stats.insert(NfFamily::Amf, SvcStatTable::new());

        Self {
            subscribers: RwLock::new(HashMap::new()),
            nf_status: RwLock::new(HashMap::new()),
            svc_stats: RwLock::new(svc_stats),
            active_sessions: AtomicU64::new(0),
            metrics,
        }
    }

    /// Current active-session count; equals the number of live subscriber
    /// records after any interleaving of add/delete.
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::SeqCst)
    }
}

// A lock is only poisoned if a writer panicked mid-mutation; recover the
// inner value instead of propagating the panic to every other task.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) fn test_store() -> MetricStore {
    MetricStore::new(Arc::new(CoreMetrics::new().expect("metrics registry")))
}
