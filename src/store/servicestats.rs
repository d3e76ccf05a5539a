//! Per-family service-message counters
//!
//! Nested family -> reporting instance -> message-type label -> count.
//! Buckets appear on first observation and are never deleted.

use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::events::NfFamily;

use super::{read_lock, write_lock, MetricStore, SvcStatTable};

impl MetricStore {
    /// Count one message observation, creating the nested buckets lazily.
    /// Returns the new count for the (instance, message-type) pair.
    pub fn increment_service_stat(
        &self,
        family: NfFamily,
        instance: &str,
        msg_type: &str,
    ) -> AppResult<u64> {
        let mut stats = write_lock(&self.svc_stats);
        let Some(table) = stats.get_mut(&family) else {
            return Err(AppError::unknown_family(family));
        };

        let count = table
            .entry(instance.to_string())
            .or_default()
            .entry(msg_type.to_string())
            .or_insert(0);
        *count += 1;
        let count = *count;

        self.metrics.inc_service_stat(family, instance, msg_type);
        debug!(
            "svc stat [{}/{}/{}] now at {}",
            family, instance, msg_type, count
        );
        Ok(count)
    }

    /// Snapshot copy of one family's counter table
    pub fn service_stats(&self, family: NfFamily) -> AppResult<SvcStatTable> {
        read_lock(&self.svc_stats)
            .get(&family)
            .cloned()
            .ok_or_else(|| AppError::unknown_family(family))
    }
}
