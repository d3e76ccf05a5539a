//! Subscriber cache: add/merge, update, delete, and snapshot reads
//!
//! Merge rules: fields contributed by family F are only overwritten by
//! updates tagged F, and only when the incoming value is present; the two
//! state enums are last-writer-wins within their family. A delete applies
//! the terminal event's states before the final observation, so late
//! readers of the exported series see the terminal state, never a stale
//! "Connected".

use std::collections::hash_map::Entry;
use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::events::{CoreSubscriber, NfFamily};

use super::{read_lock, write_lock, MetricStore};

impl MetricStore {
    /// Insert a new record or merge into the existing one.
    ///
    /// Redelivered Add events land in the merge arm, which keeps the
    /// handler idempotent: no counter change, no duplicate created event.
    pub fn add_subscriber(&self, update: &CoreSubscriber, family: NfFamily) {
        let mut subs = write_lock(&self.subscribers);

        match subs.entry(update.imsi.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(update.clone());
                let count = self.active_sessions.fetch_add(1, Ordering::SeqCst) + 1;
                self.metrics.inc_subscriber_created();
                self.metrics.set_active_sessions(count);
                self.metrics.observe_subscriber(None, update);
                debug!("storing subscriber with imsi [{}]", update.imsi);
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                let prev = existing.clone();
                merge_subscriber(existing, update, family);
                self.metrics.observe_subscriber(Some(&prev), existing);
            }
        }
    }

    /// Merge into an existing record only; an update for an identity that
    /// was never added is dropped with a warning.
    pub fn update_subscriber(&self, update: &CoreSubscriber, family: NfFamily) {
        let mut subs = write_lock(&self.subscribers);

        match subs.get_mut(&update.imsi) {
            Some(existing) => {
                let prev = existing.clone();
                merge_subscriber(existing, update, family);
                self.metrics.observe_subscriber(Some(&prev), existing);
            }
            None => {
                warn!(
                    "update for unknown subscriber imsi [{}] from [{}], ignored",
                    update.imsi, family
                );
            }
        }
    }

    /// Remove a record, emitting a final observation that carries the
    /// terminal event's session/mobility states. The observation always
    /// precedes removal.
    pub fn delete_subscriber(&self, update: &CoreSubscriber) -> AppResult<()> {
        let mut subs = write_lock(&self.subscribers);

        let Some(existing) = subs.get_mut(&update.imsi) else {
            return Err(AppError::not_found(format!(
                "subscriber with imsi [{}] already deleted",
                update.imsi
            )));
        };

        let count = self
            .active_sessions
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        self.metrics.inc_subscriber_deleted();
        self.metrics.set_active_sessions(count);

        // Terminal states always land, whichever family reported the delete.
        let prev = existing.clone();
        existing.session_state = update.session_state;
        existing.mobility_state = update.mobility_state;
        let final_view = existing.clone();

        self.metrics.observe_subscriber(Some(&prev), &final_view);
        subs.remove(&update.imsi);
        self.metrics.retire_subscriber(&final_view);

        debug!("deleting subscriber with imsi [{}]", update.imsi);
        Ok(())
    }

    /// Snapshot of one record
    pub fn get_subscriber(&self, imsi: &str) -> AppResult<CoreSubscriber> {
        read_lock(&self.subscribers)
            .get(imsi)
            .cloned()
            .ok_or_else(|| {
                AppError::not_found(format!("subscriber with key [{}] not found", imsi))
            })
    }

    /// All known identities
    pub fn subscriber_imsis(&self) -> Vec<String> {
        read_lock(&self.subscribers).keys().cloned().collect()
    }

    /// Resolve an assigned IP address to its subscriber.
    ///
    /// Linear scan; the cache is bounded by the live-session population and
    /// the store trades read latency for write-merge simplicity.
    pub fn find_subscriber_by_ip(&self, ip: &str) -> AppResult<CoreSubscriber> {
        let subs = read_lock(&self.subscribers);
        for (imsi, sub) in subs.iter() {
            if sub.ip_address.as_deref() == Some(ip) {
                debug!("found subscriber with ip-addr [{}], imsi [{}]", ip, imsi);
                return Ok(sub.clone());
            }
        }
        Err(AppError::not_found(format!(
            "subscriber with ip-addr [{}] not found",
            ip
        )))
    }
}

fn merge_subscriber(dst: &mut CoreSubscriber, src: &CoreSubscriber, family: NfFamily) {
    match family {
        NfFamily::Smf => merge_session_fields(dst, src),
        NfFamily::Amf => merge_mobility_fields(dst, src),
        other => warn!("subscriber update from non-contributing family [{}]", other),
    }
}

/// Copy `src` over `dst` only when `src` carries a value
fn merge_present<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
    if src.is_some() {
        *dst = src.clone();
    }
}

fn merge_session_fields(dst: &mut CoreSubscriber, src: &CoreSubscriber) {
    merge_present(&mut dst.smf_id, &src.smf_id);
    merge_present(&mut dst.smf_ip, &src.smf_ip);
    merge_present(&mut dst.ip_address, &src.ip_address);
    merge_present(&mut dst.dnn, &src.dnn);
    merge_present(&mut dst.slice, &src.slice);
    merge_present(&mut dst.upf_name, &src.upf_name);
    merge_present(&mut dst.upf_addr, &src.upf_addr);

    // always overwrite subscriber state
    dst.session_state = src.session_state;
}

fn merge_mobility_fields(dst: &mut CoreSubscriber, src: &CoreSubscriber) {
    merge_present(&mut dst.amf_id, &src.amf_id);
    merge_present(&mut dst.amf_ip, &src.amf_ip);
    merge_present(&mut dst.guti, &src.guti);
    merge_present(&mut dst.tmsi, &src.tmsi);
    merge_present(&mut dst.amf_ngap_id, &src.amf_ngap_id);
    merge_present(&mut dst.ran_ngap_id, &src.ran_ngap_id);
    merge_present(&mut dst.gnb_id, &src.gnb_id);
    merge_present(&mut dst.tac_id, &src.tac_id);

    // always overwrite subscriber state
    dst.mobility_state = src.mobility_state;
}
