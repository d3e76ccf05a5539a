//! NF liveness cache: whole-record overwrite, no delete path

use crate::events::{NfFamily, NfStatusRecord};

use super::{read_lock, write_lock, MetricStore};

impl MetricStore {
    /// Overwrite the record for this NF and forward the binary up/down
    /// indicator to the exporter.
    pub fn upsert_nf_status(&self, record: NfStatusRecord) {
        self.metrics.set_nf_status(&record);
        write_lock(&self.nf_status).insert(record.nf_name.clone(), record);
    }

    /// Snapshot of all NFs of one family
    pub fn nf_status_by_type(&self, nf_type: NfFamily) -> Vec<NfStatusRecord> {
        read_lock(&self.nf_status)
            .values()
            .filter(|r| r.nf_type == nf_type)
            .cloned()
            .collect()
    }

    /// Snapshot of every known NF
    pub fn nf_status_all(&self) -> Vec<NfStatusRecord> {
        read_lock(&self.nf_status).values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NfStatusState;
    use crate::store::test_store;

    fn record(name: &str, nf_type: NfFamily, status: NfStatusState) -> NfStatusRecord {
        NfStatusRecord {
            nf_type,
            nf_status: status,
            nf_name: name.to_string(),
        }
    }

    #[test]
    fn test_upsert_overwrites_whole_record() {
        let store = test_store();
        store.upsert_nf_status(record("upf-1", NfFamily::Upf, NfStatusState::Connected));
        store.upsert_nf_status(record("upf-1", NfFamily::Upf, NfStatusState::Disconnected));

        let all = store.nf_status_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].nf_status, NfStatusState::Disconnected);
    }

    #[test]
    fn test_filter_by_type() {
        let store = test_store();
        store.upsert_nf_status(record("upf-1", NfFamily::Upf, NfStatusState::Connected));
        store.upsert_nf_status(record("gnb-1", NfFamily::Gnb, NfStatusState::Connected));
        store.upsert_nf_status(record("gnb-2", NfFamily::Gnb, NfStatusState::Disconnected));

        assert_eq!(store.nf_status_by_type(NfFamily::Gnb).len(), 2);
        assert_eq!(store.nf_status_by_type(NfFamily::Upf).len(), 1);
        assert!(store.nf_status_by_type(NfFamily::Smf).is_empty());
    }
}
