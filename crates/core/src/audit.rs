//! Best-effort audit trail.
//!
//! Audit entries are written after a workflow has already succeeded. A failed write is
//! logged and dropped so it never changes the outcome the user sees.

use crate::remote::{submit_and_confirm, AuditEntry, AuditSink};
use medrec_types::Address;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuditTrail {
    sink: Arc<dyn AuditSink>,
}

impl AuditTrail {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Appends one entry and waits for it to confirm. Returns whether it was recorded.
    pub async fn record(
        &self,
        actor: Address,
        action: &str,
        record_id: &str,
        target: Address,
        info: &str,
    ) -> bool {
        let entry = AuditEntry {
            actor,
            action: action.to_owned(),
            record_id: record_id.to_owned(),
            target,
            info: info.to_owned(),
        };

        match submit_and_confirm(self.sink.append(entry)).await {
            Ok(receipt) => {
                tracing::debug!("audit {} recorded in block {}", action, receipt.block_number);
                true
            }
            Err(e) => {
                tracing::warn!("audit log failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::DevLedger;
    use crate::test_support::{addr, FailingAudit};

    #[tokio::test]
    async fn test_record_appends_entry() {
        let ledger = DevLedger::new(addr(0xad));
        let trail = AuditTrail::new(Arc::new(ledger.connect(addr(1))));

        let recorded = trail
            .record(addr(1), "RecordUploaded", "1", addr(1), "hash")
            .await;

        assert!(recorded);
        let log = ledger.audit_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].entry.info, "hash");
    }

    #[tokio::test]
    async fn test_record_swallows_failure() {
        let trail = AuditTrail::new(Arc::new(FailingAudit));

        let recorded = trail
            .record(addr(1), "AccessGranted", "1", Address::ZERO, "1")
            .await;

        assert!(!recorded);
    }
}
