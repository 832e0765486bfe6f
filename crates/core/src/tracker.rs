//! Access Grant Tracker.
//!
//! Loads the access requests associated with the connected identity and drives the
//! patient's decisions on them. Every decision is confirmed on the ledger and followed by
//! a full reload of the request list; the local view is never patched in place.
//!
//! Loading is all-or-nothing. If any single request fails to resolve, the view is emptied
//! rather than showing a partial set of approvals.

use crate::audit::AuditTrail;
use crate::config::CoreConfig;
use crate::constants::audit_actions;
use crate::error::{ClientError, ClientResult};
use crate::remote::{submit_and_confirm, AccessRequestRecord, RecordStore};
use crate::session::Session;
use crate::status::{Operation, OperationStatus};
use futures::future::try_join_all;
use medrec_types::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Decision state of an access request. Both outcomes are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved { expires_at: u64 },
    Rejected,
}

/// An access request as the client presents it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    request_id: u64,
    provider: Address,
    patient: Address,
    purpose: String,
    record_id: String,
    request_date: u64,
    status: RequestStatus,
}

impl AccessRequest {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn provider(&self) -> Address {
        self.provider
    }

    pub fn patient(&self) -> Address {
        self.patient
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn request_date(&self) -> u64 {
        self.request_date
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn is_approved(&self) -> bool {
        matches!(self.status, RequestStatus::Approved { .. })
    }

    pub fn is_rejected(&self) -> bool {
        self.status == RequestStatus::Rejected
    }

    /// Expiry of an approved grant, in unix seconds.
    pub fn expiry_date(&self) -> Option<u64> {
        match self.status {
            RequestStatus::Approved { expires_at } => Some(expires_at),
            _ => None,
        }
    }

    /// Whether an approved grant has lapsed at `now` (unix seconds).
    pub fn is_expired(&self, now: u64) -> bool {
        self.expiry_date().is_some_and(|expiry| now >= expiry)
    }
}

impl TryFrom<AccessRequestRecord> for AccessRequest {
    type Error = ClientError;

    fn try_from(record: AccessRequestRecord) -> Result<Self, Self::Error> {
        let status = match (record.is_approved, record.is_rejected) {
            (false, false) => RequestStatus::Pending,
            (true, false) => RequestStatus::Approved {
                expires_at: record.expiry_date,
            },
            (false, true) => RequestStatus::Rejected,
            (true, true) => {
                return Err(ClientError::Resolution {
                    kind: "access request",
                    id: record.request_id.to_string(),
                    reason: "request is both approved and rejected".into(),
                });
            }
        };

        Ok(Self {
            request_id: record.request_id,
            provider: record.provider,
            patient: record.patient,
            purpose: record.purpose,
            record_id: record.record_id,
            request_date: record.request_date,
            status,
        })
    }
}

#[derive(Clone)]
pub struct AccessGrantTracker {
    records: Arc<dyn RecordStore>,
    audit: AuditTrail,
    cfg: Arc<CoreConfig>,
}

impl AccessGrantTracker {
    pub fn new(records: Arc<dyn RecordStore>, audit: AuditTrail, cfg: Arc<CoreConfig>) -> Self {
        Self {
            records,
            audit,
            cfg,
        }
    }

    /// Fetches every request associated with the connected identity, in the order the
    /// record manager lists them.
    ///
    /// # Errors
    ///
    /// `ClientError::Fetch` if the id listing fails, `ClientError::Resolution` if any one
    /// request cannot be resolved. No partial list is ever returned.
    pub async fn fetch_requests(&self) -> ClientResult<Vec<AccessRequest>> {
        let ids = self
            .records
            .my_access_request_ids()
            .await
            .map_err(|source| ClientError::Fetch {
                what: "requests",
                source,
            })?;

        try_join_all(ids.into_iter().map(|id| async move {
            let record = self.records.request_details(id).await.map_err(|e| {
                ClientError::Resolution {
                    kind: "access request",
                    id: id.to_string(),
                    reason: e.to_string(),
                }
            })?;
            AccessRequest::try_from(record)
        }))
        .await
    }

    /// Reloads the session's request view.
    ///
    /// On failure the view is emptied and the transaction status shows the reason.
    pub async fn load_requests(&self, session: &mut Session) -> ClientResult<Vec<AccessRequest>> {
        session.require_identity()?;

        match self.fetch_requests().await {
            Ok(requests) => {
                session.requests = requests.clone();
                Ok(requests)
            }
            Err(e) => {
                tracing::warn!("failed to load access requests: {}", e);
                session.requests.clear();
                session.statuses.transaction = match &e {
                    ClientError::Fetch { .. } => OperationStatus::failed(&e),
                    other => OperationStatus::Failed(format!("Fetch requests failed: {}", other)),
                };
                Err(e)
            }
        }
    }

    /// Approves `request_id` for `duration_days` days, then reloads the request view.
    pub async fn grant(
        &self,
        session: &mut Session,
        request_id: u64,
        duration_days: u32,
    ) -> ClientResult<()> {
        if duration_days == 0 {
            let err = ClientError::invalid_input("Grant duration must be at least one day");
            session.statuses.transaction = OperationStatus::failed(&err);
            return Err(err);
        }

        self.decide(session, request_id, Decision::Grant(duration_days))
            .await
    }

    /// Rejects `request_id`, then reloads the request view.
    pub async fn deny(&self, session: &mut Session, request_id: u64) -> ClientResult<()> {
        self.decide(session, request_id, Decision::Deny).await
    }

    async fn decide(
        &self,
        session: &mut Session,
        request_id: u64,
        decision: Decision,
    ) -> ClientResult<()> {
        let identity = session.require_identity()?;
        let operation = decision.operation();

        // Captured before the reload replaces the view.
        let (record_id, provider) = session
            .requests
            .iter()
            .find(|r| r.request_id == request_id)
            .map(|r| (r.record_id.clone(), r.provider))
            .unwrap_or_else(|| (request_id.to_string(), Address::ZERO));

        session.statuses.transaction = OperationStatus::started(operation);

        let submission = match decision {
            Decision::Grant(days) => self.records.approve(request_id, days),
            Decision::Deny => self.records.reject(request_id),
        };

        if let Err(source) = submit_and_confirm(submission).await {
            let err = ClientError::remote(operation, source);
            session.statuses.transaction = OperationStatus::failed(&err);
            return Err(err);
        }

        tracing::info!("{} confirmed for request {}", operation, request_id);
        session.statuses.transaction = OperationStatus::succeeded(operation);

        self.audit
            .record(
                identity,
                decision.audit_action(),
                &record_id,
                provider,
                &request_id.to_string(),
            )
            .await;

        if let Err(e) = self.load_requests(session).await {
            tracing::warn!("request reload after {} failed: {}", operation, e);
        }
        Ok(())
    }

    /// Doctor workflow: asks the selected patient for access to the entered record id.
    pub async fn request_access(&self, session: &mut Session) -> ClientResult<()> {
        let identity = session.require_identity()?;

        let target = match (session.selected_patient, session.access_record_id.trim()) {
            (None, _) => Err(ClientError::invalid_input("Select a patient first")),
            (Some(_), "") => Err(ClientError::invalid_input("Record ID required")),
            (Some(patient), record_id) => Ok((patient, record_id.to_owned())),
        };
        let (patient, record_id) = match target {
            Ok(target) => target,
            Err(err) => {
                session.statuses.access_request = OperationStatus::failed(&err);
                return Err(err);
            }
        };

        session.statuses.access_request = OperationStatus::started(Operation::RequestAccess);

        let purpose = self.cfg.access_request_purpose();
        let submission = self.records.request_access(&patient, &record_id, purpose);
        if let Err(source) = submit_and_confirm(submission).await {
            let err = ClientError::remote(Operation::RequestAccess, source);
            session.statuses.access_request = OperationStatus::failed(&err);
            return Err(err);
        }

        tracing::info!("access to record {} of {} requested", record_id, patient);
        session.statuses.access_request = OperationStatus::succeeded(Operation::RequestAccess);

        self.audit
            .record(
                identity,
                audit_actions::ACCESS_REQUESTED,
                &record_id,
                patient,
                purpose,
            )
            .await;
        Ok(())
    }
}

impl std::fmt::Debug for AccessGrantTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrantTracker").finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug)]
enum Decision {
    Grant(u32),
    Deny,
}

impl Decision {
    fn operation(self) -> Operation {
        match self {
            Decision::Grant(_) => Operation::GrantAccess,
            Decision::Deny => Operation::DenyAccess,
        }
    }

    fn audit_action(self) -> &'static str {
        match self {
            Decision::Grant(_) => audit_actions::ACCESS_GRANTED,
            Decision::Deny => audit_actions::ACCESS_DENIED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SECONDS_PER_DAY;
    use crate::ledger::DevLedger;
    use crate::test_support::{addr, FailingAudit, FlakyRecords};

    const PATIENT: u8 = 1;
    const DOCTOR: u8 = 2;

    fn wire(request_id: u64, approved: bool, rejected: bool) -> AccessRequestRecord {
        AccessRequestRecord {
            request_id,
            provider: addr(DOCTOR),
            patient: addr(PATIENT),
            purpose: "consult".into(),
            record_id: "1".into(),
            request_date: 1_000,
            is_approved: approved,
            is_rejected: rejected,
            expiry_date: if approved { 1_000 + SECONDS_PER_DAY } else { 0 },
        }
    }

    /// Ledger where the patient owns records "1" and "2" and the doctor has requested both.
    async fn ledger_with_requests() -> DevLedger {
        let ledger = DevLedger::new(addr(0xad));
        let patient = ledger.connect(addr(PATIENT));
        let doctor = ledger.connect(addr(DOCTOR));

        for id in ["1", "2"] {
            patient
                .upload(id, &format!("hash-{}", id), "general")
                .await
                .unwrap()
                .confirmed()
                .await
                .unwrap();
            doctor
                .request_access(&addr(PATIENT), id, "consult")
                .await
                .unwrap()
                .confirmed()
                .await
                .unwrap();
        }
        ledger
    }

    fn tracker_for(ledger: &DevLedger, identity: Address) -> AccessGrantTracker {
        let connection = Arc::new(ledger.connect(identity));
        AccessGrantTracker::new(
            connection.clone(),
            AuditTrail::new(connection),
            Arc::new(CoreConfig::default()),
        )
    }

    #[test]
    fn test_conversion_classifies_decisions() {
        let pending = AccessRequest::try_from(wire(1, false, false)).unwrap();
        assert!(pending.is_pending());
        assert_eq!(pending.expiry_date(), None);

        let approved = AccessRequest::try_from(wire(2, true, false)).unwrap();
        assert!(approved.is_approved());
        assert!(!approved.is_rejected());
        assert_eq!(approved.expiry_date(), Some(1_000 + SECONDS_PER_DAY));

        let rejected = AccessRequest::try_from(wire(3, false, true)).unwrap();
        assert!(rejected.is_rejected());
        assert!(!rejected.is_approved());
    }

    #[test]
    fn test_conversion_rejects_contradictory_flags() {
        let err = AccessRequest::try_from(wire(4, true, true)).unwrap_err();

        assert!(matches!(err, ClientError::Resolution { ref id, .. } if id == "4"));
    }

    #[test]
    fn test_is_expired() {
        let approved = AccessRequest::try_from(wire(1, true, false)).unwrap();

        assert!(!approved.is_expired(1_000));
        assert!(approved.is_expired(1_000 + SECONDS_PER_DAY));
        assert!(!AccessRequest::try_from(wire(2, false, false))
            .unwrap()
            .is_expired(u64::MAX));
    }

    #[tokio::test]
    async fn test_load_requests_preserves_listing_order() {
        let ledger = ledger_with_requests().await;
        let tracker = tracker_for(&ledger, addr(PATIENT));
        let mut session = Session::connect(addr(PATIENT));

        let requests = tracker.load_requests(&mut session).await.unwrap();

        let ids: Vec<u64> = requests.iter().map(AccessRequest::request_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(session.requests(), requests.as_slice());
        assert!(requests.iter().all(AccessRequest::is_pending));
    }

    #[tokio::test]
    async fn test_load_requests_is_all_or_nothing() {
        let ledger = ledger_with_requests().await;
        let records = Arc::new(
            FlakyRecords::new(Arc::new(ledger.connect(addr(PATIENT)))).failing_request(2),
        );
        let tracker = AccessGrantTracker::new(
            records,
            AuditTrail::new(Arc::new(ledger.connect(addr(PATIENT)))),
            Arc::new(CoreConfig::default()),
        );
        let mut session = Session::connect(addr(PATIENT));
        session.requests = tracker_for(&ledger, addr(PATIENT))
            .fetch_requests()
            .await
            .unwrap();

        let err = tracker.load_requests(&mut session).await.unwrap_err();

        assert!(matches!(err, ClientError::Resolution { .. }));
        assert!(session.requests().is_empty());
        assert!(session.statuses().transaction.is_failed());
        assert!(session
            .statuses()
            .transaction
            .message()
            .starts_with("Fetch requests failed:"));
    }

    #[tokio::test]
    async fn test_load_requests_listing_failure() {
        let ledger = ledger_with_requests().await;
        let records =
            Arc::new(FlakyRecords::new(Arc::new(ledger.connect(addr(PATIENT)))).failing_listing());
        let tracker = AccessGrantTracker::new(
            records,
            AuditTrail::new(Arc::new(ledger.connect(addr(PATIENT)))),
            Arc::new(CoreConfig::default()),
        );
        let mut session = Session::connect(addr(PATIENT));

        let err = tracker.load_requests(&mut session).await.unwrap_err();

        assert!(matches!(err, ClientError::Fetch { what: "requests", .. }));
        assert!(session.requests().is_empty());
    }

    #[tokio::test]
    async fn test_grant_then_reload_shows_approval() {
        let ledger = ledger_with_requests().await;
        let tracker = tracker_for(&ledger, addr(PATIENT));
        let mut session = Session::connect(addr(PATIENT));
        tracker.load_requests(&mut session).await.unwrap();

        tracker.grant(&mut session, 1, 7).await.unwrap();

        let granted = session
            .requests()
            .iter()
            .find(|r| r.request_id() == 1)
            .unwrap();
        assert!(granted.is_approved());
        assert!(granted.expiry_date().unwrap() > granted.request_date());
        assert_eq!(
            session.statuses().transaction,
            OperationStatus::Succeeded("Access granted.".into())
        );

        let log = ledger.audit_log().unwrap();
        let entry = &log.last().unwrap().entry;
        assert_eq!(entry.action, "AccessGranted");
        assert_eq!(entry.record_id, "1");
        assert_eq!(entry.target, addr(DOCTOR));
        assert_eq!(entry.info, "1");
    }

    #[tokio::test]
    async fn test_grant_succeeds_when_audit_fails() {
        let ledger = ledger_with_requests().await;
        let tracker = AccessGrantTracker::new(
            Arc::new(ledger.connect(addr(PATIENT))),
            AuditTrail::new(Arc::new(FailingAudit)),
            Arc::new(CoreConfig::default()),
        );
        let mut session = Session::connect(addr(PATIENT));

        tracker.grant(&mut session, 1, 7).await.unwrap();

        assert_eq!(
            session.statuses().transaction,
            OperationStatus::Succeeded("Access granted.".into())
        );
        assert!(session
            .requests()
            .iter()
            .any(|r| r.request_id() == 1 && r.is_approved()));
        assert!(ledger
            .audit_log()
            .unwrap()
            .iter()
            .all(|e| e.entry.action != "AccessGranted"));
    }

    #[tokio::test]
    async fn test_deny_then_reload_shows_rejection() {
        let ledger = ledger_with_requests().await;
        let tracker = tracker_for(&ledger, addr(PATIENT));
        let mut session = Session::connect(addr(PATIENT));

        tracker.deny(&mut session, 2).await.unwrap();

        let denied = session
            .requests()
            .iter()
            .find(|r| r.request_id() == 2)
            .unwrap();
        assert!(denied.is_rejected());
        assert!(!denied.is_approved());
        assert_eq!(
            session.statuses().transaction,
            OperationStatus::Succeeded("Access denied.".into())
        );
    }

    #[tokio::test]
    async fn test_grant_rejection_surfaces_remote_message() {
        let ledger = ledger_with_requests().await;
        let tracker = tracker_for(&ledger, addr(DOCTOR));
        let mut session = Session::connect(addr(DOCTOR));

        let err = tracker.grant(&mut session, 1, 1).await.unwrap_err();

        assert_eq!(
            err.rejection_reason(),
            Some("Only the patient can decide on this request")
        );
        assert_eq!(
            session.statuses().transaction,
            OperationStatus::Failed(
                "Grant access failed: Only the patient can decide on this request".into()
            )
        );
    }

    #[tokio::test]
    async fn test_decided_request_cannot_be_decided_again() {
        let ledger = ledger_with_requests().await;
        let tracker = tracker_for(&ledger, addr(PATIENT));
        let mut session = Session::connect(addr(PATIENT));

        tracker.deny(&mut session, 1).await.unwrap();
        let err = tracker.grant(&mut session, 1, 1).await.unwrap_err();

        assert_eq!(err.rejection_reason(), Some("Request already decided"));
        assert!(session.requests()[0].is_rejected());
    }

    #[tokio::test]
    async fn test_grant_zero_days_is_rejected_locally() {
        let ledger = ledger_with_requests().await;
        let tracker = tracker_for(&ledger, addr(PATIENT));
        let mut session = Session::connect(addr(PATIENT));
        let block_before = ledger.block_number().unwrap();

        let err = tracker.grant(&mut session, 1, 0).await.unwrap_err();

        assert!(matches!(err, ClientError::InvalidInput(_)));
        assert_eq!(ledger.block_number().unwrap(), block_before);
    }

    #[tokio::test]
    async fn test_request_access_requires_selection() {
        let ledger = DevLedger::new(addr(0xad));
        let tracker = tracker_for(&ledger, addr(DOCTOR));
        let mut session = Session::connect(addr(DOCTOR));

        let err = tracker.request_access(&mut session).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput(_)));
        assert!(session.statuses().access_request.is_failed());

        session.selected_patient = Some(addr(PATIENT));
        let err = tracker.request_access(&mut session).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_request_access_submits_and_audits() {
        let ledger = DevLedger::new(addr(0xad));
        ledger
            .connect(addr(PATIENT))
            .upload("5", "hash-5", "general")
            .await
            .unwrap()
            .confirmed()
            .await
            .unwrap();
        let tracker = tracker_for(&ledger, addr(DOCTOR));
        let mut session = Session::connect(addr(DOCTOR));
        session.selected_patient = Some(addr(PATIENT));
        session.set_access_record_id("5");

        tracker.request_access(&mut session).await.unwrap();

        assert_eq!(
            session.statuses().access_request,
            OperationStatus::Succeeded("Request submitted.".into())
        );
        let requests = tracker.fetch_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].purpose(), "Requested via DApp");

        let log = ledger.audit_log().unwrap();
        assert_eq!(log[0].entry.action, "AccessRequested");
        assert_eq!(log[0].entry.target, addr(PATIENT));
    }
}
