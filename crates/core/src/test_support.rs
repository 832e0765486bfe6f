//! Fixtures shared by the unit tests.

use crate::directory::NewPatient;
use crate::error::{RemoteError, RemoteResult};
use crate::remote::{
    AccessRequestRecord, AuditEntry, AuditSink, ContentStore, PatientProfile, PendingTx,
    RecordStore, StoredRecord,
};
use async_trait::async_trait;
use medrec_types::Address;
use std::collections::HashSet;
use std::sync::Arc;

/// Address whose last byte is `n`.
pub fn addr(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = n;
    Address::from_bytes(bytes)
}

pub fn patient_profile(did: &str, name: &str) -> PatientProfile {
    PatientProfile {
        did: did.into(),
        name: name.into(),
        date_of_birth: 0,
        medical_profile: "none".into(),
    }
}

pub fn new_patient(did: &str, name: &str) -> NewPatient {
    NewPatient {
        did: did.into(),
        name: name.into(),
        date_of_birth: "1970-01-01".into(),
        medical_profile: "none".into(),
    }
}

pub struct FailingAudit;

#[async_trait]
impl AuditSink for FailingAudit {
    async fn append(&self, _entry: AuditEntry) -> RemoteResult<PendingTx> {
        Err(RemoteError::unavailable("audit log offline"))
    }
}

pub struct FailingContent;

#[async_trait]
impl ContentStore for FailingContent {
    async fn put(&self, _bytes: Vec<u8>) -> RemoteResult<String> {
        Err(RemoteError::unavailable("content store offline"))
    }
}

/// Wraps a record store and fails selected reads.
pub struct FlakyRecords {
    inner: Arc<dyn RecordStore>,
    failing_records: HashSet<String>,
    revoked_records: HashSet<String>,
    failing_requests: HashSet<u64>,
    failing_listing: bool,
}

impl FlakyRecords {
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            failing_records: HashSet::new(),
            revoked_records: HashSet::new(),
            failing_requests: HashSet::new(),
            failing_listing: false,
        }
    }

    /// `resolve(record_id)` fails.
    pub fn failing_record(mut self, record_id: &str) -> Self {
        self.failing_records.insert(record_id.to_owned());
        self
    }

    /// `resolve(record_id)` reports the record as no longer existing.
    pub fn revoked_record(mut self, record_id: &str) -> Self {
        self.revoked_records.insert(record_id.to_owned());
        self
    }

    /// `request_details(request_id)` fails.
    pub fn failing_request(mut self, request_id: u64) -> Self {
        self.failing_requests.insert(request_id);
        self
    }

    /// Both id listings fail.
    pub fn failing_listing(mut self) -> Self {
        self.failing_listing = true;
        self
    }
}

#[async_trait]
impl RecordStore for FlakyRecords {
    async fn my_identifiers(&self) -> RemoteResult<Vec<String>> {
        if self.failing_listing {
            return Err(RemoteError::unavailable("listing failed"));
        }
        self.inner.my_identifiers().await
    }

    async fn resolve(&self, record_id: &str) -> RemoteResult<StoredRecord> {
        if self.failing_records.contains(record_id) {
            return Err(RemoteError::rejected("Record not found or access denied"));
        }
        let mut record = self.inner.resolve(record_id).await?;
        if self.revoked_records.contains(record_id) {
            record.exists = false;
        }
        Ok(record)
    }

    async fn upload(
        &self,
        record_id: &str,
        content_hash: &str,
        category: &str,
    ) -> RemoteResult<PendingTx> {
        self.inner.upload(record_id, content_hash, category).await
    }

    async fn my_access_request_ids(&self) -> RemoteResult<Vec<u64>> {
        if self.failing_listing {
            return Err(RemoteError::unavailable("listing failed"));
        }
        self.inner.my_access_request_ids().await
    }

    async fn request_details(&self, request_id: u64) -> RemoteResult<AccessRequestRecord> {
        if self.failing_requests.contains(&request_id) {
            return Err(RemoteError::unavailable("request lookup failed"));
        }
        self.inner.request_details(request_id).await
    }

    async fn request_access(
        &self,
        patient: &Address,
        record_id: &str,
        purpose: &str,
    ) -> RemoteResult<PendingTx> {
        self.inner.request_access(patient, record_id, purpose).await
    }

    async fn approve(&self, request_id: u64, duration_days: u32) -> RemoteResult<PendingTx> {
        self.inner.approve(request_id, duration_days).await
    }

    async fn reject(&self, request_id: u64) -> RemoteResult<PendingTx> {
        self.inner.reject(request_id).await
    }
}
