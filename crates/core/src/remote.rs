//! Remote collaborator surface.
//!
//! The ledger contracts and the content store own all real state. This module describes
//! what the client needs from them as object-safe async traits. Each contract handle is
//! bound to one calling identity, the way a contract instance is bound to its signer.
//!
//! Every confirms-or-fails call returns a [`PendingTx`]. Submission alone proves nothing:
//! callers must await [`PendingTx::confirmed`] before any dependent step runs.

use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use futures::future::BoxFuture;
use medrec_types::Address;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Proof that a transaction was included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: String,
    pub block_number: u64,
}

/// A submitted transaction whose outcome is not yet known.
#[must_use = "a submitted transaction must be awaited until it is confirmed"]
pub struct PendingTx {
    hash: String,
    confirmation: BoxFuture<'static, RemoteResult<TxReceipt>>,
}

impl PendingTx {
    pub fn new<F>(hash: impl Into<String>, confirmation: F) -> Self
    where
        F: Future<Output = RemoteResult<TxReceipt>> + Send + 'static,
    {
        Self {
            hash: hash.into(),
            confirmation: Box::pin(confirmation),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Waits until the transaction is confirmed or has failed.
    pub async fn confirmed(self) -> RemoteResult<TxReceipt> {
        tracing::debug!("waiting for confirmation of {}", self.hash);
        self.confirmation.await
    }
}

impl std::fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTx").field("hash", &self.hash).finish()
    }
}

/// Submits and then waits for confirmation, folding both failure points into one result.
pub async fn submit_and_confirm<F>(submission: F) -> RemoteResult<TxReceipt>
where
    F: Future<Output = RemoteResult<PendingTx>>,
{
    submission.await?.confirmed().await
}

/// A registered patient as held by the patient registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub did: String,
    pub name: String,
    /// Unix seconds at UTC midnight of the birth date.
    pub date_of_birth: i64,
    pub medical_profile: String,
}

/// Fields submitted when a provider registers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRegistration {
    pub did: String,
    pub name: String,
    pub role: String,
    pub license_id: String,
    pub hospital: String,
}

/// A record as resolved from the record manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub record_id: String,
    pub content_hash: String,
    pub category: String,
    pub exists: bool,
}

/// An access request exactly as the record manager reports it.
///
/// The two decision flags are independent on the wire; the client converts this into a
/// [`crate::tracker::AccessRequest`] whose decision is a single state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequestRecord {
    pub request_id: u64,
    pub provider: Address,
    pub patient: Address,
    pub purpose: String,
    pub record_id: String,
    pub request_date: u64,
    pub is_approved: bool,
    pub is_rejected: bool,
    pub expiry_date: u64,
}

/// One entry submitted to the audit sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: Address,
    pub action: String,
    pub record_id: String,
    pub target: Address,
    pub info: String,
}

#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn count(&self) -> RemoteResult<u64>;

    async fn address_at(&self, index: u64) -> RemoteResult<Address>;

    async fn get(&self, identity: &Address) -> RemoteResult<PatientProfile>;

    async fn register(&self, profile: PatientProfile) -> RemoteResult<PendingTx>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Record identifiers owned by the calling identity, in upload order.
    async fn my_identifiers(&self) -> RemoteResult<Vec<String>>;

    async fn resolve(&self, record_id: &str) -> RemoteResult<StoredRecord>;

    async fn upload(
        &self,
        record_id: &str,
        content_hash: &str,
        category: &str,
    ) -> RemoteResult<PendingTx>;

    /// Access request ids associated with the calling identity.
    async fn my_access_request_ids(&self) -> RemoteResult<Vec<u64>>;

    async fn request_details(&self, request_id: u64) -> RemoteResult<AccessRequestRecord>;

    async fn request_access(
        &self,
        patient: &Address,
        record_id: &str,
        purpose: &str,
    ) -> RemoteResult<PendingTx>;

    async fn approve(&self, request_id: u64, duration_days: u32) -> RemoteResult<PendingTx>;

    async fn reject(&self, request_id: u64) -> RemoteResult<PendingTx>;
}

#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    async fn register(&self, registration: ProviderRegistration) -> RemoteResult<PendingTx>;

    /// Admin only.
    async fn verify(&self, identity: &Address) -> RemoteResult<PendingTx>;

    async fn admin_identity(&self) -> RemoteResult<Address>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> RemoteResult<PendingTx>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `bytes` and returns their content identifier.
    async fn put(&self, bytes: Vec<u8>) -> RemoteResult<String>;
}

/// Handles to every collaborator, bound to one identity.
#[derive(Clone)]
pub struct Contracts {
    pub patients: Arc<dyn PatientDirectory>,
    pub records: Arc<dyn RecordStore>,
    pub providers: Arc<dyn ProviderDirectory>,
    pub audit: Arc<dyn AuditSink>,
    pub content: Arc<dyn ContentStore>,
}

impl std::fmt::Debug for Contracts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contracts").finish_non_exhaustive()
    }
}

/// A transaction that fails at confirmation time with `reason`.
pub fn failed_tx(hash: impl Into<String>, reason: RemoteError) -> PendingTx {
    PendingTx::new(hash, async move { Err(reason) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_and_confirm_returns_receipt() {
        let receipt = submit_and_confirm(async {
            Ok(PendingTx::new("0x01", async {
                Ok(TxReceipt {
                    hash: "0x01".into(),
                    block_number: 7,
                })
            }))
        })
        .await
        .unwrap();

        assert_eq!(receipt.block_number, 7);
    }

    #[tokio::test]
    async fn test_submit_and_confirm_surfaces_confirmation_failure() {
        let err = submit_and_confirm(async {
            Ok(failed_tx("0x02", RemoteError::rejected("reverted")))
        })
        .await
        .unwrap_err();

        assert_eq!(err, RemoteError::Rejected("reverted".into()));
    }

    #[tokio::test]
    async fn test_submit_and_confirm_surfaces_submission_failure() {
        let err = submit_and_confirm(async { Err(RemoteError::unavailable("offline")) })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "remote unavailable: offline");
    }
}
