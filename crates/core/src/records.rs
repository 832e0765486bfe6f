//! Record upload orchestration and the owned-records view.
//!
//! An upload runs these steps in order and stops at the first failure:
//!
//! 1. check a file and a record id are present
//! 2. store the bytes in the content store
//! 3. register the content identifier under the record id on the record manager
//! 4. write a best-effort `RecordUploaded` audit entry
//! 5. refresh the owned-records view
//!
//! The refresh tolerates per-record failures: a record that cannot be resolved, no longer
//! exists, or has no content is left out instead of failing the whole list.

use crate::audit::AuditTrail;
use crate::config::CoreConfig;
use crate::constants::audit_actions;
use crate::error::{ClientError, ClientResult, RemoteError};
use crate::reconciler::compute_next_identifier;
use crate::remote::{submit_and_confirm, ContentStore, RecordStore};
use crate::session::{RecordEntry, Session};
use crate::status::{Operation, OperationStatus};
use futures::future::join_all;
use std::sync::Arc;

/// Status shown between the content store write and ledger confirmation.
const SUBMITTING_MESSAGE: &str = "Submitting record to ledger...";

#[derive(Clone)]
pub struct RecordUploader {
    records: Arc<dyn RecordStore>,
    content: Arc<dyn ContentStore>,
    audit: AuditTrail,
    cfg: Arc<CoreConfig>,
}

impl std::fmt::Debug for RecordUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordUploader")
            .field("record_category", &self.cfg.record_category())
            .finish_non_exhaustive()
    }
}

impl RecordUploader {
    pub fn new(
        records: Arc<dyn RecordStore>,
        content: Arc<dyn ContentStore>,
        audit: AuditTrail,
        cfg: Arc<CoreConfig>,
    ) -> Self {
        Self {
            records,
            content,
            audit,
            cfg,
        }
    }

    /// Uploads the session's selected file under the session's record id.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidInput` if no file is selected or the record id is blank
    /// - `ClientError::Remote` if the content store or the record manager fails
    ///
    /// A failed owned-records refresh afterwards is logged, not returned.
    pub async fn upload_record(&self, session: &mut Session) -> ClientResult<RecordEntry> {
        let identity = session.require_identity()?;

        let record_id = session.record_id.trim().to_owned();
        let bytes = match (&session.file, record_id.is_empty()) {
            (None, _) => Err(ClientError::invalid_input("Select a file first")),
            (Some(_), true) => Err(ClientError::invalid_input("Record ID required")),
            (Some(file), false) => Ok(file.bytes.clone()),
        };
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(err) => {
                session.statuses.transaction = OperationStatus::failed(&err);
                return Err(err);
            }
        };

        session.statuses.transaction = OperationStatus::started(Operation::UploadRecord);

        let content_hash = match self.content.put(bytes).await {
            Ok(hash) if !hash.trim().is_empty() => hash,
            Ok(_) => {
                return Err(self.fail_upload(
                    session,
                    RemoteError::unavailable("content store returned no identifier"),
                ));
            }
            Err(source) => return Err(self.fail_upload(session, source)),
        };

        session.statuses.transaction = OperationStatus::InProgress(SUBMITTING_MESSAGE.into());

        let submission =
            self.records
                .upload(&record_id, &content_hash, self.cfg.record_category());
        if let Err(source) = submit_and_confirm(submission).await {
            return Err(self.fail_upload(session, source));
        }

        tracing::info!("record {} uploaded as {}", record_id, content_hash);
        session.statuses.transaction = OperationStatus::succeeded(Operation::UploadRecord);

        self.audit
            .record(
                identity,
                audit_actions::RECORD_UPLOADED,
                &record_id,
                identity,
                &content_hash,
            )
            .await;

        if let Err(e) = self.refresh_my_records(session).await {
            tracing::warn!("records refresh after upload failed: {}", e);
        }

        Ok(RecordEntry {
            record_id,
            content_hash,
        })
    }

    fn fail_upload(&self, session: &mut Session, source: RemoteError) -> ClientError {
        let err = ClientError::remote(Operation::UploadRecord, source);
        session.statuses.transaction = OperationStatus::failed(&err);
        err
    }

    /// Rebuilds the owned-records view from the record manager.
    ///
    /// Records are resolved concurrently. Any record that fails to resolve, reports that
    /// it no longer exists, or has an empty content hash is skipped. With auto record ids
    /// on, the record id input is set to the next identifier.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Fetch` only when the owned identifiers cannot be listed; the
    /// view is emptied and the transaction status shows the reason in that case.
    pub async fn refresh_my_records<'s>(
        &self,
        session: &'s mut Session,
    ) -> ClientResult<&'s [RecordEntry]> {
        session.require_identity()?;

        let ids = match self.records.my_identifiers().await {
            Ok(ids) => ids,
            Err(source) => {
                let err = ClientError::Fetch {
                    what: "records",
                    source,
                };
                tracing::warn!("{}", err);
                session.records.clear();
                session.statuses.transaction = OperationStatus::failed(&err);
                return Err(err);
            }
        };

        let resolved = join_all(ids.iter().map(|id| self.records.resolve(id))).await;

        let entries = ids
            .iter()
            .zip(resolved)
            .filter_map(|(id, result)| match result {
                Ok(record) if record.exists && !record.content_hash.is_empty() => {
                    Some(RecordEntry {
                        record_id: id.clone(),
                        content_hash: record.content_hash,
                    })
                }
                Ok(_) => {
                    tracing::warn!("skipping record {}: no longer available", id);
                    None
                }
                Err(e) => {
                    tracing::warn!("skipping record {}: {}", id, e);
                    None
                }
            })
            .collect();

        session.records = entries;
        if session.auto_record_id {
            session.record_id = compute_next_identifier(&ids);
        }
        session.record_ids_mine = ids;

        Ok(&session.records)
    }

    /// Fetches the owned identifiers and, with auto record ids on, proposes the next one.
    ///
    /// A listing failure is reported on the transaction status line.
    pub async fn suggest_new_record_id(&self, session: &mut Session) -> ClientResult<String> {
        session.require_identity()?;

        let ids = match self.records.my_identifiers().await {
            Ok(ids) => ids,
            Err(source) => {
                let err = ClientError::Fetch {
                    what: "records",
                    source,
                };
                tracing::warn!("{}", err);
                session.statuses.transaction = OperationStatus::failed(&err);
                return Err(err);
            }
        };

        let next = compute_next_identifier(&ids);
        session.record_ids_mine = ids;
        if session.auto_record_id {
            session.record_id = next.clone();
        }
        Ok(next)
    }
}
