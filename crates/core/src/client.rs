//! Client facade.
//!
//! [`MedRecClient`] wires the workflows to one identity's collaborators and adds the
//! steps that span more than one of them.

use crate::audit::AuditTrail;
use crate::config::CoreConfig;
use crate::directory::{Directory, NewPatient};
use crate::error::ClientResult;
use crate::records::RecordUploader;
use crate::remote::Contracts;
use crate::session::{Role, Session};
use crate::tracker::AccessGrantTracker;
use medrec_types::Address;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct MedRecClient {
    tracker: AccessGrantTracker,
    records: RecordUploader,
    directory: Directory,
    cfg: Arc<CoreConfig>,
}

impl MedRecClient {
    pub fn new(contracts: Contracts, cfg: Arc<CoreConfig>) -> Self {
        let audit = AuditTrail::new(contracts.audit);
        Self {
            tracker: AccessGrantTracker::new(contracts.records.clone(), audit.clone(), cfg.clone()),
            records: RecordUploader::new(contracts.records, contracts.content, audit, cfg.clone()),
            directory: Directory::new(contracts.patients, contracts.providers),
            cfg,
        }
    }

    /// Starts a session for `identity` using this client's configuration.
    pub fn connect(&self, identity: Address) -> Session {
        Session::connect_with(identity, &self.cfg)
    }

    pub fn tracker(&self) -> &AccessGrantTracker {
        &self.tracker
    }

    pub fn records(&self) -> &RecordUploader {
        &self.records
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Switches the session to `role`.
    ///
    /// Entering the patient dashboard refreshes the owned records, loads the access
    /// requests and proposes the next record id, in that order. Failures in those loads
    /// are reported through the session's status lines and logged; the role is set
    /// regardless.
    pub async fn enter_role(&self, session: &mut Session, role: Role) -> ClientResult<()> {
        session.require_identity()?;
        session.set_role(Some(role));

        if role == Role::Patient {
            if let Err(e) = self.records.refresh_my_records(session).await {
                tracing::warn!("records refresh on role entry failed: {}", e);
            }
            if let Err(e) = self.tracker.load_requests(session).await {
                tracing::warn!("request load on role entry failed: {}", e);
            }
            if let Err(e) = self.records.suggest_new_record_id(session).await {
                tracing::warn!("record id suggestion on role entry failed: {}", e);
            }
        }
        Ok(())
    }

    /// Registers the connected identity as a patient, then refreshes both the patient
    /// list and the owned records.
    pub async fn register_patient(&self, session: &mut Session, form: &NewPatient) -> ClientResult<()> {
        self.directory.register_patient(session, form).await?;

        if let Err(e) = self.records.refresh_my_records(session).await {
            tracing::warn!("records refresh after registration failed: {}", e);
        }
        Ok(())
    }

    /// Ends the session.
    pub fn logout(&self, session: &mut Session) {
        tracing::debug!("session for {:?} reset", session.identity());
        session.reset();
    }
}
