//! Session context.
//!
//! A [`Session`] holds everything the client knows for one connected identity: the role it
//! acts in, the inputs of each workflow, the views fetched from the ledger and one status
//! line per panel. Workflows take the session explicitly and every view in it can be
//! rebuilt from the ledger, so [`Session::reset`] is always safe.

use crate::config::CoreConfig;
use crate::constants::DEFAULT_GRANT_DURATION_DAYS;
use crate::error::{ClientError, ClientResult};
use crate::reconciler::compute_next_identifier;
use crate::remote::PatientProfile;
use crate::status::OperationStatus;
use crate::tracker::AccessRequest;
use medrec_types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The dashboard an identity is acting through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
    Provider,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Patient, Role::Doctor, Role::Provider, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Provider => "provider",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ClientError::InvalidInput(format!("unknown role '{}'", s)))
    }
}

/// A file selected for upload.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

impl fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One row of the owned-records view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub record_id: String,
    pub content_hash: String,
}

/// One status line per dashboard panel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statuses {
    pub patient_registration: OperationStatus,
    /// Upload, grant, deny and fetch failures.
    pub transaction: OperationStatus,
    pub access_request: OperationStatus,
    pub provider_registration: OperationStatus,
    pub provider_verification: OperationStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub(crate) identity: Option<Address>,
    pub(crate) role: Option<Role>,
    pub(crate) patients: Vec<Address>,
    pub(crate) selected_patient: Option<Address>,
    pub(crate) patient_details: Option<PatientProfile>,
    pub(crate) auto_record_id: bool,
    pub(crate) record_id: String,
    pub(crate) record_ids_mine: Vec<String>,
    pub(crate) records: Vec<RecordEntry>,
    pub(crate) file: Option<UploadFile>,
    pub(crate) requests: Vec<AccessRequest>,
    pub(crate) grant_duration_days: u32,
    pub(crate) access_record_id: String,
    pub(crate) statuses: Statuses,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            identity: None,
            role: None,
            patients: Vec::new(),
            selected_patient: None,
            patient_details: None,
            auto_record_id: true,
            record_id: String::new(),
            record_ids_mine: Vec::new(),
            records: Vec::new(),
            file: None,
            requests: Vec::new(),
            grant_duration_days: DEFAULT_GRANT_DURATION_DAYS,
            access_record_id: String::new(),
            statuses: Statuses::default(),
        }
    }
}

impl Session {
    /// Starts a session for `identity`.
    pub fn connect(identity: Address) -> Self {
        Self {
            identity: Some(identity),
            ..Self::default()
        }
    }

    /// Starts a session for `identity` with the configured grant duration preselected.
    pub fn connect_with(identity: Address, cfg: &CoreConfig) -> Self {
        Self {
            grant_duration_days: cfg.default_grant_duration_days(),
            ..Self::connect(identity)
        }
    }

    /// Clears every field, including the identity.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn identity(&self) -> Option<Address> {
        self.identity
    }

    pub(crate) fn require_identity(&self) -> ClientResult<Address> {
        self.identity.ok_or(ClientError::NotConnected)
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn set_role(&mut self, role: Option<Role>) {
        self.role = role;
    }

    pub fn patients(&self) -> &[Address] {
        &self.patients
    }

    pub fn selected_patient(&self) -> Option<Address> {
        self.selected_patient
    }

    pub fn patient_details(&self) -> Option<&PatientProfile> {
        self.patient_details.as_ref()
    }

    pub fn auto_record_id(&self) -> bool {
        self.auto_record_id
    }

    /// Turning auto mode on proposes the next identifier from the owned identifiers
    /// already fetched; turning it off clears the record id input.
    pub fn set_auto_record_id(&mut self, enabled: bool) {
        self.auto_record_id = enabled;
        if enabled {
            self.record_id = compute_next_identifier(&self.record_ids_mine);
        } else {
            self.record_id.clear();
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    pub fn set_record_id(&mut self, record_id: impl Into<String>) {
        self.record_id = record_id.into();
    }

    pub fn record_ids_mine(&self) -> &[String] {
        &self.record_ids_mine
    }

    pub fn records(&self) -> &[RecordEntry] {
        &self.records
    }

    pub fn file(&self) -> Option<&UploadFile> {
        self.file.as_ref()
    }

    pub fn select_file(&mut self, file: Option<UploadFile>) {
        self.file = file;
    }

    pub fn requests(&self) -> &[AccessRequest] {
        &self.requests
    }

    pub fn grant_duration_days(&self) -> u32 {
        self.grant_duration_days
    }

    pub fn set_grant_duration_days(&mut self, days: u32) {
        self.grant_duration_days = days;
    }

    pub fn access_record_id(&self) -> &str {
        &self.access_record_id
    }

    pub fn set_access_record_id(&mut self, record_id: impl Into<String>) {
        self.access_record_id = record_id.into();
    }

    pub fn statuses(&self) -> &Statuses {
        &self.statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::addr;

    #[test]
    fn test_connect_uses_defaults() {
        let session = Session::connect(addr(1));

        assert_eq!(session.identity(), Some(addr(1)));
        assert!(session.auto_record_id());
        assert_eq!(session.grant_duration_days(), 1);
        assert!(session.records().is_empty());
        assert_eq!(session.statuses(), &Statuses::default());
    }

    #[test]
    fn test_connect_with_uses_configured_grant_duration() {
        let cfg = CoreConfig::new(
            medrec_types::NonEmptyText::new("general").unwrap(),
            medrec_types::NonEmptyText::new("consult").unwrap(),
            14,
            std::path::PathBuf::from("content"),
        )
        .unwrap();

        let session = Session::connect_with(addr(1), &cfg);

        assert_eq!(session.identity(), Some(addr(1)));
        assert_eq!(session.grant_duration_days(), 14);
        assert!(session.auto_record_id());
    }

    #[test]
    fn test_reset_clears_identity_and_views() {
        let mut session = Session::connect(addr(1));
        session.set_role(Some(Role::Patient));
        session.set_record_id("9");
        session.set_auto_record_id(false);
        session.record_ids_mine = vec!["1".into()];
        session.select_file(Some(UploadFile::new("scan.pdf", vec![1, 2, 3])));

        session.reset();

        assert_eq!(session, Session::default());
        assert!(session.require_identity().is_err());
    }

    #[test]
    fn test_auto_record_id_toggle() {
        let mut session = Session::connect(addr(1));
        session.record_ids_mine = vec!["3".into(), "1".into(), "5".into()];

        session.set_auto_record_id(false);
        assert_eq!(session.record_id(), "");

        session.set_auto_record_id(true);
        assert_eq!(session.record_id(), "6");
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Admin);
        assert!(matches!(
            "nurse".parse::<Role>(),
            Err(ClientError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_upload_file_debug_hides_bytes() {
        let file = UploadFile::new("scan.pdf", vec![0u8; 4]);

        assert_eq!(format!("{:?}", file), "UploadFile { name: \"scan.pdf\", len: 4 }");
    }
}
