//! Request and response bodies.
//!
//! Addresses travel as `0x`-prefixed hex strings and timestamps as unix seconds.

use medrec_core::{
    AccessRequest, AuditLogEntry, OperationStatus, PatientProfile, RecordEntry, RequestStatus,
    Session, Statuses,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusRes {
    /// One of `idle`, `in_progress`, `succeeded`, `failed`.
    pub state: String,
    pub message: String,
}

impl From<&OperationStatus> for StatusRes {
    fn from(status: &OperationStatus) -> Self {
        let state = match status {
            OperationStatus::Idle => "idle",
            OperationStatus::InProgress(_) => "in_progress",
            OperationStatus::Succeeded(_) => "succeeded",
            OperationStatus::Failed(_) => "failed",
        };
        Self {
            state: state.into(),
            message: status.message().into(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct StatusesRes {
    pub patient_registration: StatusRes,
    pub transaction: StatusRes,
    pub access_request: StatusRes,
    pub provider_registration: StatusRes,
    pub provider_verification: StatusRes,
}

impl From<&Statuses> for StatusesRes {
    fn from(statuses: &Statuses) -> Self {
        Self {
            patient_registration: (&statuses.patient_registration).into(),
            transaction: (&statuses.transaction).into(),
            access_request: (&statuses.access_request).into(),
            provider_registration: (&statuses.provider_registration).into(),
            provider_verification: (&statuses.provider_verification).into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PatientRes {
    pub did: String,
    pub name: String,
    pub date_of_birth: i64,
    pub medical_profile: String,
}

impl From<&PatientProfile> for PatientRes {
    fn from(profile: &PatientProfile) -> Self {
        Self {
            did: profile.did.clone(),
            name: profile.name.clone(),
            date_of_birth: profile.date_of_birth,
            medical_profile: profile.medical_profile.clone(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecordRes {
    pub record_id: String,
    pub content_hash: String,
}

impl From<&RecordEntry> for RecordRes {
    fn from(entry: &RecordEntry) -> Self {
        Self {
            record_id: entry.record_id.clone(),
            content_hash: entry.content_hash.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccessRequestRes {
    pub request_id: u64,
    pub provider: String,
    pub patient: String,
    pub purpose: String,
    pub record_id: String,
    pub request_date: u64,
    /// One of `pending`, `approved`, `rejected`.
    pub status: String,
    pub is_approved: bool,
    pub is_rejected: bool,
    /// Zero unless approved.
    pub expiry_date: u64,
}

impl From<&AccessRequest> for AccessRequestRes {
    fn from(request: &AccessRequest) -> Self {
        let status = match request.status() {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved { .. } => "approved",
            RequestStatus::Rejected => "rejected",
        };
        Self {
            request_id: request.request_id(),
            provider: request.provider().to_string(),
            patient: request.patient().to_string(),
            purpose: request.purpose().into(),
            record_id: request.record_id().into(),
            request_date: request.request_date(),
            status: status.into(),
            is_approved: request.is_approved(),
            is_rejected: request.is_rejected(),
            expiry_date: request.expiry_date().unwrap_or(0),
        }
    }
}

/// Everything the dashboard renders for one identity.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct SessionRes {
    pub identity: Option<String>,
    pub role: Option<String>,
    pub patients: Vec<String>,
    pub selected_patient: Option<String>,
    pub patient_details: Option<PatientRes>,
    pub auto_record_id: bool,
    pub record_id: String,
    pub record_ids_mine: Vec<String>,
    pub records: Vec<RecordRes>,
    pub selected_file: Option<String>,
    pub requests: Vec<AccessRequestRes>,
    pub grant_duration_days: u32,
    pub access_record_id: String,
    pub statuses: StatusesRes,
}

impl From<&Session> for SessionRes {
    fn from(session: &Session) -> Self {
        Self {
            identity: session.identity().map(|a| a.to_string()),
            role: session.role().map(|r| r.to_string()),
            patients: session.patients().iter().map(ToString::to_string).collect(),
            selected_patient: session.selected_patient().map(|a| a.to_string()),
            patient_details: session.patient_details().map(PatientRes::from),
            auto_record_id: session.auto_record_id(),
            record_id: session.record_id().into(),
            record_ids_mine: session.record_ids_mine().to_vec(),
            records: session.records().iter().map(RecordRes::from).collect(),
            selected_file: session.file().map(|f| f.name.clone()),
            requests: session.requests().iter().map(AccessRequestRes::from).collect(),
            grant_duration_days: session.grant_duration_days(),
            access_record_id: session.access_record_id().into(),
            statuses: session.statuses().into(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RoleReq {
    /// One of `patient`, `doctor`, `provider`, `admin`.
    pub role: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AutoRecordIdReq {
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct PatientListRes {
    pub patients: Vec<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterPatientReq {
    pub did: String,
    pub name: String,
    /// `YYYY-MM-DD`.
    pub date_of_birth: String,
    pub medical_profile: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RecordListRes {
    pub records: Vec<RecordRes>,
    pub next_record_id: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct NextRecordIdRes {
    pub record_id: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct UploadRecordReq {
    pub file_name: String,
    /// File bytes, standard base64.
    pub content_base64: String,
    /// Overrides the proposed record id when present.
    #[serde(default)]
    pub record_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AccessRequestListRes {
    pub requests: Vec<AccessRequestRes>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RequestAccessReq {
    pub patient: String,
    pub record_id: String,
}

#[derive(Default, Serialize, Deserialize, ToSchema)]
pub struct GrantReq {
    /// Defaults to the session's grant duration.
    #[serde(default)]
    pub duration_days: Option<u32>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterProviderReq {
    pub did: String,
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub license_id: Option<String>,
    #[serde(default)]
    pub hospital: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuditEntryRes {
    pub sequence: u64,
    pub timestamp: u64,
    pub actor: String,
    pub action: String,
    pub record_id: String,
    pub target: String,
    pub info: String,
}

impl From<&AuditLogEntry> for AuditEntryRes {
    fn from(logged: &AuditLogEntry) -> Self {
        Self {
            sequence: logged.sequence,
            timestamp: logged.timestamp,
            actor: logged.entry.actor.to_string(),
            action: logged.entry.action.clone(),
            record_id: logged.entry.record_id.clone(),
            target: logged.entry.target.to_string(),
            info: logged.entry.info.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuditListRes {
    pub entries: Vec<AuditEntryRes>,
}
