//! Constants used throughout the medrec core crate.

/// Category submitted with every uploaded record.
pub const DEFAULT_RECORD_CATEGORY: &str = "general";

/// Purpose submitted with doctor access requests.
pub const DEFAULT_ACCESS_PURPOSE: &str = "Requested via DApp";

/// Grant duration proposed before the patient edits it.
pub const DEFAULT_GRANT_DURATION_DAYS: u32 = 1;

/// Seconds in one grant day.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Default directory for the local content store.
pub const DEFAULT_CONTENT_DIR: &str = "content_store";

/// Default file for persisted development ledger state.
pub const DEFAULT_LEDGER_STATE_FILE: &str = "ledger.yaml";

/// Record identifier proposed when the identity owns no records yet.
pub const FIRST_RECORD_ID: &str = "1";

/// Audit action names written to the audit sink.
pub mod audit_actions {
    pub const RECORD_UPLOADED: &str = "RecordUploaded";
    pub const ACCESS_GRANTED: &str = "AccessGranted";
    pub const ACCESS_DENIED: &str = "AccessDenied";
    pub const ACCESS_REQUESTED: &str = "AccessRequested";
}
