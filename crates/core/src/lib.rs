//! # MedRec Core
//!
//! Client core for the medical records ledger.
//!
//! The ledger contracts (patient registry, provider registry, record manager, audit log)
//! and the content store own all real state. This crate drives them on behalf of one
//! connected identity:
//! - Record Identity Reconciler: proposes the next record identifier
//! - Access Grant Tracker: loads access requests and grants or denies them
//! - Record upload orchestration and the owned-records view
//! - Patient and provider directory workflows
//! - A development ledger implementing the contracts in-process
//!
//! Every view held in a [`Session`] is rebuilt from the ledger after a mutation; nothing
//! is patched locally.
//!
//! **No API concerns**: HTTP servers and command-line parsing belong in `api-rest` and
//! `medrec-cli`.

pub mod audit;
pub mod client;
pub mod config;
pub mod constants;
mod content;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod reconciler;
pub mod records;
pub mod remote;
pub mod session;
pub mod status;
pub mod tracker;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use audit::AuditTrail;
pub use client::MedRecClient;
pub use config::CoreConfig;
pub use directory::{Directory, NewPatient, NewProvider};
pub use error::{ClientError, ClientResult, RemoteError, RemoteResult};
pub use ledger::{AuditLogEntry, DevLedger, LedgerConnection, ProviderProfile};
pub use reconciler::compute_next_identifier;
pub use records::RecordUploader;
pub use remote::{
    AccessRequestRecord, AuditEntry, AuditSink, ContentStore, Contracts, PatientDirectory,
    PatientProfile, PendingTx, ProviderDirectory, ProviderRegistration, RecordStore,
    StoredRecord, TxReceipt,
};
pub use session::{RecordEntry, Role, Session, Statuses, UploadFile};
pub use status::{Operation, OperationStatus};
pub use tracker::{AccessGrantTracker, AccessRequest, RequestStatus};

pub use medrec_files::ContentStoreService;
pub use medrec_types::{Address, NonEmptyText};
