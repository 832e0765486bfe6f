//! In-process development ledger.
//!
//! `DevLedger` implements the patient registry, provider registry, record manager and
//! audit log collaborators with the access-control rules the client depends on. It backs
//! the test suite, the CLI and the development server.
//!
//! ## Transactions
//!
//! A submitted transaction takes effect when its confirmation is awaited, after the
//! configured confirmation delay. It applies to a copy of the state that replaces the
//! live state only on success, so a rejected transaction leaves no trace.
//!
//! ## Persistence
//!
//! When a state path is configured, the whole state is written as YAML after every
//! confirmed transaction and read back by [`DevLedger::open`]. Confirmations commit one
//! at a time and the file write runs on the blocking pool; reads keep seeing the previous
//! state until the write has finished.

use crate::config::CoreConfig;
use crate::constants::SECONDS_PER_DAY;
use crate::error::{ClientError, ClientResult, RemoteError, RemoteResult};
use crate::remote::{
    AccessRequestRecord, AuditEntry, AuditSink, ContentStore, Contracts, PatientDirectory,
    PatientProfile, PendingTx, ProviderDirectory, ProviderRegistration, RecordStore,
    StoredRecord, TxReceipt,
};
use async_trait::async_trait;
use chrono::Utc;
use medrec_types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A provider as held by the provider registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub did: String,
    pub name: String,
    pub role: String,
    pub license_id: String,
    pub hospital: String,
    pub verified: bool,
}

/// An audit entry as stored by the audit log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub sequence: u64,
    pub timestamp: u64,
    #[serde(flatten)]
    pub entry: AuditEntry,
}

/// Complete ledger state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    admin: Address,
    block_number: u64,
    next_request_id: u64,
    patient_order: Vec<Address>,
    patients: BTreeMap<Address, PatientProfile>,
    providers: BTreeMap<Address, ProviderProfile>,
    records: BTreeMap<Address, Vec<StoredRecord>>,
    requests: BTreeMap<u64, AccessRequestRecord>,
    audit_log: Vec<AuditLogEntry>,
}

impl LedgerState {
    fn new(admin: Address) -> Self {
        Self {
            admin,
            block_number: 0,
            next_request_id: 1,
            patient_order: Vec::new(),
            patients: BTreeMap::new(),
            providers: BTreeMap::new(),
            records: BTreeMap::new(),
            requests: BTreeMap::new(),
            audit_log: Vec::new(),
        }
    }

    fn owned_records(&self, owner: &Address) -> &[StoredRecord] {
        self.records.get(owner).map(Vec::as_slice).unwrap_or(&[])
    }

    fn decidable_request(
        &mut self,
        request_id: u64,
        caller: &Address,
    ) -> RemoteResult<&mut AccessRequestRecord> {
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| RemoteError::rejected("Request not found"))?;
        if &request.patient != caller {
            return Err(RemoteError::rejected(
                "Only the patient can decide on this request",
            ));
        }
        if request.is_approved || request.is_rejected {
            return Err(RemoteError::rejected("Request already decided"));
        }
        Ok(request)
    }
}

/// Caller and block time a transaction executes with.
#[derive(Clone, Copy, Debug)]
struct TxContext {
    caller: Address,
    timestamp: u64,
}

struct LedgerInner {
    state: Mutex<LedgerState>,
    /// Held from state copy to swap so confirmations never build on the same base.
    commit: tokio::sync::Mutex<()>,
    state_path: Option<PathBuf>,
    confirmation_delay: Duration,
    submitted: AtomicU64,
}

/// Shared handle to one development ledger. Cloning shares the same state.
#[derive(Clone)]
pub struct DevLedger {
    inner: Arc<LedgerInner>,
}

impl std::fmt::Debug for DevLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevLedger")
            .field("state_path", &self.inner.state_path)
            .field("confirmation_delay", &self.inner.confirmation_delay)
            .finish_non_exhaustive()
    }
}

impl DevLedger {
    /// Creates an empty in-memory ledger administered by `admin`.
    pub fn new(admin: Address) -> Self {
        Self::from_parts(LedgerState::new(admin), None, Duration::ZERO)
    }

    /// Opens the ledger described by `cfg`.
    ///
    /// Existing state at the configured path is loaded. Otherwise a fresh ledger is
    /// created whose admin is the configured admin, or `opener` when none is configured.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::LedgerState` if existing state cannot be read or parsed.
    pub fn open(cfg: &CoreConfig, opener: Address) -> ClientResult<Self> {
        let state = match cfg.ledger_state_path() {
            Some(path) if path.exists() => load_state(path)?,
            _ => LedgerState::new(cfg.admin().unwrap_or(opener)),
        };

        Ok(Self::from_parts(
            state,
            cfg.ledger_state_path().map(Path::to_path_buf),
            cfg.confirmation_delay(),
        ))
    }

    fn from_parts(
        state: LedgerState,
        state_path: Option<PathBuf>,
        confirmation_delay: Duration,
    ) -> Self {
        let submitted = AtomicU64::new(state.block_number);
        Self {
            inner: Arc::new(LedgerInner {
                state: Mutex::new(state),
                commit: tokio::sync::Mutex::new(()),
                state_path,
                confirmation_delay,
                submitted,
            }),
        }
    }

    /// Returns contract handles bound to `identity`.
    pub fn connect(&self, identity: Address) -> LedgerConnection {
        LedgerConnection {
            ledger: self.clone(),
            caller: identity,
        }
    }

    pub fn admin(&self) -> RemoteResult<Address> {
        self.read(|s| Ok(s.admin))
    }

    pub fn block_number(&self) -> RemoteResult<u64> {
        self.read(|s| Ok(s.block_number))
    }

    pub fn audit_log(&self) -> RemoteResult<Vec<AuditLogEntry>> {
        self.read(|s| Ok(s.audit_log.clone()))
    }

    pub fn provider(&self, identity: &Address) -> RemoteResult<Option<ProviderProfile>> {
        self.read(|s| Ok(s.providers.get(identity).cloned()))
    }

    fn read<T>(&self, f: impl FnOnce(&LedgerState) -> RemoteResult<T>) -> RemoteResult<T> {
        let state = self
            .inner
            .state
            .lock()
            .map_err(|_| RemoteError::unavailable("ledger state lock poisoned"))?;
        f(&state)
    }

    fn submit<F>(&self, caller: Address, apply: F) -> PendingTx
    where
        F: FnOnce(&mut LedgerState, TxContext) -> RemoteResult<()> + Send + 'static,
    {
        let sequence = self.inner.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        let hash = format!("0x{:064x}", sequence);
        let ledger = self.clone();
        let tx_hash = hash.clone();

        tracing::debug!("submitted {} from {}", hash, caller);

        PendingTx::new(hash, async move {
            let delay = ledger.inner.confirmation_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let ctx = TxContext {
                caller,
                timestamp: now_secs(),
            };
            ledger.commit(tx_hash, ctx, apply).await
        })
    }

    async fn commit<F>(&self, hash: String, ctx: TxContext, apply: F) -> RemoteResult<TxReceipt>
    where
        F: FnOnce(&mut LedgerState, TxContext) -> RemoteResult<()>,
    {
        let _commit = self.inner.commit.lock().await;

        let mut next = self.read(|s| Ok(s.clone()))?;
        if let Err(e) = apply(&mut next, ctx) {
            tracing::debug!("transaction {} reverted: {}", hash, e);
            return Err(e);
        }
        next.block_number += 1;

        if let Some(path) = self.inner.state_path.clone() {
            next = tokio::task::spawn_blocking(move || persist_state(&path, &next).map(|()| next))
                .await
                .map_err(|e| {
                    RemoteError::unavailable(format!("ledger persistence task failed: {}", e))
                })??;
        }

        let receipt = TxReceipt {
            hash,
            block_number: next.block_number,
        };
        let mut state = self
            .inner
            .state
            .lock()
            .map_err(|_| RemoteError::unavailable("ledger state lock poisoned"))?;
        *state = next;
        Ok(receipt)
    }
}

fn now_secs() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

fn load_state(path: &Path) -> ClientResult<LedgerState> {
    let raw = fs::read_to_string(path).map_err(|e| {
        ClientError::LedgerState(format!("failed to read {}: {}", path.display(), e))
    })?;
    serde_yaml::from_str(&raw).map_err(|e| {
        ClientError::LedgerState(format!("failed to parse {}: {}", path.display(), e))
    })
}

fn persist_state(path: &Path, state: &LedgerState) -> RemoteResult<()> {
    let yaml = serde_yaml::to_string(state)
        .map_err(|e| RemoteError::unavailable(format!("failed to serialise ledger: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            RemoteError::unavailable(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }

    let staging = path.with_extension("partial");
    fs::write(&staging, yaml)
        .and_then(|()| fs::rename(&staging, path))
        .map_err(|e| {
            RemoteError::unavailable(format!("failed to write {}: {}", path.display(), e))
        })
}

/// Contract handles of one identity on a [`DevLedger`].
#[derive(Clone, Debug)]
pub struct LedgerConnection {
    ledger: DevLedger,
    caller: Address,
}

impl LedgerConnection {
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Bundles this connection with a content store into client collaborators.
    pub fn contracts(&self, content: Arc<dyn ContentStore>) -> Contracts {
        let this = Arc::new(self.clone());
        Contracts {
            patients: this.clone(),
            records: this.clone(),
            providers: this.clone(),
            audit: this,
            content,
        }
    }
}

#[async_trait]
impl PatientDirectory for LedgerConnection {
    async fn count(&self) -> RemoteResult<u64> {
        self.ledger.read(|s| Ok(s.patient_order.len() as u64))
    }

    async fn address_at(&self, index: u64) -> RemoteResult<Address> {
        self.ledger.read(|s| {
            usize::try_from(index)
                .ok()
                .and_then(|i| s.patient_order.get(i))
                .copied()
                .ok_or_else(|| RemoteError::rejected("Index out of bounds"))
        })
    }

    async fn get(&self, identity: &Address) -> RemoteResult<PatientProfile> {
        self.ledger.read(|s| {
            s.patients
                .get(identity)
                .cloned()
                .ok_or_else(|| RemoteError::rejected("Patient not found"))
        })
    }

    async fn register(&self, profile: PatientProfile) -> RemoteResult<PendingTx> {
        Ok(self.ledger.submit(self.caller, move |s, ctx| {
            if s.patients.contains_key(&ctx.caller) {
                return Err(RemoteError::rejected("Patient already registered"));
            }
            if profile.did.trim().is_empty() || profile.name.trim().is_empty() {
                return Err(RemoteError::rejected("Invalid patient details"));
            }
            s.patients.insert(ctx.caller, profile);
            s.patient_order.push(ctx.caller);
            Ok(())
        }))
    }
}

#[async_trait]
impl RecordStore for LedgerConnection {
    async fn my_identifiers(&self) -> RemoteResult<Vec<String>> {
        self.ledger.read(|s| {
            Ok(s.owned_records(&self.caller)
                .iter()
                .map(|r| r.record_id.clone())
                .collect())
        })
    }

    async fn resolve(&self, record_id: &str) -> RemoteResult<StoredRecord> {
        self.ledger.read(|s| {
            s.owned_records(&self.caller)
                .iter()
                .find(|r| r.record_id == record_id)
                .cloned()
                .ok_or_else(|| RemoteError::rejected("Record not found or access denied"))
        })
    }

    async fn upload(
        &self,
        record_id: &str,
        content_hash: &str,
        category: &str,
    ) -> RemoteResult<PendingTx> {
        let record = StoredRecord {
            record_id: record_id.to_owned(),
            content_hash: content_hash.to_owned(),
            category: category.to_owned(),
            exists: true,
        };

        Ok(self.ledger.submit(self.caller, move |s, ctx| {
            if record.record_id.trim().is_empty() {
                return Err(RemoteError::rejected("Record ID required"));
            }
            if record.content_hash.trim().is_empty() {
                return Err(RemoteError::rejected("Content hash required"));
            }
            let owned = s.records.entry(ctx.caller).or_default();
            if owned.iter().any(|r| r.record_id == record.record_id) {
                return Err(RemoteError::rejected("Record ID already exists"));
            }
            owned.push(record);
            Ok(())
        }))
    }

    async fn my_access_request_ids(&self) -> RemoteResult<Vec<u64>> {
        self.ledger.read(|s| {
            Ok(s.requests
                .values()
                .filter(|r| r.patient == self.caller || r.provider == self.caller)
                .map(|r| r.request_id)
                .collect())
        })
    }

    async fn request_details(&self, request_id: u64) -> RemoteResult<AccessRequestRecord> {
        self.ledger.read(|s| {
            s.requests
                .get(&request_id)
                .cloned()
                .ok_or_else(|| RemoteError::rejected("Request not found"))
        })
    }

    async fn request_access(
        &self,
        patient: &Address,
        record_id: &str,
        purpose: &str,
    ) -> RemoteResult<PendingTx> {
        let patient = *patient;
        let record_id = record_id.to_owned();
        let purpose = purpose.to_owned();

        Ok(self.ledger.submit(self.caller, move |s, ctx| {
            if !s
                .owned_records(&patient)
                .iter()
                .any(|r| r.record_id == record_id)
            {
                return Err(RemoteError::rejected("Record not found"));
            }

            let request_id = s.next_request_id;
            s.next_request_id += 1;
            s.requests.insert(
                request_id,
                AccessRequestRecord {
                    request_id,
                    provider: ctx.caller,
                    patient,
                    purpose,
                    record_id,
                    request_date: ctx.timestamp,
                    is_approved: false,
                    is_rejected: false,
                    expiry_date: 0,
                },
            );
            Ok(())
        }))
    }

    async fn approve(&self, request_id: u64, duration_days: u32) -> RemoteResult<PendingTx> {
        Ok(self.ledger.submit(self.caller, move |s, ctx| {
            if duration_days == 0 {
                return Err(RemoteError::rejected("Duration must be at least one day"));
            }
            let request = s.decidable_request(request_id, &ctx.caller)?;
            request.is_approved = true;
            request.expiry_date = ctx
                .timestamp
                .saturating_add(u64::from(duration_days).saturating_mul(SECONDS_PER_DAY));
            Ok(())
        }))
    }

    async fn reject(&self, request_id: u64) -> RemoteResult<PendingTx> {
        Ok(self.ledger.submit(self.caller, move |s, ctx| {
            let request = s.decidable_request(request_id, &ctx.caller)?;
            request.is_rejected = true;
            Ok(())
        }))
    }
}

#[async_trait]
impl ProviderDirectory for LedgerConnection {
    async fn register(&self, registration: ProviderRegistration) -> RemoteResult<PendingTx> {
        Ok(self.ledger.submit(self.caller, move |s, ctx| {
            if s.providers.contains_key(&ctx.caller) {
                return Err(RemoteError::rejected("Provider already registered"));
            }
            if [&registration.did, &registration.name, &registration.role]
                .iter()
                .any(|f| f.trim().is_empty())
            {
                return Err(RemoteError::rejected("Invalid provider details"));
            }
            s.providers.insert(
                ctx.caller,
                ProviderProfile {
                    did: registration.did,
                    name: registration.name,
                    role: registration.role,
                    license_id: registration.license_id,
                    hospital: registration.hospital,
                    verified: false,
                },
            );
            Ok(())
        }))
    }

    async fn verify(&self, identity: &Address) -> RemoteResult<PendingTx> {
        let identity = *identity;
        Ok(self.ledger.submit(self.caller, move |s, ctx| {
            if ctx.caller != s.admin {
                return Err(RemoteError::rejected("Only admin can verify providers"));
            }
            let provider = s
                .providers
                .get_mut(&identity)
                .ok_or_else(|| RemoteError::rejected("Provider not registered"))?;
            if provider.verified {
                return Err(RemoteError::rejected("Provider already verified"));
            }
            provider.verified = true;
            Ok(())
        }))
    }

    async fn admin_identity(&self) -> RemoteResult<Address> {
        self.ledger.admin()
    }
}

#[async_trait]
impl AuditSink for LedgerConnection {
    async fn append(&self, entry: AuditEntry) -> RemoteResult<PendingTx> {
        Ok(self.ledger.submit(self.caller, move |s, ctx| {
            let sequence = s.audit_log.len() as u64 + 1;
            s.audit_log.push(AuditLogEntry {
                sequence,
                timestamp: ctx.timestamp,
                entry,
            });
            Ok(())
        }))
    }
}
