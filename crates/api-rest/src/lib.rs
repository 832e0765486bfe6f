//! # API REST
//!
//! REST API for the MedRec client.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, base64 file bodies)
//!
//! The caller names its identity in the `x-identity` header. The server keeps one
//! [`Session`] per identity, and requests for the same identity run one at a time.

#![warn(rust_2018_idioms)]

pub mod dto;
pub mod error;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path as AxumPath, State},
    http::{request::Parts, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use base64::Engine;
use medrec_core::{
    Address, ContentStore, CoreConfig, DevLedger, MedRecClient, NewPatient, NewProvider, Role,
    Session, UploadFile,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use dto::*;
pub use error::{ApiError, ApiResult};

/// Header carrying the caller's identity.
pub const IDENTITY_HEADER: &str = "x-identity";

/// Sessions kept before the least recently used one is dropped.
pub const DEFAULT_SESSION_LIMIT: usize = 1024;

type SharedSession = Arc<tokio::sync::Mutex<Session>>;

struct SessionSlot {
    session: SharedSession,
    last_used: u64,
}

/// Per-identity sessions, ordered by a use counter for eviction.
#[derive(Default)]
struct SessionRegistry {
    slots: HashMap<Address, SessionSlot>,
    clock: u64,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    cfg: Arc<CoreConfig>,
    ledger: DevLedger,
    content: Arc<dyn ContentStore>,
    sessions: Arc<Mutex<SessionRegistry>>,
    session_limit: usize,
}

impl AppState {
    pub fn new(cfg: Arc<CoreConfig>, ledger: DevLedger, content: Arc<dyn ContentStore>) -> Self {
        Self {
            cfg,
            ledger,
            content,
            sessions: Arc::new(Mutex::new(SessionRegistry::default())),
            session_limit: DEFAULT_SESSION_LIMIT,
        }
    }

    /// Caps the number of live sessions; the least recently used one is dropped first.
    pub fn with_session_limit(mut self, limit: usize) -> Self {
        self.session_limit = limit.max(1);
        self
    }

    fn client_for(&self, identity: Address) -> MedRecClient {
        let contracts = self.ledger.connect(identity).contracts(self.content.clone());
        MedRecClient::new(contracts, self.cfg.clone())
    }

    /// Returns the session of `identity`, connecting a fresh one on first use.
    fn session_for(&self, identity: Address) -> ApiResult<SharedSession> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|_| ApiError::internal("session registry unavailable"))?;
        let registry = &mut *guard;
        registry.clock += 1;
        let now = registry.clock;

        if !registry.slots.contains_key(&identity) && registry.slots.len() >= self.session_limit {
            let oldest = registry
                .slots
                .iter()
                .min_by_key(|(_, slot)| slot.last_used)
                .map(|(address, _)| *address);
            if let Some(oldest) = oldest {
                registry.slots.remove(&oldest);
                tracing::debug!("session for {} evicted", oldest);
            }
        }

        let slot = registry.slots.entry(identity).or_insert_with(|| SessionSlot {
            session: Arc::new(tokio::sync::Mutex::new(Session::connect_with(
                identity, &self.cfg,
            ))),
            last_used: now,
        });
        slot.last_used = now;
        Ok(slot.session.clone())
    }

    fn drop_session(&self, identity: &Address) -> ApiResult<Option<SharedSession>> {
        let mut registry = self
            .sessions
            .lock()
            .map_err(|_| ApiError::internal("session registry unavailable"))?;
        Ok(registry.slots.remove(identity).map(|slot| slot.session))
    }
}

/// The caller's identity, taken from the `x-identity` header.
#[derive(Clone, Copy, Debug)]
pub struct Identity(pub Address);

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(IDENTITY_HEADER)
            .ok_or_else(|| ApiError::unauthorized(format!("missing {} header", IDENTITY_HEADER)))?;
        let value = value
            .to_str()
            .map_err(|_| ApiError::bad_request(format!("{} header is not text", IDENTITY_HEADER)))?;
        Address::parse(value)
            .map(Identity)
            .map_err(|e| ApiError::bad_request(format!("invalid identity: {}", e)))
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        get_session,
        logout,
        enter_role,
        set_auto_record_id,
        list_patients,
        register_patient,
        select_patient,
        list_records,
        next_record_id,
        upload_record,
        list_access_requests,
        request_access,
        grant_access,
        deny_access,
        register_provider,
        verify_provider,
        audit_log,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        StatusRes,
        StatusesRes,
        PatientRes,
        RecordRes,
        AccessRequestRes,
        SessionRes,
        RoleReq,
        AutoRecordIdReq,
        PatientListRes,
        RegisterPatientReq,
        RecordListRes,
        NextRecordIdRes,
        UploadRecordReq,
        AccessRequestListRes,
        RequestAccessReq,
        GrantReq,
        RegisterProviderReq,
        AuditEntryRes,
        AuditListRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with Swagger UI and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(get_session).delete(logout))
        .route("/session/role", put(enter_role))
        .route("/session/auto-record-id", put(set_auto_record_id))
        .route("/patients", get(list_patients).post(register_patient))
        .route("/patients/:address", get(select_patient))
        .route("/records", get(list_records).post(upload_record))
        .route("/records/next-id", get(next_record_id))
        .route(
            "/access-requests",
            get(list_access_requests).post(request_access),
        )
        .route("/access-requests/:id/grant", post(grant_access))
        .route("/access-requests/:id/deny", post(deny_access))
        .route("/providers", post(register_provider))
        .route("/providers/:address/verify", post(verify_provider))
        .route("/audit", get(audit_log))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "MedRec REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Current session", body = SessionRes),
        (status = 401, description = "Missing identity", body = ErrorRes)
    )
)]
/// Returns the caller's session, connecting it on first use.
#[axum::debug_handler]
async fn get_session(
    State(state): State<AppState>,
    Identity(identity): Identity,
) -> ApiResult<Json<SessionRes>> {
    let session = state.session_for(identity)?;
    let session = session.lock().await;
    Ok(Json(SessionRes::from(&*session)))
}

#[utoipa::path(
    delete,
    path = "/session",
    responses(
        (status = 204, description = "Session cleared")
    )
)]
/// Logs out: clears the caller's session and forgets it.
#[axum::debug_handler]
async fn logout(State(state): State<AppState>, Identity(identity): Identity) -> ApiResult<StatusCode> {
    if let Some(session) = state.drop_session(&identity)? {
        let mut session = session.lock().await;
        state.client_for(identity).logout(&mut session);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/session/role",
    request_body = RoleReq,
    responses(
        (status = 200, description = "Role entered", body = SessionRes),
        (status = 400, description = "Unknown role", body = ErrorRes)
    )
)]
/// Enters a dashboard role. Entering `patient` loads records and access requests.
#[axum::debug_handler]
async fn enter_role(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<RoleReq>,
) -> ApiResult<Json<SessionRes>> {
    let role: Role = req.role.parse()?;
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    state.client_for(identity).enter_role(&mut session, role).await?;
    Ok(Json(SessionRes::from(&*session)))
}

#[utoipa::path(
    put,
    path = "/session/auto-record-id",
    request_body = AutoRecordIdReq,
    responses(
        (status = 200, description = "Auto record id updated", body = SessionRes)
    )
)]
/// Turns automatic record ids on or off.
#[axum::debug_handler]
async fn set_auto_record_id(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<AutoRecordIdReq>,
) -> ApiResult<Json<SessionRes>> {
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    session.set_auto_record_id(req.enabled);
    Ok(Json(SessionRes::from(&*session)))
}

#[utoipa::path(
    get,
    path = "/patients",
    responses(
        (status = 200, description = "Registered patients in registry order", body = PatientListRes),
        (status = 502, description = "Patient registry read failed", body = ErrorRes)
    )
)]
/// Lists every registered patient.
#[axum::debug_handler]
async fn list_patients(
    State(state): State<AppState>,
    Identity(identity): Identity,
) -> ApiResult<Json<PatientListRes>> {
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    let patients = state
        .client_for(identity)
        .directory()
        .fetch_all_patients(&mut session)
        .await?;
    Ok(Json(PatientListRes {
        patients: patients.iter().map(ToString::to_string).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = RegisterPatientReq,
    responses(
        (status = 200, description = "Patient registered", body = SessionRes),
        (status = 400, description = "Missing or malformed field", body = ErrorRes),
        (status = 422, description = "Rejected by the patient registry", body = ErrorRes)
    )
)]
/// Registers the caller as a patient.
#[axum::debug_handler]
async fn register_patient(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<RegisterPatientReq>,
) -> ApiResult<Json<SessionRes>> {
    let form = NewPatient {
        did: req.did,
        name: req.name,
        date_of_birth: req.date_of_birth,
        medical_profile: req.medical_profile,
    };
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    state
        .client_for(identity)
        .register_patient(&mut session, &form)
        .await?;
    Ok(Json(SessionRes::from(&*session)))
}

#[utoipa::path(
    get,
    path = "/patients/{address}",
    params(
        ("address" = String, Path, description = "Patient address")
    ),
    responses(
        (status = 200, description = "Patient profile", body = PatientRes),
        (status = 502, description = "Profile could not be read", body = ErrorRes)
    )
)]
/// Selects a patient and returns its profile.
#[axum::debug_handler]
async fn select_patient(
    State(state): State<AppState>,
    Identity(identity): Identity,
    AxumPath(address): AxumPath<String>,
) -> ApiResult<Json<PatientRes>> {
    let patient = Address::parse(&address)
        .map_err(|e| ApiError::bad_request(format!("invalid patient address: {}", e)))?;
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    let profile = state
        .client_for(identity)
        .directory()
        .select_patient(&mut session, patient)
        .await?;
    Ok(Json(PatientRes::from(&profile)))
}

#[utoipa::path(
    get,
    path = "/records",
    responses(
        (status = 200, description = "Records owned by the caller", body = RecordListRes),
        (status = 502, description = "Owned identifiers could not be listed", body = ErrorRes)
    )
)]
/// Refreshes and returns the caller's records.
#[axum::debug_handler]
async fn list_records(
    State(state): State<AppState>,
    Identity(identity): Identity,
) -> ApiResult<Json<RecordListRes>> {
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    let records = state
        .client_for(identity)
        .records()
        .refresh_my_records(&mut session)
        .await?
        .iter()
        .map(RecordRes::from)
        .collect();
    Ok(Json(RecordListRes {
        records,
        next_record_id: session.record_id().into(),
    }))
}

#[utoipa::path(
    get,
    path = "/records/next-id",
    responses(
        (status = 200, description = "Next record id", body = NextRecordIdRes)
    )
)]
/// Proposes the next record id from the caller's owned identifiers.
#[axum::debug_handler]
async fn next_record_id(
    State(state): State<AppState>,
    Identity(identity): Identity,
) -> ApiResult<Json<NextRecordIdRes>> {
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    let record_id = state
        .client_for(identity)
        .records()
        .suggest_new_record_id(&mut session)
        .await?;
    Ok(Json(NextRecordIdRes { record_id }))
}

#[utoipa::path(
    post,
    path = "/records",
    request_body = UploadRecordReq,
    responses(
        (status = 200, description = "Record uploaded", body = RecordRes),
        (status = 400, description = "Missing file or record id", body = ErrorRes),
        (status = 422, description = "Rejected by the record manager", body = ErrorRes)
    )
)]
/// Uploads a file as a new record of the caller.
#[axum::debug_handler]
async fn upload_record(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<UploadRecordReq>,
) -> ApiResult<Json<RecordRes>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content_base64.as_bytes())
        .map_err(|e| ApiError::bad_request(format!("content is not valid base64: {}", e)))?;

    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    session.select_file(Some(UploadFile::new(req.file_name, bytes)));
    if let Some(record_id) = req.record_id {
        session.set_record_id(record_id);
    }

    let entry = state
        .client_for(identity)
        .records()
        .upload_record(&mut session)
        .await?;
    Ok(Json(RecordRes::from(&entry)))
}

#[utoipa::path(
    get,
    path = "/access-requests",
    responses(
        (status = 200, description = "Access requests involving the caller", body = AccessRequestListRes),
        (status = 502, description = "A request could not be resolved", body = ErrorRes)
    )
)]
/// Reloads the caller's access requests.
#[axum::debug_handler]
async fn list_access_requests(
    State(state): State<AppState>,
    Identity(identity): Identity,
) -> ApiResult<Json<AccessRequestListRes>> {
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    let requests = state
        .client_for(identity)
        .tracker()
        .load_requests(&mut session)
        .await?;
    Ok(Json(AccessRequestListRes {
        requests: requests.iter().map(AccessRequestRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/access-requests",
    request_body = RequestAccessReq,
    responses(
        (status = 200, description = "Request submitted", body = StatusRes),
        (status = 400, description = "Missing patient or record id", body = ErrorRes),
        (status = 422, description = "Rejected by the record manager", body = ErrorRes)
    )
)]
/// Doctor workflow: requests access to a patient's record.
#[axum::debug_handler]
async fn request_access(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<RequestAccessReq>,
) -> ApiResult<Json<StatusRes>> {
    let patient = Address::parse(&req.patient)
        .map_err(|e| ApiError::bad_request(format!("invalid patient address: {}", e)))?;
    let client = state.client_for(identity);
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    // An unregistered patient still gets selected; the record manager decides.
    if let Err(e) = client.directory().select_patient(&mut session, patient).await {
        tracing::warn!("patient details unavailable: {}", e);
    }
    session.set_access_record_id(req.record_id);

    client.tracker().request_access(&mut session).await?;
    Ok(Json(StatusRes::from(&session.statuses().access_request)))
}

#[utoipa::path(
    post,
    path = "/access-requests/{id}/grant",
    params(
        ("id" = u64, Path, description = "Access request id")
    ),
    request_body = GrantReq,
    responses(
        (status = 200, description = "Access granted; reloaded requests", body = AccessRequestListRes),
        (status = 400, description = "Invalid duration", body = ErrorRes),
        (status = 422, description = "Rejected by the record manager", body = ErrorRes)
    )
)]
/// Patient workflow: approves an access request for a number of days.
#[axum::debug_handler]
async fn grant_access(
    State(state): State<AppState>,
    Identity(identity): Identity,
    AxumPath(id): AxumPath<u64>,
    Json(req): Json<GrantReq>,
) -> ApiResult<Json<AccessRequestListRes>> {
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    if let Some(days) = req.duration_days {
        session.set_grant_duration_days(days);
    }
    let days = session.grant_duration_days();

    state
        .client_for(identity)
        .tracker()
        .grant(&mut session, id, days)
        .await?;
    Ok(Json(AccessRequestListRes {
        requests: session.requests().iter().map(AccessRequestRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/access-requests/{id}/deny",
    params(
        ("id" = u64, Path, description = "Access request id")
    ),
    responses(
        (status = 200, description = "Access denied; reloaded requests", body = AccessRequestListRes),
        (status = 422, description = "Rejected by the record manager", body = ErrorRes)
    )
)]
/// Patient workflow: rejects an access request.
#[axum::debug_handler]
async fn deny_access(
    State(state): State<AppState>,
    Identity(identity): Identity,
    AxumPath(id): AxumPath<u64>,
) -> ApiResult<Json<AccessRequestListRes>> {
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    state
        .client_for(identity)
        .tracker()
        .deny(&mut session, id)
        .await?;
    Ok(Json(AccessRequestListRes {
        requests: session.requests().iter().map(AccessRequestRes::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/providers",
    request_body = RegisterProviderReq,
    responses(
        (status = 200, description = "Provider registration submitted", body = StatusRes),
        (status = 400, description = "Missing field", body = ErrorRes),
        (status = 422, description = "Rejected by the provider registry", body = ErrorRes)
    )
)]
/// Registers the caller as a provider awaiting verification.
#[axum::debug_handler]
async fn register_provider(
    State(state): State<AppState>,
    Identity(identity): Identity,
    Json(req): Json<RegisterProviderReq>,
) -> ApiResult<Json<StatusRes>> {
    let form = NewProvider {
        did: req.did,
        name: req.name,
        role: req.role,
        license_id: req.license_id,
        hospital: req.hospital,
    };
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    state
        .client_for(identity)
        .directory()
        .register_provider(&mut session, &form)
        .await?;
    Ok(Json(StatusRes::from(
        &session.statuses().provider_registration,
    )))
}

#[utoipa::path(
    post,
    path = "/providers/{address}/verify",
    params(
        ("address" = String, Path, description = "Provider address")
    ),
    responses(
        (status = 200, description = "Provider verified", body = StatusRes),
        (status = 400, description = "Caller is not the admin", body = ErrorRes),
        (status = 422, description = "Rejected by the provider registry", body = ErrorRes)
    )
)]
/// Admin workflow: verifies a registered provider.
#[axum::debug_handler]
async fn verify_provider(
    State(state): State<AppState>,
    Identity(identity): Identity,
    AxumPath(address): AxumPath<String>,
) -> ApiResult<Json<StatusRes>> {
    let session = state.session_for(identity)?;
    let mut session = session.lock().await;

    state
        .client_for(identity)
        .directory()
        .verify_provider(&mut session, &address)
        .await?;
    Ok(Json(StatusRes::from(
        &session.statuses().provider_verification,
    )))
}

#[utoipa::path(
    get,
    path = "/audit",
    responses(
        (status = 200, description = "Audit log of the development ledger", body = AuditListRes)
    )
)]
/// Returns the development ledger's audit log.
#[axum::debug_handler]
async fn audit_log(State(state): State<AppState>) -> ApiResult<Json<AuditListRes>> {
    let entries = state
        .ledger
        .audit_log()
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(AuditListRes {
        entries: entries.iter().map(AuditEntryRes::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use medrec_core::{ContentStoreService, NonEmptyText};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const ADMIN: &str = "0x00000000000000000000000000000000000000ad";
    const PATIENT: &str = "0x0000000000000000000000000000000000000001";
    const DOCTOR: &str = "0x0000000000000000000000000000000000000002";

    fn test_state(temp: &TempDir, cfg: CoreConfig) -> AppState {
        let content = ContentStoreService::new(temp.path()).expect("content store");
        let admin = Address::parse(ADMIN).expect("admin address");
        AppState::new(Arc::new(cfg), DevLedger::new(admin), Arc::new(content))
    }

    fn test_app() -> (TempDir, Router) {
        let temp = TempDir::new().expect("temp dir");
        let state = test_state(&temp, CoreConfig::default());
        (temp, router(state))
    }

    async fn disable_auto_record_id(app: &Router, identity: &str) {
        let (status, _) = call(
            app,
            Method::PUT,
            "/session/auto-record-id",
            Some(identity),
            Some(json!({ "enabled": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        identity: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(identity) = identity {
            builder = builder.header(IDENTITY_HEADER, identity);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (_temp, app) = test_app();

        let (status, body) = call(&app, Method::GET, "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_session_requires_identity_header() {
        let (_temp, app) = test_app();

        let (status, _) = call(&app, Method::GET, "/session", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, Method::GET, "/session", Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_new_session_has_defaults() {
        let (_temp, app) = test_app();

        let (status, body) = call(&app, Method::GET, "/session", Some(PATIENT), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["identity"], PATIENT);
        assert_eq!(body["auto_record_id"], true);
        assert_eq!(body["grant_duration_days"], 1);
        assert_eq!(body["statuses"]["transaction"]["state"], "idle");
    }

    #[tokio::test]
    async fn test_upload_request_and_grant_flow() {
        let (_temp, app) = test_app();

        let (status, _) = call(
            &app,
            Method::POST,
            "/patients",
            Some(PATIENT),
            Some(json!({
                "did": "did:example:1",
                "name": "Ada",
                "date_of_birth": "1990-05-01",
                "medical_profile": "none"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            Method::PUT,
            "/session/role",
            Some(PATIENT),
            Some(json!({ "role": "patient" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record_id"], "1");

        let (status, body) = call(
            &app,
            Method::POST,
            "/records",
            Some(PATIENT),
            Some(json!({ "file_name": "note.txt", "content_base64": "SGVsbG8sIFdvcmxkIQ==" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record_id"], "1");
        assert_eq!(
            body["content_hash"],
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );

        let (status, body) = call(
            &app,
            Method::POST,
            "/access-requests",
            Some(DOCTOR),
            Some(json!({ "patient": PATIENT, "record_id": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Request submitted.");

        let (status, body) =
            call(&app, Method::GET, "/access-requests", Some(PATIENT), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requests"][0]["status"], "pending");

        let (status, body) = call(
            &app,
            Method::POST,
            "/access-requests/1/grant",
            Some(PATIENT),
            Some(json!({ "duration_days": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requests"][0]["is_approved"], true);
        assert_eq!(body["requests"][0]["is_rejected"], false);

        let (status, body) = call(
            &app,
            Method::POST,
            "/access-requests/1/deny",
            Some(PATIENT),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "Deny access failed: Request already decided");

        let (_, body) = call(&app, Method::GET, "/audit", None, None).await;
        let actions: Vec<&str> = body["entries"]
            .as_array()
            .expect("entries")
            .iter()
            .filter_map(|e| e["action"].as_str())
            .collect();
        assert_eq!(actions, ["RecordUploaded", "AccessRequested", "AccessGranted"]);
    }

    #[tokio::test]
    async fn test_upload_without_record_id_is_bad_request() {
        let (_temp, app) = test_app();
        call(
            &app,
            Method::PUT,
            "/session/auto-record-id",
            Some(PATIENT),
            Some(json!({ "enabled": false })),
        )
        .await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/records",
            Some(PATIENT),
            Some(json!({ "file_name": "note.txt", "content_base64": "AAEC" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Record ID required");
    }

    #[tokio::test]
    async fn test_verify_provider_is_admin_only() {
        let (_temp, app) = test_app();
        let provider = "0x0000000000000000000000000000000000000005";

        let (status, _) = call(
            &app,
            Method::POST,
            "/providers",
            Some(provider),
            Some(json!({ "did": "did:p", "name": "Dr P", "role": "GP" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/providers/{}/verify", provider);
        let (status, body) = call(&app, Method::POST, &uri, Some(provider), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Only admin can verify providers");

        let (status, body) = call(&app, Method::POST, &uri, Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Provider verified successfully.");
    }

    #[tokio::test]
    async fn test_logout_forgets_session() {
        let (_temp, app) = test_app();
        call(
            &app,
            Method::PUT,
            "/session/auto-record-id",
            Some(PATIENT),
            Some(json!({ "enabled": false })),
        )
        .await;

        let (status, _) = call(&app, Method::DELETE, "/session", Some(PATIENT), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = call(&app, Method::GET, "/session", Some(PATIENT), None).await;
        assert_eq!(body["auto_record_id"], true);
    }

    #[tokio::test]
    async fn test_new_session_uses_configured_grant_duration() {
        let temp = TempDir::new().expect("temp dir");
        let cfg = CoreConfig::new(
            NonEmptyText::new("general").expect("category"),
            NonEmptyText::new("consult").expect("purpose"),
            7,
            temp.path().to_path_buf(),
        )
        .expect("config");
        let app = router(test_state(&temp, cfg));

        let (status, body) = call(&app, Method::GET, "/session", Some(PATIENT), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["grant_duration_days"], 7);
    }

    #[tokio::test]
    async fn test_least_recently_used_session_is_evicted() {
        let temp = TempDir::new().expect("temp dir");
        let app = router(test_state(&temp, CoreConfig::default()).with_session_limit(2));
        const OTHER: &str = "0x0000000000000000000000000000000000000003";

        disable_auto_record_id(&app, PATIENT).await;
        disable_auto_record_id(&app, DOCTOR).await;
        // Touching the patient makes the doctor the oldest entry.
        let (_, body) = call(&app, Method::GET, "/session", Some(PATIENT), None).await;
        assert_eq!(body["auto_record_id"], false);

        call(&app, Method::GET, "/session", Some(OTHER), None).await;

        let (_, body) = call(&app, Method::GET, "/session", Some(PATIENT), None).await;
        assert_eq!(body["auto_record_id"], false);
        let (_, body) = call(&app, Method::GET, "/session", Some(DOCTOR), None).await;
        assert_eq!(body["auto_record_id"], true);
    }
}
