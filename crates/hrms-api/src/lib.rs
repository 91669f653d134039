//! ---
//! hrms_section: "04-networking-external-interfaces"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "REST surface for section permissions."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hrms_access::{
    prepare_grant, resolve, role_access_view, AccessMetrics, AccessSource, AliasTable, AppSection,
    AuditLog, GrantError, GrantRecord, GrantRequest, ResolveInput, ResolverPolicy, Role,
    RoleDefaults, RoleKey, SectionKey,
};
use hrms_persistence::{AccessStore, PersistenceError};
use indexmap::IndexMap;
use parking_lot::Mutex;
use prometheus::TextEncoder;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Header naming the administrator behind a grant change.
pub const ACTOR_HEADER: &str = "x-hrms-actor";

/// Shared API state exposed to handlers.
pub struct ApiState {
    store: Arc<dyn AccessStore>,
    defaults: RoleDefaults,
    policy: ResolverPolicy,
    aliases: &'static AliasTable,
    metrics: Option<AccessMetrics>,
    audit: Option<Mutex<AuditLog>>,
    start: Instant,
}

impl ApiState {
    pub fn new(store: Arc<dyn AccessStore>, defaults: RoleDefaults, policy: ResolverPolicy) -> Self {
        Self {
            store,
            defaults,
            policy,
            aliases: AliasTable::standard(),
            metrics: None,
            audit: None,
            start: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, metrics: AccessMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(Mutex::new(audit));
        self
    }

    fn status(&self) -> Result<StatusResponse, ApiError> {
        Ok(StatusResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
            uptime_seconds: self.start.elapsed().as_secs(),
            sections: self.store.catalog()?.len(),
            roles: self.store.roles()?.len(),
        })
    }

    fn sections(&self) -> Result<SectionsResponse, ApiError> {
        let catalog = self.store.catalog()?;
        let roles = self.store.roles()?;
        let stored = self.store.role_access()?;
        let role_access = role_access_view(&catalog, &roles, &stored, &self.defaults, self.aliases);
        Ok(SectionsResponse {
            sections: catalog.sections().to_vec(),
            roles,
            role_access,
        })
    }

    fn replace_grant(&self, actor: &str, request: &GrantRequest) -> Result<GrantRecord, ApiError> {
        let catalog = self.store.catalog()?;
        let roles = self.store.roles()?;
        let grant = prepare_grant(request, &catalog, &roles, self.aliases).map_err(|err| {
            if let Some(metrics) = &self.metrics {
                metrics.observe_grant_rejection(&err);
            }
            warn!(actor, reason = err.reason(), "grant update refused");
            ApiError::from(err)
        })?;

        // Held across the store write so audit entries follow write order.
        let mut audit = self.audit.as_ref().map(|audit| audit.lock());
        let previous = self
            .store
            .replace_role_access(&grant.role, &grant.sections)?
            .unwrap_or_default();
        if let Some(metrics) = &self.metrics {
            metrics.inc_grant_update();
        }
        info!(
            actor,
            role = %grant.role,
            sections = grant.sections.len(),
            "role grant replaced"
        );
        if let Some(audit) = audit.as_mut() {
            if let Err(err) = audit.record_grant(actor, &previous, &grant) {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_audit_failure();
                }
                error!(error = %err, role = %grant.role, "failed to append grant audit entry");
                return Err(ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("grant for {} stored but not audited: {err}", grant.role),
                ));
            }
        }
        Ok(grant)
    }

    fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResponse, ApiError> {
        let catalog = self.store.catalog()?;
        let overrides = self.store.role_access()?;
        let hint = request
            .allowed_sections
            .as_deref()
            .map(|raw| self.aliases.canonicalize_keys(raw))
            .filter(|keys| !keys.is_empty());
        let access = resolve(
            &ResolveInput {
                role: &request.role,
                account_override: hint.as_deref(),
                server_overrides: &overrides,
                defaults: &self.defaults,
                catalog: &catalog,
                aliases: self.aliases,
            },
            &self.policy,
        );
        if let Some(metrics) = &self.metrics {
            metrics.observe_resolution(access.source);
        }

        let active = request
            .active_section
            .as_deref()
            .and_then(|raw| self.aliases.canonicalize_key(raw))
            .map(|key| key.folded());
        let sections = catalog
            .iter()
            .map(|section| &section.key)
            .filter(|key| {
                access.contains(key.as_str()) || active.as_deref() == Some(key.folded().as_str())
            })
            .cloned()
            .collect();
        Ok(ResolveResponse {
            role: access.role,
            source: access.source,
            sections,
        })
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("policy", &self.policy)
            .field("metrics", &self.metrics.is_some())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

/// Routes served by [`spawn_api_server`].
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route(
            "/api/permissions/sections",
            get(get_sections).put(put_sections),
        )
        .route("/api/permissions/resolve", post(post_resolve))
        .route("/metrics", get(get_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve the permissions API until shut down.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    sections: usize,
    roles: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SectionsResponse {
    sections: Vec<AppSection>,
    roles: Vec<Role>,
    role_access: IndexMap<RoleKey, Vec<SectionKey>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequest {
    #[serde(default)]
    role: String,
    #[serde(default)]
    allowed_sections: Option<Vec<String>>,
    #[serde(default)]
    active_section: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveResponse {
    role: Option<RoleKey>,
    source: AccessSource,
    sections: Vec<SectionKey>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<GrantError> for ApiError {
    fn from(err: GrantError) -> Self {
        let status = match err {
            GrantError::MissingRole
            | GrantError::EmptySections
            | GrantError::NoRecognisedSections => StatusCode::BAD_REQUEST,
            GrantError::LockedRole(_) => StatusCode::FORBIDDEN,
            GrantError::UnknownRole(_) => StatusCode::NOT_FOUND,
        };
        Self::new(status, err.to_string())
    }
}

impl From<PersistenceError> for ApiError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::LockedRole(_) => Self::new(StatusCode::FORBIDDEN, err.to_string()),
            other => {
                error!(error = %other, "access store failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

async fn get_status(State(state): State<Arc<ApiState>>) -> Result<Json<StatusResponse>, ApiError> {
    state.status().map(Json)
}

async fn get_sections(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<SectionsResponse>, ApiError> {
    state.sections().map(Json)
}

async fn put_sections(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Result<Json<GrantRequest>, JsonRejection>,
) -> Result<Json<GrantRecord>, ApiError> {
    let Json(request) = payload?;
    let actor = headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("anonymous");
    state.replace_grant(actor, &request).map(Json)
}

async fn post_resolve(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let Json(request) = payload?;
    state.resolve(&request).map(Json)
}

async fn get_metrics(State(state): State<Arc<ApiState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics registry unavailable",
        )
            .into_response();
    };

    let encoder = TextEncoder::new();
    let families = metrics.registry().gather();
    match encoder.encode_to_string(&families) {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => {
            warn!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrms_persistence::{AccessDocument, DocumentStore, MemoryStore};
    use prometheus::Registry;
    use reqwest::Client;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn spawn(state: ApiState) -> (ApiServer, String) {
        let server = spawn_api_server(Arc::new(state), "127.0.0.1:0".parse().unwrap()).unwrap();
        let base = format!("http://{}", server.addr());
        (server, base)
    }

    fn memory_state() -> ApiState {
        ApiState::new(
            Arc::new(MemoryStore::seeded()),
            RoleDefaults::builtin(),
            ResolverPolicy::default(),
        )
    }

    async fn put(client: &Client, base: &str, body: Value) -> (StatusCode, Value) {
        let response = client
            .put(format!("{base}/api/permissions/sections"))
            .header(ACTOR_HEADER, "alice")
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn sections_report_locked_and_default_access() {
        let (server, base) = spawn(memory_state());
        let body: Value = Client::new()
            .get(format!("{base}/api/permissions/sections"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let sections = body["sections"].as_array().unwrap();
        assert_eq!(sections.len(), 12);
        assert_eq!(body["roles"].as_array().unwrap().len(), 5);
        assert_eq!(body["roleAccess"]["ADMIN"].as_array().unwrap().len(), 12);
        assert_eq!(
            body["roleAccess"]["MANAGER"],
            json!(["overview", "employees", "shifts", "attendance"])
        );
        assert_eq!(body["roleAccess"]["EMPLOYEE"], json!([]));
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn put_validates_and_stores_grants() {
        let (server, base) = spawn(memory_state());
        let client = Client::new();

        let (status, body) = put(&client, &base, json!({"role": "ADMIN", "sections": ["overview"]})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["message"].as_str().unwrap().contains("ADMIN"));

        let (status, _) = put(&client, &base, json!({"sections": ["overview"]})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = put(&client, &base, json!({"role": "HR", "sections": []})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = put(&client, &base, json!({"role": "HR", "sections": ["payroll"]})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = put(&client, &base, json!({"role": "INTERN", "sections": ["overview"]})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = put(
            &client,
            &base,
            json!({"role": "hr", "sections": ["reports", "attendanceManagement", "employeeInfo"]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"role": "HR", "sections": ["reports", "attendance"]}));

        let view: Value = client
            .get(format!("{base}/api/permissions/sections"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view["roleAccess"]["HR"], json!(["reports", "attendance"]));
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_body_is_a_json_error() {
        let (server, base) = spawn(memory_state());
        let response = Client::new()
            .put(format!("{base}/api/permissions/sections"))
            .header("content-type", "application/json")
            .body("{ nope")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert!(body["message"].is_string());
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn resolve_reports_source_and_active_section() {
        let registry = Arc::new(Registry::new());
        let metrics = AccessMetrics::new(registry).unwrap();
        let (server, base) = spawn(memory_state().with_metrics(metrics.clone()));
        let client = Client::new();

        let body: Value = client
            .post(format!("{base}/api/permissions/resolve"))
            .json(&json!({"role": "employee", "activeSection": "settings"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["role"], json!("EMPLOYEE"));
        assert_eq!(body["source"], json!("baseline"));
        assert_eq!(
            body["sections"],
            json!([
                "attendance",
                "attendanceOverview",
                "attendanceEdit",
                "attendanceReport",
                "settings"
            ])
        );

        let body: Value = client
            .post(format!("{base}/api/permissions/resolve"))
            .json(&json!({"role": "DIRECTOR", "allowedSections": ["overview"]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["source"], json!("locked"));
        assert_eq!(body["sections"].as_array().unwrap().len(), 12);

        let exported = client
            .get(format!("{base}/metrics"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(exported.contains("hrms_access_resolutions_total"));
        assert_eq!(metrics.resolutions(AccessSource::Locked), 1);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn grant_changes_are_audited() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open_or_seed(dir.path().join("access.json")).unwrap();
        let audit = AuditLog::new(dir.path().join("grants.log")).unwrap();
        let state = ApiState::new(
            Arc::new(store),
            RoleDefaults::builtin(),
            ResolverPolicy::default(),
        )
        .with_audit_log(audit);
        let (server, base) = spawn(state);
        let client = Client::new();

        put(&client, &base, json!({"role": "MANAGER", "sections": ["overview"]})).await;
        put(&client, &base, json!({"role": "MANAGER", "sections": ["shifts"]})).await;
        server.shutdown().await.unwrap();

        let log = AuditLog::new(dir.path().join("grants.log")).unwrap();
        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].actor, "alice");
        assert_eq!(entries[1].previous, vec![SectionKey::new("overview")]);
        assert!(log.verify().unwrap());
    }

    #[tokio::test]
    async fn stale_grant_listing_matches_resolution() {
        let mut document = AccessDocument::fallback();
        document.role_access.insert(
            RoleKey::normalise("MANAGER").unwrap(),
            vec![SectionKey::new("payroll")],
        );
        let state = ApiState::new(
            Arc::new(MemoryStore::new(document)),
            RoleDefaults::builtin(),
            ResolverPolicy::default(),
        );
        let (server, base) = spawn(state);
        let client = Client::new();

        let view: Value = client
            .get(format!("{base}/api/permissions/sections"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let resolved: Value = client
            .post(format!("{base}/api/permissions/resolve"))
            .json(&json!({"role": "MANAGER"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(resolved["source"], json!("server-override"));
        assert_eq!(resolved["sections"], json!([]));
        assert_eq!(view["roleAccess"]["MANAGER"], resolved["sections"]);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn anonymous_resolve_ignores_section_hint() {
        let (server, base) = spawn(memory_state());
        let body: Value = Client::new()
            .post(format!("{base}/api/permissions/resolve"))
            .json(&json!({"allowedSections": ["permissions", "settings"]}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["role"], Value::Null);
        assert_eq!(body["source"], json!("baseline"));
        assert_eq!(
            body["sections"],
            json!([
                "attendance",
                "attendanceOverview",
                "attendanceEdit",
                "attendanceReport"
            ])
        );
        server.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_grants_are_audited_in_write_order() {
        let dir = tempdir().unwrap();
        let store = Arc::new(DocumentStore::open_or_seed(dir.path().join("access.json")).unwrap());
        let state = ApiState::new(
            store.clone(),
            RoleDefaults::builtin(),
            ResolverPolicy::default(),
        )
        .with_audit_log(AuditLog::new(dir.path().join("grants.log")).unwrap());
        let (server, base) = spawn(state);
        let client = Client::new();

        let choices = ["overview", "shifts", "reports", "employees"];
        let mut requests = Vec::new();
        for round in 0..16 {
            let client = client.clone();
            let base = base.clone();
            let section = choices[round % choices.len()];
            requests.push(tokio::spawn(async move {
                put(&client, &base, json!({"role": "MANAGER", "sections": [section]})).await
            }));
        }
        for request in requests {
            let (status, _) = request.await.unwrap();
            assert_eq!(status, StatusCode::OK);
        }
        server.shutdown().await.unwrap();

        let entries = AuditLog::new(dir.path().join("grants.log"))
            .unwrap()
            .entries()
            .unwrap();
        assert_eq!(entries.len(), 16);
        assert!(entries[0].previous.is_empty());
        for pair in entries.windows(2) {
            assert_eq!(pair[1].previous, pair[0].sections);
        }
        let manager = RoleKey::normalise("MANAGER").unwrap();
        assert_eq!(
            store.role_access().unwrap()[&manager],
            entries[15].sections
        );
    }

    #[tokio::test]
    async fn failed_audit_append_is_an_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let metrics = AccessMetrics::new(Arc::new(Registry::new())).unwrap();
        let state = memory_state()
            .with_metrics(metrics.clone())
            .with_audit_log(AuditLog::new(blocker.join("grants.log")).unwrap());
        let (server, base) = spawn(state);

        let (status, body) = put(
            &Client::new(),
            &base,
            json!({"role": "HR", "sections": ["reports"]}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("not audited"));
        assert_eq!(metrics.audit_failures(), 1);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn metrics_unavailable_without_registry() {
        let (server, base) = spawn(memory_state());
        let response = Client::new()
            .get(format!("{base}/metrics"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 503);
        server.shutdown().await.unwrap();
    }
}
