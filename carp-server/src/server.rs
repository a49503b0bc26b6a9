// carp-server/src/server.rs
// ============================================================================
// Module: REST/SSE Server
// Description: `axum` router exposing the runtime's session, resolve,
//              execute, approval, and trace surfaces over HTTP.
// Purpose: The externally reachable front door to one `carp_core::Runtime`;
//          every handler authenticates, optionally RBAC-checks, then calls
//          straight through to the matching runtime component.
// Dependencies: carp-core, axum, tokio-stream, serde, serde_json, uuid
// ============================================================================

//! ## Overview
//! One [`AppState`] wraps a `carp_core::Runtime` plus the perimeter
//! collaborators (`auth::CredentialTable`, `auth::RbacPolicy`,
//! `audit::AuthAuditSink`) that sit in front of it. Handlers are thin:
//! authenticate, check permission, translate the HTTP body into the
//! matching core request type, call the runtime, translate the result
//! back. `Resolution` records are not persisted by `Store`, so resolved
//! actions are cached in-process keyed by `resolution_id` for the
//! lifetime of the process — long enough for a caller to resolve and then
//! execute without a second round trip to an Atlas.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::Path as AxumPath;
use axum::extract::Query;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::Sse;
use axum::routing::get;
use axum::routing::post;
use carp_core::AllowedAction;
use carp_core::AtlasId;
use carp_core::ExecuteRequest;
use carp_core::ExecutorError;
use carp_core::GrantId;
use carp_core::MergeRules;
use carp_core::Principal;
use carp_core::PrincipalId;
use carp_core::Resolution;
use carp_core::ResolutionId;
use carp_core::ResolveRequest;
use carp_core::ResolverError;
use carp_core::RiskTier;
use carp_core::Runtime;
use carp_core::Severity;
use carp_core::SessionError;
use carp_core::SessionId;
use carp_core::SpanId;
use carp_core::TraceContext;
use carp_core::TraceId;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::audit::AuthAuditEvent;
use crate::audit::AuthAuditSink;
use crate::audit::AuthOutcome;
use crate::auth::AuthContext;
use crate::auth::AuthError;
use crate::auth::CredentialTable;
use crate::auth::InboundCredential;
use crate::auth::RbacPolicy;
use crate::auth::resolve_credential;

/// Wire-level CARP envelope version stamped on every response.
const CARP_VERSION: &str = "1.0";

/// How long a grant minted by `/v1/carp/execute` remains usable, independent
/// of the action's own dispatch timeout.
const GRANT_TTL_SECONDS: u64 = 300;

// ============================================================================
// SECTION: Application State
// ============================================================================

/// Shared state handed to every handler.
pub struct AppState {
    /// The wired runtime components.
    pub runtime: Arc<Runtime>,
    /// Static credential table resolved against inbound auth headers.
    pub credentials: CredentialTable,
    /// RBAC permission layer; [`RbacPolicy::disabled`] permits everything.
    pub rbac: RbacPolicy,
    /// Auth attempt audit sink, kept separate from the TRACE stream.
    pub audit: Arc<dyn AuthAuditSink>,
    /// Resolutions handed out by `/v1/carp/resolve`, cached so
    /// `/v1/carp/execute` can look up an action's schema/constraints/timeout
    /// without the Store persisting `Resolution` records.
    resolutions: Mutex<HashMap<String, Resolution>>,
    /// Process start time, for `/v1/health`'s `uptime_seconds`.
    started_at: Instant,
}

impl AppState {
    /// Builds application state over `runtime` with the given perimeter
    /// collaborators.
    #[must_use]
    pub fn new(runtime: Arc<Runtime>, credentials: CredentialTable, rbac: RbacPolicy, audit: Arc<dyn AuthAuditSink>) -> Self {
        Self {
            runtime,
            credentials,
            rbac,
            audit,
            resolutions: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    fn cache_resolution(&self, resolution: Resolution) {
        let mut resolutions = self.resolutions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        resolutions.insert(resolution.resolution_id.as_str().to_string(), resolution);
    }

    fn cached_resolution(&self, resolution_id: &str) -> Option<Resolution> {
        let resolutions = self.resolutions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        resolutions.get(resolution_id).cloned()
    }
}

/// Builds the router over `state`.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/{id}/end", post(end_session))
        .route("/v1/carp/resolve", post(resolve))
        .route("/v1/carp/execute", post(execute))
        .route("/v1/carp/actions/{grant_id}/approve", post(approve_action))
        .route("/v1/carp/actions/{grant_id}/reject", post(reject_action))
        .route("/v1/carp/actions/pending", get(pending_actions))
        .route("/v1/carp/executions/{id}", get(get_execution))
        .route("/v1/traces/{trace_id}/events", get(trace_events))
        .route("/v1/traces/{trace_id}/stream", get(trace_stream))
        .with_state(state)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Stable error shape returned to clients, per the runtime's error
/// taxonomy: `{kind, message, rule_id?, details?}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_id: Option<String>,
}

/// An API-level error, carrying the HTTP status it maps to.
struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    rule_id: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            rule_id: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.kind,
            message: self.message,
            rule_id: self.rule_id,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => Self::new(StatusCode::NOT_FOUND, "not_found", format!("session {id:?} not found")),
            SessionError::Expired(id) => Self::new(StatusCode::GONE, "expired", format!("session {id:?} expired")),
            SessionError::InvalidTtl(ttl) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation", format!("invalid ttl_seconds {ttl}"))
            }
            SessionError::Store(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", "storage error".to_string()),
        }
    }
}

impl From<ResolverError> for ApiError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::Session(session_err) => Self::from(session_err),
            ResolverError::AtlasNotFound(atlas) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", format!("atlas {atlas:?} not found"))
            }
            ResolverError::PolicyDenied { reason } => Self::new(StatusCode::FORBIDDEN, "policy_denied", reason),
            ResolverError::MergeConflict(action_id) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                format!("merge conflict on action {action_id:?}"),
            ),
        }
    }
}

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Session(session_err) => Self::from(session_err),
            ExecutorError::Store(_) | ExecutorError::Hashing(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", "storage error".to_string())
            }
            ExecutorError::ActionNotFound(id) => {
                Self::new(StatusCode::NOT_FOUND, "not_found", format!("grant {id:?} not found"))
            }
            ExecutorError::ActionExpired(id) => Self::new(StatusCode::GONE, "expired", format!("grant {id:?} expired")),
            ExecutorError::ActionNotApproved(id) => Self::new(
                StatusCode::FORBIDDEN,
                "approval",
                format!("grant {id:?} requires approval before execution"),
            ),
            ExecutorError::ApprovalNotRequired(id) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                format!("grant {id:?} does not require approval"),
            ),
            ExecutorError::InvalidState { grant_id, expected, actual } => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation",
                format!("grant {grant_id:?} execution is {actual:?}, expected {expected:?}"),
            ),
            ExecutorError::InvalidTtl(ttl) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation", format!("invalid ttl_seconds {ttl}"))
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredential => Self::new(StatusCode::UNAUTHORIZED, "forbidden", "invalid credential".to_string()),
            AuthError::Forbidden(permission) => {
                Self::new(StatusCode::FORBIDDEN, "forbidden", format!("principal lacks permission {permission:?}"))
            }
        }
    }
}

// ============================================================================
// SECTION: Authentication Helper
// ============================================================================

fn inbound_credential(headers: &HeaderMap) -> InboundCredential {
    let bearer_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(ToString::to_string);
    let api_key = headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    InboundCredential { bearer_token, api_key }
}

/// Authenticates the request and, when `permission` is given, checks it
/// against the resolved principal's roles.
fn authenticate(state: &AppState, headers: &HeaderMap, path: &str, permission: Option<&str>) -> Result<AuthContext, ApiError> {
    let credential = inbound_credential(headers);
    let context = resolve_credential(&state.credentials, &credential).map_err(|err| {
        state.audit.record(&AuthAuditEvent {
            event: "auth_attempt",
            outcome: AuthOutcome::Denied,
            method: match (&credential.bearer_token, &credential.api_key) {
                (Some(_), _) => crate::auth::AuthMethod::BearerToken,
                (None, Some(_)) => crate::auth::AuthMethod::ApiKey,
                (None, None) => crate::auth::AuthMethod::Anonymous,
            },
            principal_id: None,
            path: path.to_string(),
            reason: Some(err.to_string()),
        });
        ApiError::from(err)
    })?;

    if let Some(permission) = permission {
        if let Err(err) = state.rbac.check(&context.roles, permission) {
            state.audit.record(&AuthAuditEvent {
                event: "auth_attempt",
                outcome: AuthOutcome::Denied,
                method: context.method,
                principal_id: context.principal.as_ref().map(|principal| principal.id.as_str().to_string()),
                path: path.to_string(),
                reason: Some(err.to_string()),
            });
            return Err(ApiError::from(err));
        }
    }

    state.audit.record(&AuthAuditEvent {
        event: "auth_attempt",
        outcome: AuthOutcome::Allowed,
        method: context.method,
        principal_id: context.principal.as_ref().map(|principal| principal.id.as_str().to_string()),
        path: path.to_string(),
        reason: None,
    });
    Ok(context)
}

// ============================================================================
// SECTION: Health
// ============================================================================

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    carp_version: &'static str,
    trace_version: &'static str,
    uptime_seconds: u64,
    timestamp: String,
}

async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthBody>, ApiError> {
    let timestamp = carp_core::Timestamp::now()
        .to_rfc3339()
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", err.to_string()))?;
    Ok(Json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        carp_version: CARP_VERSION,
        trace_version: carp_core::TRACE_VERSION,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp,
    }))
}

// ============================================================================
// SECTION: Sessions
// ============================================================================

#[derive(Deserialize)]
struct CreateSessionBody {
    principal: Principal,
    #[serde(default)]
    scopes: Vec<String>,
    ttl_seconds: u64,
}

#[derive(Serialize)]
struct CreateSessionResponse {
    session_id: SessionId,
    trace_id: TraceId,
    expires_at: String,
}

async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    authenticate(&state, &headers, "/v1/sessions", Some("session:create"))?;

    let session_id = SessionId::new(uuid::Uuid::new_v4().to_string());
    let trace_id = TraceId::new(uuid::Uuid::new_v4().to_string());
    let session = state
        .runtime
        .sessions
        .create(session_id, trace_id, body.principal, body.scopes, body.ttl_seconds)
        .await?;
    let expires_at = session
        .expires_at
        .to_rfc3339()
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", err.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.session_id,
            trace_id: session.trace_id,
            expires_at,
        }),
    ))
}

async fn end_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers, "/v1/sessions/{id}/end", Some("session:create"))?;
    let summary = state.runtime.sessions.end(&SessionId::new(id)).await?;
    Ok(Json(json!({
        "session_id": summary.session_id,
        "ended_at": summary.ended_at,
        "trace_summary": {
            "reason": summary.reason,
            "counters": summary.counters,
        },
    })))
}

// ============================================================================
// SECTION: Resolve
// ============================================================================

#[derive(Deserialize)]
struct SessionRef {
    session_id: SessionId,
}

#[derive(Deserialize)]
struct AtlasRefWire {
    id: AtlasId,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    capability: Option<String>,
}

#[derive(Deserialize)]
struct ResolvePayload {
    atlases: Vec<AtlasId>,
    goal: String,
    risk_tier: RiskTier,
    #[serde(default)]
    target_platforms: Vec<String>,
    #[serde(default)]
    merge_rules: Option<MergeRules>,
}

#[derive(Deserialize)]
struct CarpRequestEnvelope {
    carp_version: String,
    #[serde(rename = "type")]
    kind: String,
    id: String,
    session: SessionRef,
    atlas: Option<AtlasRefWire>,
    payload: ResolvePayload,
    trace: TraceContext,
}

#[derive(Serialize)]
struct CarpResponseEnvelope<T> {
    carp_version: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    time: String,
    session: SessionRefWire,
    atlas: Option<AtlasRefWire>,
    payload: T,
    trace: TraceContext,
}

#[derive(Serialize)]
struct SessionRefWire {
    session_id: SessionId,
}

impl Serialize for AtlasRefWire {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            id: &'a AtlasId,
            #[serde(skip_serializing_if = "Option::is_none")]
            version: &'a Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            capability: &'a Option<String>,
        }
        Wire {
            id: &self.id,
            version: &self.version,
            capability: &self.capability,
        }
        .serialize(serializer)
    }
}

async fn resolve(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(envelope): Json<CarpRequestEnvelope>,
) -> Result<Json<CarpResponseEnvelope<Resolution>>, ApiError> {
    authenticate(&state, &headers, "/v1/carp/resolve", Some("carp:resolve"))?;
    let _ = (&envelope.carp_version, &envelope.kind);

    let request = ResolveRequest {
        session_id: envelope.session.session_id.clone(),
        atlases: envelope.payload.atlases,
        goal: envelope.payload.goal,
        risk_tier: envelope.payload.risk_tier,
        target_platforms: envelope.payload.target_platforms,
        trace: envelope.trace.clone(),
        capability: envelope.atlas.as_ref().and_then(|atlas| atlas.capability.clone()),
        merge_rules: envelope.payload.merge_rules,
    };

    let response = state.runtime.resolver.resolve(request).await?;
    state.cache_resolution(response.resolution.clone());

    let time = carp_core::Timestamp::now()
        .to_rfc3339()
        .map_err(|err| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", err.to_string()))?;

    Ok(Json(CarpResponseEnvelope {
        carp_version: CARP_VERSION,
        kind: "carp.response",
        id: envelope.id,
        time,
        session: SessionRefWire {
            session_id: envelope.session.session_id,
        },
        atlas: envelope.atlas,
        payload: response.resolution,
        trace: envelope.trace,
    }))
}

// ============================================================================
// SECTION: Execute
// ============================================================================

#[derive(Deserialize)]
struct ExecuteBody {
    session_id: SessionId,
    resolution_id: ResolutionId,
    action_id: String,
    parameters: Value,
    trace_id: TraceId,
    span_id: SpanId,
    #[serde(default)]
    parent_span_id: Option<SpanId>,
}

#[derive(Serialize)]
struct ExecuteResponseBody {
    execution_id: carp_core::ExecutionId,
    status: carp_core::ExecutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    duration_ms: Option<u64>,
    trace: TraceContext,
}

async fn execute(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ExecuteBody>,
) -> Result<Json<ExecuteResponseBody>, ApiError> {
    authenticate(&state, &headers, "/v1/carp/execute", Some("carp:execute"))?;

    let resolution = state.cached_resolution(body.resolution_id.as_str()).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("resolution {:?} not found", body.resolution_id.as_str()),
        )
    })?;
    let action = find_allowed_action(&resolution, &body.action_id).ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("action {:?} not allowed by this resolution", body.action_id),
        )
    })?;

    let grant = state
        .runtime
        .executor
        .grant(
            body.session_id,
            body.resolution_id,
            action.action_id.clone(),
            body.parameters,
            action.parameters_schema.clone(),
            carp_core::PolicyConstraints::default(),
            action.requires_approval,
            GRANT_TTL_SECONDS,
        )
        .await?;

    let trace = TraceContext {
        trace_id: body.trace_id,
        span_id: body.span_id,
        parent_span_id: body.parent_span_id,
    };

    if grant.requires_approval {
        return Ok(Json(ExecuteResponseBody {
            execution_id: carp_core::ExecutionId::new(grant.grant_id.as_str().to_string()),
            status: carp_core::ExecutionState::Pending,
            result: None,
            error: None,
            duration_ms: None,
            trace,
        }));
    }

    let response = state
        .runtime
        .executor
        .execute(ExecuteRequest {
            grant_id: grant.grant_id,
            timeout_millis: Some(action.timeout_ms),
        })
        .await?;

    Ok(Json(ExecuteResponseBody {
        execution_id: response.execution.execution_id,
        status: response.execution.state,
        result: response.execution.result,
        error: response.execution.failure_reason,
        duration_ms: response.execution.duration_millis(),
        trace,
    }))
}

fn find_allowed_action<'a>(resolution: &'a Resolution, action_id: &str) -> Option<&'a AllowedAction> {
    resolution.allowed_actions.iter().find(|action| action.action_id == action_id)
}

// ============================================================================
// SECTION: Approvals
// ============================================================================

#[derive(Deserialize)]
struct ApprovalBody {
    approved_by: Option<String>,
}

#[derive(Deserialize)]
struct RejectionBody {
    rejected_by: String,
    reason: String,
}

async fn approve_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(grant_id): AxumPath<String>,
    Json(body): Json<ApprovalBody>,
) -> Result<Json<carp_core::ActionExecution>, ApiError> {
    authenticate(&state, &headers, "/v1/carp/actions/{grant_id}/approve", Some("carp:execute"))?;
    let approver = body.approved_by.map(PrincipalId::new);
    let execution = state.runtime.executor.approve(&GrantId::new(grant_id), approver).await?;
    Ok(Json(execution))
}

async fn reject_action(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(grant_id): AxumPath<String>,
    Json(body): Json<RejectionBody>,
) -> Result<Json<carp_core::ActionExecution>, ApiError> {
    authenticate(&state, &headers, "/v1/carp/actions/{grant_id}/reject", Some("carp:execute"))?;
    let reason = format!("{} (rejected_by: {})", body.reason, body.rejected_by);
    let execution = state.runtime.executor.reject(&GrantId::new(grant_id), reason).await?;
    Ok(Json(execution))
}

#[derive(Deserialize)]
struct PendingQuery {
    session_id: Option<String>,
}

async fn pending_actions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PendingQuery>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers, "/v1/carp/actions/pending", Some("carp:execute"))?;
    let mut approvals = state.runtime.executor.list_pending_approvals().await?;
    if let Some(session_id) = query.session_id {
        approvals.retain(|grant| grant.session_id.as_str() == session_id);
    }
    let count = approvals.len();
    Ok(Json(json!({"approvals": approvals, "count": count})))
}

async fn get_execution(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<carp_core::ActionExecution>, ApiError> {
    authenticate(&state, &headers, "/v1/carp/executions/{id}", Some("trace:read"))?;
    let execution = state.runtime.executor.get_execution(&carp_core::ExecutionId::new(id)).await?;
    Ok(Json(execution))
}

// ============================================================================
// SECTION: Traces
// ============================================================================

#[derive(Deserialize)]
struct TraceEventsQuery {
    severity: Option<Severity>,
    event_type: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    100
}

/// Upper bound on `limit`, matching the endpoint table's `limit≤1000`.
const MAX_TRACE_EVENTS_LIMIT: usize = 1000;

async fn trace_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(trace_id): AxumPath<String>,
    Query(query): Query<TraceEventsQuery>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers, "/v1/traces/{trace_id}/events", Some("trace:read"))?;
    let limit = query.limit.min(MAX_TRACE_EVENTS_LIMIT);

    let trace_id = TraceId::new(trace_id);
    let all_events = state
        .runtime
        .store
        .load_trace_events(&trace_id)
        .await
        .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "storage", "storage error".to_string()))?;

    let filtered: Vec<_> = all_events
        .into_iter()
        .filter(|event| query.severity.is_none_or(|severity| severity == event.severity))
        .filter(|event| query.event_type.as_ref().is_none_or(|event_type| *event_type == event.event_type))
        .collect();

    let total_count = filtered.len();
    let page: Vec<_> = filtered.into_iter().skip(query.offset).take(limit).collect();
    let has_more = query.offset.saturating_add(page.len()) < total_count;

    Ok(Json(json!({
        "trace_id": trace_id,
        "events": page,
        "total_count": total_count,
        "has_more": has_more,
    })))
}

async fn trace_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(trace_id): AxumPath<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    authenticate(&state, &headers, "/v1/traces/{trace_id}/stream", Some("trace:read"))?;

    let receiver = state.runtime.bus.subscribe();
    let stream = ReceiverStream::new(receiver)
        .filter(move |event| event.trace.trace_id.as_str() == trace_id)
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            Ok(Event::default().data(data))
        });

    Ok(Sse::new(stream))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use carp_core::InMemoryEventBus;
    use carp_core::InMemoryStore;

    use super::*;
    use crate::auth::CredentialEntry;

    fn state() -> Arc<AppState> {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new(16));
        let runtime = Arc::new(Runtime::new(store, bus));
        Arc::new(AppState::new(
            runtime,
            CredentialTable::new().with_entry(CredentialEntry {
                secret: "tok-operator".to_string(),
                principal: Principal {
                    kind: carp_core::PrincipalKind::Service,
                    id: PrincipalId::new("svc-operator"),
                    org_id: None,
                },
                roles: vec!["operator".to_string()],
            }),
            RbacPolicy::disabled(),
            Arc::new(crate::audit::NoopAuditSink),
        ))
    }

    #[test]
    fn anonymous_request_is_permitted_when_rbac_is_disabled() {
        let headers = HeaderMap::new();
        let context = authenticate(&state(), &headers, "/v1/health", None).expect("authenticate");
        assert!(context.principal.is_none());
    }

    #[test]
    fn rbac_enabled_denies_anonymous_without_the_required_role() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryEventBus::new(16));
        let runtime = Arc::new(Runtime::new(store, bus));
        let app_state = Arc::new(AppState::new(
            runtime,
            CredentialTable::new(),
            RbacPolicy::default().with_role("operator", vec!["carp:resolve".to_string()]),
            Arc::new(crate::audit::NoopAuditSink),
        ));
        let headers = HeaderMap::new();
        assert!(authenticate(&app_state, &headers, "/v1/carp/resolve", Some("carp:resolve")).is_err());
    }

    #[test]
    fn resolution_cache_round_trips_by_resolution_id() {
        let app_state = state();
        let resolution = Resolution {
            resolution_id: ResolutionId::new("r-1"),
            session_id: SessionId::new("s-1"),
            atlases: vec![],
            context_blocks: vec![],
            allowed_actions: vec![],
            deny_rules: vec![],
            merge_rules: MergeRules {
                conflict_policy: carp_core::MergeConflictPolicy::LastWriteWins,
                priority_order: vec![],
            },
            confidence: 0.85,
            next_steps: vec!["proceed with the allowed actions".to_string()],
            created_at: carp_core::Timestamp::now(),
        };
        app_state.cache_resolution(resolution.clone());
        assert_eq!(app_state.cached_resolution("r-1"), Some(resolution));
    }
}
