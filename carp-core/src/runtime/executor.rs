// carp-core/src/runtime/executor.rs
// ============================================================================
// Module: Action Executor (C6)
// Description: Materializes policy-gated permissions into grants, carries
//              grants through approval and dispatch, and records the result.
// Purpose: The only component that calls into an ActionHandler; every
//          dispatch is preceded by a grant check and followed by a hashed,
//          append-only execution record.
// Dependencies: crate::{core, interfaces, runtime::session_manager}, uuid, tokio
// ============================================================================

//! ## Overview
//! A grant and its execution record share one identifier: calling
//! [`Executor::grant`] mints a `GrantId`/`ExecutionId` pair from the same
//! generated UUID, so looking up the execution for a grant never needs a
//! separate index. Execution then moves through the same linear state
//! machine described on [`ExecutionState`]: `Pending` either waits for
//! [`Executor::approve`]/[`Executor::reject`] (when the grant requires
//! approval) or is dispatched directly by [`Executor::execute`]. Dispatch
//! runs under a timeout, validates bound parameters against the grant's
//! schema, redacts constrained fields from the result, and hashes both the
//! parameters and the (possibly redacted) result so the execution is
//! independently verifiable without replaying the handler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::core::Actor;
use crate::core::ActionExecution;
use crate::core::ActionGrant;
use crate::core::ApprovalRequest;
use crate::core::ExecuteRequest;
use crate::core::ExecuteResponse;
use crate::core::ExecutionId;
use crate::core::ExecutionState;
use crate::core::GrantId;
use crate::core::HashAlgorithm;
use crate::core::HashError;
use crate::core::PolicyConstraints;
use crate::core::PrincipalId;
use crate::core::ResolutionId;
use crate::core::Session;
use crate::core::SessionId;
use crate::core::Severity;
use crate::core::SpanId;
use crate::core::TraceContext;
use crate::core::TraceEvent;
use crate::core::Timestamp;
use crate::core::event_type;
use crate::core::hash_canonical_json_numeric_normalized;
use crate::interfaces::ActionHandler;
use crate::interfaces::EventBus;
use crate::interfaces::HandlerError;
use crate::interfaces::Store;
use crate::interfaces::StoreError;
use crate::runtime::session_manager::SessionError;
use crate::runtime::session_manager::SessionManager;

/// Dispatch timeout applied when an [`ExecuteRequest`] does not declare one.
const DEFAULT_EXECUTE_TIMEOUT_MILLIS: u64 = 30_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while granting, approving, or dispatching an action.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The owning session failed validation.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The underlying store reported an error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Canonical hashing of parameters or a result failed.
    #[error(transparent)]
    Hashing(#[from] HashError),
    /// No grant or execution exists with the given id.
    #[error("grant {0:?} not found")]
    ActionNotFound(String),
    /// The grant's TTL has lapsed.
    #[error("grant {0:?} has expired")]
    ActionExpired(String),
    /// The grant requires approval and none has been recorded.
    #[error("grant {0:?} requires approval before it can be executed")]
    ActionNotApproved(String),
    /// [`Executor::request_approval`] was called on a grant that does not
    /// require approval.
    #[error("grant {0:?} does not require approval")]
    ApprovalNotRequired(String),
    /// The execution was not in the state a transition requires.
    #[error("grant {grant_id:?} execution is in state {actual:?}, expected {expected:?}")]
    InvalidState {
        /// Grant whose execution was in the wrong state.
        grant_id: String,
        /// State the caller's operation required.
        expected: ExecutionState,
        /// State the execution was actually in.
        actual: ExecutionState,
    },
    /// `ttl_seconds` was not a positive, representable duration.
    #[error("ttl_seconds must be greater than zero, got {0}")]
    InvalidTtl(u64),
}

// ============================================================================
// SECTION: Parameter Validation
// ============================================================================

/// Validates `parameters` against a minimal JSON Schema subset: `type:
/// "object"` and a top-level `required` array. This intentionally does not
/// implement the full JSON Schema specification; it catches the case that
/// matters most for grant dispatch, a required field silently missing from
/// the bound parameters.
fn validate_parameters(parameters: &Value, schema: &Value) -> Result<(), String> {
    let Value::Object(schema) = schema else {
        return Ok(());
    };
    if let Some(Value::String(type_name)) = schema.get("type") {
        if type_name == "object" && !parameters.is_object() {
            return Err(format!("expected parameters of type object, got {parameters}"));
        }
    }
    if let Some(Value::Array(required)) = schema.get("required") {
        let Value::Object(params) = parameters else {
            return Err("schema declares required fields but parameters is not an object".to_string());
        };
        for field in required {
            if let Value::String(name) = field {
                if !params.contains_key(name) {
                    return Err(format!("missing required field {name:?}"));
                }
            }
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Redaction
// ============================================================================

/// Replaces every dotted field path in `fields` with a fixed redaction
/// marker, mutating `value` in place. Paths that do not resolve (missing
/// segment, non-object intermediate) are silently skipped rather than
/// failing the whole execution.
fn redact_fields(value: &mut Value, fields: &[String]) {
    for field in fields {
        redact_path(value, field);
    }
}

/// Redacts one dotted path, recursing into nested objects one segment at a
/// time.
fn redact_path(value: &mut Value, dotted_path: &str) {
    let Value::Object(map) = value else {
        return;
    };
    let Some((head, rest)) = dotted_path.split_once('.') else {
        if let Some(entry) = map.get_mut(dotted_path) {
            *entry = Value::String("[REDACTED]".to_string());
        }
        return;
    };
    if let Some(nested) = map.get_mut(head) {
        redact_path(nested, rest);
    }
}

// ============================================================================
// SECTION: Passthrough Handler
// ============================================================================

/// Default handler dispatched to when no [`ActionHandler`] is registered for
/// an action id: echoes the bound parameters back rather than failing the
/// dispatch outright, so an Atlas whose adapters outrun handler
/// registration still produces an auditable (if inert) execution record.
struct PassthroughHandler;

#[async_trait]
impl ActionHandler for PassthroughHandler {
    async fn handle(&self, action_id: &str, parameters: &Value) -> Result<Value, HandlerError> {
        Ok(json!({
            "action_id": action_id,
            "dispatched": false,
            "parameters": parameters,
        }))
    }
}

// ============================================================================
// SECTION: Executor
// ============================================================================

/// Action Executor (C6): the sole caller of registered [`ActionHandler`]s.
pub struct Executor {
    sessions: Arc<SessionManager>,
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
    handlers: Mutex<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl Executor {
    /// Creates an executor over the given Session Manager, store, and
    /// telemetry bus. No handlers are registered; unregistered actions
    /// dispatch to [`PassthroughHandler`].
    #[must_use]
    pub fn new(sessions: Arc<SessionManager>, store: Arc<dyn Store>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            sessions,
            store,
            bus,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers the handler dispatched to for `action_id`, replacing any
    /// prior registration.
    pub fn register_handler(&self, action_id: impl Into<String>, handler: Arc<dyn ActionHandler>) {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.insert(action_id.into(), handler);
        }
    }

    /// Materializes a grant for `action_id` bound to `parameters`, and
    /// creates its paired execution record in [`ExecutionState::Pending`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Session`] when the session is unknown or
    /// expired, [`ExecutorError::InvalidTtl`] when `ttl_seconds` is zero or
    /// not representable, and [`ExecutorError::Store`]/[`ExecutorError::Hashing`]
    /// on persistence or hashing failure.
    #[allow(clippy::too_many_arguments, reason = "mirrors the grant record's own field set; no natural sub-grouping exists")]
    pub async fn grant(
        &self,
        session_id: SessionId,
        resolution_id: ResolutionId,
        action_id: String,
        parameters: Value,
        parameters_schema: Value,
        constraints: PolicyConstraints,
        requires_approval: bool,
        ttl_seconds: u64,
    ) -> Result<ActionGrant, ExecutorError> {
        let session = self.sessions.get(&session_id).await?;
        if ttl_seconds == 0 {
            return Err(ExecutorError::InvalidTtl(ttl_seconds));
        }
        let created_at = Timestamp::now();
        let expires_at = created_at
            .checked_add(Duration::from_secs(ttl_seconds))
            .ok_or(ExecutorError::InvalidTtl(ttl_seconds))?;

        let id = Uuid::new_v4().to_string();
        let grant = ActionGrant {
            grant_id: GrantId::new(id.clone()),
            session_id: session.session_id.clone(),
            resolution_id,
            action_id: action_id.clone(),
            parameters: parameters.clone(),
            parameters_schema,
            constraints,
            requires_approval,
            created_at,
            expires_at,
            consumed: false,
        };
        self.store.save_grant(&grant).await?;

        let parameters_hash =
            hash_canonical_json_numeric_normalized(HashAlgorithm::Sha256, &parameters)?.value;
        let execution = ActionExecution {
            execution_id: ExecutionId::new(id),
            grant_id: grant.grant_id.clone(),
            session_id: session.session_id.clone(),
            action_id,
            state: ExecutionState::Pending,
            parameters_hash,
            result_hash: None,
            result: None,
            failure_reason: None,
            created_at,
            started_at: None,
            finished_at: None,
        };
        self.store.save_execution(&execution).await?;

        self.emit(
            &session,
            "action.granted",
            Severity::Info,
            json!({
                "grant_id": grant.grant_id.clone(),
                "action_id": grant.action_id.clone(),
                "requires_approval": grant.requires_approval,
            }),
        );

        Ok(grant)
    }

    /// Records that a grant requiring approval is now awaiting a human
    /// decision, and returns the approval request descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ActionNotFound`] for an unknown grant,
    /// [`ExecutorError::ApprovalNotRequired`] if the grant never required
    /// approval, and [`ExecutorError::InvalidState`] if its execution has
    /// already left [`ExecutionState::Pending`].
    pub async fn request_approval(&self, grant_id: &GrantId) -> Result<ApprovalRequest, ExecutorError> {
        let grant = self.load_grant(grant_id).await?;
        if !grant.requires_approval {
            return Err(ExecutorError::ApprovalNotRequired(grant_id.as_str().to_string()));
        }
        let execution = self.load_execution_for_grant(grant_id).await?;
        if execution.state != ExecutionState::Pending {
            return Err(ExecutorError::InvalidState {
                grant_id: grant_id.as_str().to_string(),
                expected: ExecutionState::Pending,
                actual: execution.state,
            });
        }

        let requested_at = Timestamp::now();
        let session = self.sessions.get(&grant.session_id).await?;
        self.emit(
            &session,
            "action.approval_requested",
            Severity::Info,
            json!({"grant_id": grant.grant_id.clone()}),
        );

        Ok(ApprovalRequest {
            grant_id: grant.grant_id,
            requested_approver: None,
            requested_at,
        })
    }

    /// Approves a grant awaiting approval, moving its execution from
    /// `Pending` to [`ExecutionState::Approved`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ActionNotFound`] for an unknown grant and
    /// [`ExecutorError::InvalidState`] if its execution is not `Pending`.
    pub async fn approve(
        &self,
        grant_id: &GrantId,
        approver: Option<PrincipalId>,
    ) -> Result<ActionExecution, ExecutorError> {
        let grant = self.load_grant(grant_id).await?;
        let mut execution = self.load_execution_for_grant(grant_id).await?;
        if execution.state != ExecutionState::Pending {
            return Err(ExecutorError::InvalidState {
                grant_id: grant_id.as_str().to_string(),
                expected: ExecutionState::Pending,
                actual: execution.state,
            });
        }
        execution.state = ExecutionState::Approved;
        self.store.save_execution(&execution).await?;

        let session = self.sessions.get(&grant.session_id).await?;
        self.emit(
            &session,
            "action.approved",
            Severity::Info,
            json!({"grant_id": grant.grant_id, "approver": approver}),
        );

        Ok(execution)
    }

    /// Rejects a grant awaiting approval, moving its execution from
    /// `Pending` to the terminal [`ExecutionState::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ActionNotFound`] for an unknown grant and
    /// [`ExecutorError::InvalidState`] if its execution is not `Pending`.
    pub async fn reject(
        &self,
        grant_id: &GrantId,
        reason: String,
    ) -> Result<ActionExecution, ExecutorError> {
        let grant = self.load_grant(grant_id).await?;
        let mut execution = self.load_execution_for_grant(grant_id).await?;
        if execution.state != ExecutionState::Pending {
            return Err(ExecutorError::InvalidState {
                grant_id: grant_id.as_str().to_string(),
                expected: ExecutionState::Pending,
                actual: execution.state,
            });
        }
        execution.state = ExecutionState::Rejected;
        execution.failure_reason = Some(reason.clone());
        execution.finished_at = Some(Timestamp::now());
        self.store.save_execution(&execution).await?;

        let session = self.sessions.get(&grant.session_id).await?;
        self.emit(
            &session,
            "action.rejected",
            Severity::Warn,
            json!({"grant_id": grant.grant_id, "reason": reason}),
        );

        Ok(execution)
    }

    /// Dispatches a previously granted action, running the four
    /// pre-execution checks (grant exists, unexpired, approved if required,
    /// parameters valid against schema) before handing off to the
    /// registered handler under `request.timeout_millis` (default
    /// [`DEFAULT_EXECUTE_TIMEOUT_MILLIS`]).
    ///
    /// A handler failure, timeout, or schema validation failure resolves to
    /// [`ExecutionState::Failed`] and is still returned as `Ok`; this
    /// function only returns `Err` for the procedural checks that precede
    /// dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ActionNotFound`], [`ExecutorError::ActionExpired`],
    /// [`ExecutorError::ActionNotApproved`], or [`ExecutorError::InvalidState`]
    /// when the grant cannot be dispatched in its current state.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, ExecutorError> {
        let grant = self.load_grant(&request.grant_id).await?;
        let now = Timestamp::now();
        if !grant.is_usable_at(now) {
            return Err(ExecutorError::ActionExpired(grant.grant_id.as_str().to_string()));
        }

        let mut execution = self.load_execution_for_grant(&grant.grant_id).await?;
        if grant.requires_approval {
            if execution.state != ExecutionState::Approved {
                return Err(ExecutorError::ActionNotApproved(grant.grant_id.as_str().to_string()));
            }
        } else if execution.state != ExecutionState::Pending {
            return Err(ExecutorError::InvalidState {
                grant_id: grant.grant_id.as_str().to_string(),
                expected: ExecutionState::Pending,
                actual: execution.state,
            });
        }

        let session = self.sessions.get(&grant.session_id).await?;

        if let Err(reason) = validate_parameters(&grant.parameters, &grant.parameters_schema) {
            return self.fail(&session, &grant, execution, "validation", reason).await;
        }
        self.mark_consumed(&grant).await?;

        execution.state = ExecutionState::Running;
        execution.started_at = Some(now);
        self.store.save_execution(&execution).await?;
        self.emit(
            &session,
            "action.invoked",
            Severity::Info,
            json!({"grant_id": grant.grant_id.clone(), "action_id": grant.action_id.clone()}),
        );

        let timeout_millis = request.timeout_millis.unwrap_or(DEFAULT_EXECUTE_TIMEOUT_MILLIS);
        let handler = self.handler_for(&grant.action_id);
        let dispatch = tokio::time::timeout(
            Duration::from_millis(timeout_millis),
            handler.handle(&grant.action_id, &grant.parameters),
        )
        .await;

        match dispatch {
            Ok(Ok(mut result)) => {
                redact_fields(&mut result, &grant.constraints.redact_fields);
                let result_hash =
                    hash_canonical_json_numeric_normalized(HashAlgorithm::Sha256, &result)?.value;
                execution.state = ExecutionState::Completed;
                execution.result = Some(result);
                execution.result_hash = Some(result_hash);
                execution.finished_at = Some(Timestamp::now());
                self.store.save_execution(&execution).await?;
                let _ = self.sessions.increment_action_count(&session.session_id, false).await;
                self.emit(
                    &session,
                    "action.completed",
                    Severity::Info,
                    json!({
                        "grant_id": grant.grant_id.clone(),
                        "execution_id": execution.execution_id.clone(),
                        "duration_ms": execution.duration_millis(),
                    }),
                );
                Ok(ExecuteResponse { execution })
            }
            Ok(Err(err)) => self.fail(&session, &grant, execution, "handler", err.to_string()).await,
            Err(_) => {
                let reason = format!("action {:?} timed out after {timeout_millis}ms", grant.action_id);
                self.fail(&session, &grant, execution, "timeout", reason).await
            }
        }
    }

    /// Loads an execution record by id.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ActionNotFound`] when no such execution
    /// exists, and [`ExecutorError::Store`] on a backend read failure.
    pub async fn get_execution(&self, execution_id: &ExecutionId) -> Result<ActionExecution, ExecutorError> {
        self.store
            .load_execution(execution_id)
            .await?
            .ok_or_else(|| ExecutorError::ActionNotFound(execution_id.as_str().to_string()))
    }

    /// Lists grants that require approval and whose execution is still
    /// awaiting one, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Store`] on a backend read failure.
    pub async fn list_pending_approvals(&self) -> Result<Vec<ActionGrant>, ExecutorError> {
        let candidates = self.store.list_pending_approvals().await?;
        let mut pending = Vec::with_capacity(candidates.len());
        for grant in candidates {
            if !grant.requires_approval {
                continue;
            }
            if let Ok(execution) = self.load_execution_for_grant(&grant.grant_id).await {
                if execution.state == ExecutionState::Pending {
                    pending.push(grant);
                }
            }
        }
        Ok(pending)
    }

    async fn load_grant(&self, grant_id: &GrantId) -> Result<ActionGrant, ExecutorError> {
        self.store
            .load_grant(grant_id)
            .await?
            .ok_or_else(|| ExecutorError::ActionNotFound(grant_id.as_str().to_string()))
    }

    async fn load_execution_for_grant(&self, grant_id: &GrantId) -> Result<ActionExecution, ExecutorError> {
        let execution_id = ExecutionId::new(grant_id.as_str().to_string());
        self.store
            .load_execution(&execution_id)
            .await?
            .ok_or_else(|| ExecutorError::ActionNotFound(grant_id.as_str().to_string()))
    }

    async fn mark_consumed(&self, grant: &ActionGrant) -> Result<(), ExecutorError> {
        let mut consumed = grant.clone();
        consumed.consumed = true;
        self.store.save_grant(&consumed).await?;
        Ok(())
    }

    async fn fail(
        &self,
        session: &Session,
        grant: &ActionGrant,
        mut execution: ActionExecution,
        error_type: &str,
        reason: String,
    ) -> Result<ExecuteResponse, ExecutorError> {
        execution.state = ExecutionState::Failed;
        execution.failure_reason = Some(reason.clone());
        execution.finished_at = Some(Timestamp::now());
        self.store.save_execution(&execution).await?;
        self.mark_consumed(grant).await?;
        let _ = self.sessions.increment_action_count(&session.session_id, true).await;
        self.emit(
            session,
            "action.failed",
            Severity::Warn,
            json!({
                "grant_id": grant.grant_id.clone(),
                "error_type": error_type,
                "reason": reason,
            }),
        );
        Ok(ExecuteResponse { execution })
    }

    fn handler_for(&self, action_id: &str) -> Arc<dyn ActionHandler> {
        self.handlers
            .lock()
            .ok()
            .and_then(|handlers| handlers.get(action_id).cloned())
            .unwrap_or_else(|| Arc::new(PassthroughHandler))
    }

    fn emit(&self, session: &Session, event_suffix: &str, severity: Severity, payload: Value) {
        let _ = self.bus.publish(TraceEvent {
            trace_version: crate::core::TRACE_VERSION.to_string(),
            event_type: event_type(event_suffix),
            time: Timestamp::now(),
            trace: TraceContext {
                trace_id: session.trace_id.clone(),
                span_id: SpanId::new(Uuid::new_v4().to_string()),
                parent_span_id: None,
            },
            session_id: session.session_id.clone(),
            atlas: None,
            actor: Actor::runtime(),
            severity,
            payload,
            artifacts: vec![],
        });
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use super::*;
    use crate::core::Principal;
    use crate::core::PrincipalKind;
    use crate::core::TraceId;
    use crate::runtime::bus::InMemoryEventBus;
    use crate::runtime::store::InMemoryStore;

    fn harness() -> (Arc<SessionManager>, Executor) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new(16));
        let sessions = Arc::new(SessionManager::new(store.clone(), bus.clone()));
        let executor = Executor::new(sessions.clone(), store, bus);
        (sessions, executor)
    }

    async fn seeded_session(sessions: &SessionManager) -> SessionId {
        let session = sessions
            .create(
                SessionId::new("s1"),
                TraceId::new("t1"),
                Principal {
                    kind: PrincipalKind::Agent,
                    id: PrincipalId::new("agent-1"),
                    org_id: None,
                },
                vec!["carp.execute".to_string()],
                3600,
            )
            .await
            .expect("create session");
        session.session_id
    }

    #[tokio::test]
    async fn grant_creates_a_matching_pending_execution() {
        let (sessions, executor) = harness();
        let session_id = seeded_session(&sessions).await;
        let grant = executor
            .grant(
                session_id,
                ResolutionId::new("r1"),
                "cra.echo".to_string(),
                json!({"text": "hi"}),
                Value::Null,
                PolicyConstraints::default(),
                false,
                300,
            )
            .await
            .expect("grant");

        let execution_id = ExecutionId::new(grant.grant_id.as_str().to_string());
        let execution = executor.get_execution(&execution_id).await.expect("execution");
        assert_eq!(execution.state, ExecutionState::Pending);
        assert_eq!(execution.grant_id, grant.grant_id);
    }

    #[tokio::test]
    async fn execute_without_approval_dispatches_to_the_passthrough_handler() {
        let (sessions, executor) = harness();
        let session_id = seeded_session(&sessions).await;
        let grant = executor
            .grant(
                session_id,
                ResolutionId::new("r1"),
                "cra.echo".to_string(),
                json!({"text": "hi"}),
                Value::Null,
                PolicyConstraints::default(),
                false,
                300,
            )
            .await
            .expect("grant");

        let response = executor
            .execute(ExecuteRequest {
                grant_id: grant.grant_id,
                timeout_millis: None,
            })
            .await
            .expect("execute");
        assert_eq!(response.execution.state, ExecutionState::Completed);
        assert!(response.execution.result_hash.is_some());
    }

    #[tokio::test]
    async fn execute_fails_without_approval_when_policy_requires_it() {
        let (sessions, executor) = harness();
        let session_id = seeded_session(&sessions).await;
        let grant = executor
            .grant(
                session_id,
                ResolutionId::new("r1"),
                "cra.deploy".to_string(),
                json!({}),
                Value::Null,
                PolicyConstraints::default(),
                true,
                300,
            )
            .await
            .expect("grant");

        let result = executor
            .execute(ExecuteRequest {
                grant_id: grant.grant_id,
                timeout_millis: None,
            })
            .await;
        assert!(matches!(result, Err(ExecutorError::ActionNotApproved(_))));
    }

    #[tokio::test]
    async fn approve_then_execute_runs_to_completion() {
        let (sessions, executor) = harness();
        let session_id = seeded_session(&sessions).await;
        let grant = executor
            .grant(
                session_id,
                ResolutionId::new("r1"),
                "cra.deploy".to_string(),
                json!({}),
                Value::Null,
                PolicyConstraints::default(),
                true,
                300,
            )
            .await
            .expect("grant");

        executor.approve(&grant.grant_id, None).await.expect("approve");
        let response = executor
            .execute(ExecuteRequest {
                grant_id: grant.grant_id,
                timeout_millis: None,
            })
            .await
            .expect("execute");
        assert_eq!(response.execution.state, ExecutionState::Completed);
    }

    #[tokio::test]
    async fn execute_fails_validation_when_a_required_field_is_missing() {
        let (sessions, executor) = harness();
        let session_id = seeded_session(&sessions).await;
        let grant = executor
            .grant(
                session_id,
                ResolutionId::new("r1"),
                "cra.echo".to_string(),
                json!({}),
                json!({"type": "object", "required": ["text"]}),
                PolicyConstraints::default(),
                false,
                300,
            )
            .await
            .expect("grant");

        let response = executor
            .execute(ExecuteRequest {
                grant_id: grant.grant_id,
                timeout_millis: None,
            })
            .await
            .expect("execute");
        assert_eq!(response.execution.state, ExecutionState::Failed);
        assert!(response.execution.failure_reason.is_some());
    }

    #[tokio::test]
    async fn list_pending_approvals_only_returns_grants_awaiting_approval() {
        let (sessions, executor) = harness();
        let session_id = seeded_session(&sessions).await;
        let awaiting = executor
            .grant(
                session_id.clone(),
                ResolutionId::new("r1"),
                "cra.deploy".to_string(),
                json!({}),
                Value::Null,
                PolicyConstraints::default(),
                true,
                300,
            )
            .await
            .expect("grant awaiting");
        executor
            .grant(
                session_id,
                ResolutionId::new("r1"),
                "cra.echo".to_string(),
                json!({}),
                Value::Null,
                PolicyConstraints::default(),
                false,
                300,
            )
            .await
            .expect("grant not awaiting");

        let pending = executor.list_pending_approvals().await.expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].grant_id, awaiting.grant_id);
    }
}
