// carp-core/src/interfaces/mod.rs
// ============================================================================
// Module: CARP Runtime Interfaces
// Description: Backend-agnostic interfaces for persistence, dispatch, and
//              event distribution.
// Purpose: Define the contract surfaces the runtime components depend on,
//          so storage and handler backends are swappable without touching
//          component logic.
// Dependencies: crate::core, async-trait, tokio, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the runtime integrates with external systems
//! without embedding backend-specific details into the components
//! themselves. Implementations must be deterministic where the contract
//! requires it and must fail closed on missing or invalid data rather than
//! silently defaulting.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::Receiver;

use crate::core::ActionExecution;
use crate::core::ActionGrant;
use crate::core::ExecutionId;
use crate::core::GrantId;
use crate::core::Session;
use crate::core::SessionId;
use crate::core::TraceEvent;
use crate::core::TraceId;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Persistence errors common to every [`Store`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend's I/O layer reported an error.
    #[error("store io error: {0}")]
    Io(String),
    /// Stored data failed an integrity check (hash mismatch, truncated
    /// record).
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Stored data was written by an incompatible schema version.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// The caller supplied invalid data.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// A backend-specific error not covered by the other variants.
    #[error("store error: {0}")]
    Backend(String),
}

/// Durable persistence for sessions, trace events, grants, and executions.
///
/// Atlas bundles are intentionally excluded: they are cached in memory by
/// the Atlas Registry and reloaded from their source directory on restart,
/// never written through this trait.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persists a session, overwriting any existing record with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn save_session(&self, session: &Session) -> Result<(), StoreError>;

    /// Loads a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails for a reason other than
    /// the session not existing.
    async fn load_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Appends one trace event. Trace events are append-only: a backend
    /// must never accept a call that would alter or remove a previously
    /// appended event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the append fails.
    async fn append_trace_event(&self, event: &TraceEvent) -> Result<(), StoreError>;

    /// Loads every event recorded for a trace, in append order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn load_trace_events(&self, trace_id: &TraceId) -> Result<Vec<TraceEvent>, StoreError>;

    /// Persists an action grant, overwriting any existing record with the
    /// same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn save_grant(&self, grant: &ActionGrant) -> Result<(), StoreError>;

    /// Loads an action grant by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails for a reason other than
    /// the grant not existing.
    async fn load_grant(&self, grant_id: &GrantId) -> Result<Option<ActionGrant>, StoreError>;

    /// Lists every grant awaiting approval, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_pending_approvals(&self) -> Result<Vec<ActionGrant>, StoreError>;

    /// Persists an action execution, overwriting any existing record with
    /// the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn save_execution(&self, execution: &ActionExecution) -> Result<(), StoreError>;

    /// Loads an action execution by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails for a reason other than
    /// the execution not existing.
    async fn load_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<ActionExecution>, StoreError>;
}

// ============================================================================
// SECTION: Action Handler
// ============================================================================

/// Errors raised while dispatching an action to a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler is registered for the requested action id.
    #[error("no handler registered for action {0:?}")]
    NotFound(String),
    /// The handler rejected the supplied parameters.
    #[error("invalid parameters for action {action_id:?}: {reason}")]
    InvalidParameters {
        /// Action identifier that rejected the parameters.
        action_id: String,
        /// Human-readable rejection reason.
        reason: String,
    },
    /// Dispatch exceeded its allotted timeout.
    #[error("action {0:?} timed out")]
    Timeout(String),
    /// The handler itself failed.
    #[error("action {action_id:?} failed: {reason}")]
    Failed {
        /// Action identifier that failed.
        action_id: String,
        /// Human-readable failure reason.
        reason: String,
    },
}

/// Dispatches action executions to their concrete implementation (a tool
/// call, MCP call, CLI command, or agent tool).
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Executes the named action with the given parameters and returns its
    /// raw result payload.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the action is unknown, the parameters
    /// are invalid, or execution fails.
    async fn handle(&self, action_id: &str, parameters: &Value) -> Result<Value, HandlerError>;
}

// ============================================================================
// SECTION: Telemetry Bus
// ============================================================================

/// Errors raised while publishing to the telemetry bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// No subscriber accepted the event; with a bounded, drop-on-overflow
    /// bus this is an expected, non-fatal outcome, not necessarily an
    /// error the caller must act on.
    #[error("telemetry bus has no capacity for trace event")]
    NoCapacity,
}

/// Publishes trace events and hands out subscriber channels, decoupling
/// event producers (C2 through C6) from event consumers (persistence,
/// external sinks).
pub trait EventBus: Send + Sync {
    /// Publishes one event to every current subscriber. A subscriber whose
    /// channel is full has the event dropped for it rather than blocking
    /// the publisher; this never returns [`BusError`] for that reason.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoCapacity`] only when there are no subscribers
    /// at all capable of accepting the event.
    fn publish(&self, event: TraceEvent) -> Result<(), BusError>;

    /// Registers a new subscriber and returns its receiving end.
    fn subscribe(&self) -> Receiver<TraceEvent>;
}
