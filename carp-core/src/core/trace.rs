// carp-core/src/core/trace.rs
// ============================================================================
// Module: CARP Runtime Trace Events
// Description: The immutable, append-only TRACE event record.
// Purpose: Define the canonical event shape emitted by every runtime component.
// Dependencies: crate::core::{identifiers, time}, serde, serde_json
// ============================================================================

//! ## Overview
//! A trace event is immutable once appended: "if it wasn't emitted by the
//! runtime, it didn't happen." Every component (C2 through C6) emits through
//! the Telemetry Bus (C1), never by any other channel, and every event
//! carries the `trace.` event-type prefix.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::AtlasId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::SpanId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

/// Version tag stamped on every trace event, per the wire contract.
pub const TRACE_VERSION: &str = "1.0";

// ============================================================================
// SECTION: Trace Context
// ============================================================================

/// The trace/span coordinates of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    /// Root trace identifier.
    pub trace_id: TraceId,
    /// Span identifier for this event.
    pub span_id: SpanId,
    /// Parent span, if this event is a child of another span.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_span_id: Option<SpanId>,
}

/// Reference to the Atlas active when an event was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasRef {
    /// Atlas identifier.
    pub id: AtlasId,
    /// Atlas semantic version.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<String>,
}

// ============================================================================
// SECTION: Actor
// ============================================================================

/// Kind of actor responsible for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    /// The runtime itself (e.g. lazy expiry, internal bookkeeping).
    Runtime,
    /// An autonomous agent.
    Agent,
    /// A human user.
    User,
    /// A dispatched tool/handler.
    Tool,
}

/// The actor responsible for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Kind of actor.
    #[serde(rename = "type")]
    pub kind: ActorKind,
    /// Opaque actor identifier.
    pub id: String,
}

impl Actor {
    /// The canonical actor used for events the runtime emits on its own
    /// behalf (lazy expiry, internal bookkeeping), rather than in direct
    /// response to a caller's request.
    #[must_use]
    pub fn runtime() -> Self {
        Self {
            kind: ActorKind::Runtime,
            id: "runtime".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Severity
// ============================================================================

/// Severity of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Diagnostic detail, not normally surfaced.
    Debug,
    /// Routine informational event.
    Info,
    /// Unexpected but non-fatal condition.
    Warn,
    /// A failure.
    Error,
}

// ============================================================================
// SECTION: Artifacts
// ============================================================================

/// A content-addressed artifact attached to a trace event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventArtifact {
    /// Human-readable artifact name.
    pub name: String,
    /// URI where the artifact content can be retrieved.
    pub uri: String,
    /// Lowercase hex SHA-256 digest of the artifact content (64 chars).
    pub sha256: String,
    /// Content type of the artifact.
    pub content_type: String,
}

/// Error returned when an artifact's declared hash does not match the
/// expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArtifactShapeError {
    /// `sha256` was not 64 lowercase hex characters.
    #[error("artifact sha256 must be 64 lowercase hex characters, got {0:?}")]
    InvalidSha256(String),
}

/// Validates that `sha256` is 64 lowercase hex characters.
///
/// # Errors
///
/// Returns [`ArtifactShapeError::InvalidSha256`] otherwise.
pub fn validate_sha256(sha256: &str) -> Result<(), ArtifactShapeError> {
    let valid = sha256.len() == 64
        && sha256.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
    if valid {
        Ok(())
    } else {
        Err(ArtifactShapeError::InvalidSha256(sha256.to_string()))
    }
}

// ============================================================================
// SECTION: Trace Event
// ============================================================================

/// An immutable trace event.
///
/// # Invariants
/// - Once appended, never altered or reordered within its trace.
/// - `event_type` is always prefixed `trace.`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Trace wire-format version.
    pub trace_version: String,
    /// Dotted event type, always prefixed `trace.`.
    pub event_type: String,
    /// UTC time the event was constructed.
    pub time: Timestamp,
    /// Trace/span coordinates.
    pub trace: TraceContext,
    /// Owning session.
    pub session_id: SessionId,
    /// Atlas active at emission time, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub atlas: Option<AtlasRef>,
    /// Actor responsible for the event.
    pub actor: Actor,
    /// Event severity.
    pub severity: Severity,
    /// Opaque event payload.
    #[serde(default = "empty_object")]
    pub payload: Value,
    /// Attached artifacts.
    #[serde(default)]
    pub artifacts: Vec<EventArtifact>,
}

/// Default payload value (`{}`) for events constructed without one.
fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Prefixes an event-type suffix with the mandatory `trace.` namespace.
#[must_use]
pub fn event_type(suffix: &str) -> String {
    format!("trace.{suffix}")
}
