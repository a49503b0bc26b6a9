// carp-core/src/core/session.rs
// ============================================================================
// Module: CARP Runtime Session Model
// Description: Authenticated interaction contexts rooted in a trace id.
// Purpose: Define the Session aggregate owned exclusively by the Session & Trace Manager.
// Dependencies: crate::core::{identifiers, time}, serde
// ============================================================================

//! ## Overview
//! A session is an authenticated interaction context: it owns exactly one
//! root trace id, a set of granted scopes, and a state that advances
//! monotonically from `active` to a terminal state (`expired` or `ended`).
//! Sessions are never mutated in place once terminal; storage retention is
//! the only thing that ever removes one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::SessionId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Principal
// ============================================================================

/// Kind of authenticated principal interacting with the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// A human user.
    User,
    /// A service account.
    Service,
    /// An autonomous agent.
    Agent,
}

/// An authenticated identity, opaque to the session/policy core beyond
/// kind, id, and organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Kind of principal.
    pub kind: PrincipalKind,
    /// Opaque principal identifier.
    pub id: PrincipalId,
    /// Optional owning organization.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub org_id: Option<String>,
}

// ============================================================================
// SECTION: Session Lifecycle
// ============================================================================

/// Lifecycle state of a session.
///
/// # Invariants
/// - Transitions are monotonic: `Active` may move to `Expired` or `Ended`;
///   neither terminal state transitions further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session accepts downstream operations.
    Active,
    /// Session's TTL elapsed; discovered lazily on the next read.
    Expired,
    /// Session was explicitly ended.
    Ended,
}

/// Monotone counters tracked for a session over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    /// Number of resolutions performed in this session.
    pub resolutions: u64,
    /// Number of actions successfully executed.
    pub actions_executed: u64,
    /// Number of actions that failed.
    pub actions_failed: u64,
    /// Total trace events emitted for this session.
    pub total_events: u64,
}

/// An authenticated interaction context rooted in one trace id.
///
/// # Invariants
/// - `expires_at > created_at`.
/// - `state` advances monotonically `Active` → `Expired` or `Active` → `Ended`.
/// - Once non-active, no further downstream operations are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub session_id: SessionId,
    /// Root trace identifier for this session.
    pub trace_id: TraceId,
    /// Authenticated principal owning the session.
    pub principal: Principal,
    /// Scopes granted to this session.
    pub scopes: Vec<String>,
    /// Current lifecycle state.
    pub state: SessionState,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Expiry timestamp (exclusive upper bound on activity).
    pub expires_at: Timestamp,
    /// Timestamp the session was explicitly ended, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ended_at: Option<Timestamp>,
    /// Monotone counters.
    pub counters: SessionCounters,
}

impl Session {
    /// Returns whether the session is still accepting downstream operations
    /// as of `now`, without mutating state (pure check; lazy-expiry
    /// transition is the Session Manager's job, not this type's).
    #[must_use]
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.state == SessionState::Active && now < self.expires_at
    }
}

/// Minimum allowed session TTL, in seconds (60 s).
pub const MIN_SESSION_TTL_SECONDS: u64 = 60;
/// Maximum allowed session TTL, in seconds (1 day).
pub const MAX_SESSION_TTL_SECONDS: u64 = 86_400;

/// Summary returned when a session ends, either explicitly or by lazy expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: SessionId,
    /// Timestamp the session ended.
    pub ended_at: Timestamp,
    /// Reason the session ended.
    pub reason: SessionEndReason,
    /// Counter snapshot at the time of ending.
    pub counters: SessionCounters,
}

/// Why a session transitioned to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Ended explicitly via the `end` operation.
    Ended,
    /// Expired lazily on first read after `expires_at`.
    Expired,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal {
            kind: PrincipalKind::Agent,
            id: PrincipalId::new("agent-1"),
            org_id: None,
        }
    }

    #[test]
    fn is_active_at_respects_state_and_expiry() {
        let created = Timestamp::parse("2026-01-01T00:00:00Z").expect("created");
        let expires = Timestamp::parse("2026-01-01T01:00:00Z").expect("expires");
        let session = Session {
            session_id: SessionId::new("s1"),
            trace_id: TraceId::new("t1"),
            principal: principal(),
            scopes: vec!["carp.resolve".to_string()],
            state: SessionState::Active,
            created_at: created,
            expires_at: expires,
            ended_at: None,
            counters: SessionCounters::default(),
        };

        let before_expiry = Timestamp::parse("2026-01-01T00:30:00Z").expect("before");
        let after_expiry = Timestamp::parse("2026-01-01T02:00:00Z").expect("after");
        assert!(session.is_active_at(before_expiry));
        assert!(!session.is_active_at(after_expiry));
    }
}
