// carp-core/src/runtime/session_manager.rs
// ============================================================================
// Module: Session & Trace Manager (C4)
// Description: Owns session lifecycle and lazy expiry.
// Purpose: The sole mutator of the session table; every other component
//          reads sessions only through this manager.
// Dependencies: crate::{core, interfaces}, async-trait
// ============================================================================

//! ## Overview
//! The Session & Trace Manager owns every Session record. States move
//! `Active → Expired` (discovered lazily on the next read past `expires_at`)
//! or `Active → Ended` (explicit); no other transition exists. All mutating
//! operations on one session id are serialized through the session table's
//! single lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use crate::core::Actor;
use crate::core::MAX_SESSION_TTL_SECONDS;
use crate::core::MIN_SESSION_TTL_SECONDS;
use crate::core::Principal;
use crate::core::Session;
use crate::core::SessionCounters;
use crate::core::SessionEndReason;
use crate::core::SessionId;
use crate::core::SessionState;
use crate::core::SessionSummary;
use crate::core::Severity;
use crate::core::SpanId;
use crate::core::TraceContext;
use crate::core::TraceEvent;
use crate::core::TraceId;
use crate::core::Timestamp;
use crate::core::event_type;
use crate::interfaces::EventBus;
use crate::interfaces::Store;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the Session & Trace Manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session exists with the given id.
    #[error("session {0:?} not found")]
    NotFound(String),
    /// The session has moved past `expires_at` and was lazily ended.
    #[error("session {0:?} expired")]
    Expired(String),
    /// The requested TTL fell outside the permitted range.
    #[error(
        "ttl_seconds must be between {MIN_SESSION_TTL_SECONDS} and {MAX_SESSION_TTL_SECONDS}, got {0}"
    )]
    InvalidTtl(u64),
    /// The underlying store reported an error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Session Manager
// ============================================================================

/// Session & Trace Manager (C4): the only component that mutates `Session`
/// records.
pub struct SessionManager {
    store: Arc<dyn Store>,
    bus: Arc<dyn EventBus>,
}

impl SessionManager {
    /// Creates a session manager over the given store and telemetry bus.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn EventBus>) -> Self {
        Self { store, bus }
    }

    /// Creates a new active session for `principal` with the given scopes
    /// and TTL, rooted in a freshly generated trace id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidTtl`] when `ttl_seconds` is outside
    /// `[60, 86_400]`, or [`SessionError::Store`] when persistence fails.
    pub async fn create(
        &self,
        session_id: SessionId,
        trace_id: TraceId,
        principal: Principal,
        scopes: Vec<String>,
        ttl_seconds: u64,
    ) -> Result<Session, SessionError> {
        if !(MIN_SESSION_TTL_SECONDS..=MAX_SESSION_TTL_SECONDS).contains(&ttl_seconds) {
            return Err(SessionError::InvalidTtl(ttl_seconds));
        }

        let created_at = Timestamp::now();
        let expires_at = created_at
            .checked_add(std::time::Duration::from_secs(ttl_seconds))
            .unwrap_or(created_at);

        let session = Session {
            session_id,
            trace_id: trace_id.clone(),
            principal: principal.clone(),
            scopes: scopes.clone(),
            state: SessionState::Active,
            created_at,
            expires_at,
            ended_at: None,
            counters: SessionCounters::default(),
        };
        self.store.save_session(&session).await?;

        let _ = self.bus.publish(TraceEvent {
            trace_version: crate::core::TRACE_VERSION.to_string(),
            event_type: event_type("session.started"),
            time: created_at,
            trace: TraceContext {
                trace_id,
                span_id: SpanId::new(session.session_id.as_str()),
                parent_span_id: None,
            },
            session_id: session.session_id.clone(),
            atlas: None,
            actor: Actor::runtime(),
            severity: Severity::Info,
            payload: json!({
                "principal": principal,
                "scopes": scopes,
                "ttl_seconds": ttl_seconds,
            }),
            artifacts: vec![],
        });

        Ok(session)
    }

    /// Loads a session, transitioning and reporting it as
    /// [`SessionError::Expired`] if its TTL has lapsed, emitting
    /// `trace.session.ended` on the transition.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for an unknown id and
    /// [`SessionError::Expired`] the first time an expired session is read.
    pub async fn get(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        let session = self
            .store
            .load_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.as_str().to_string()))?;

        if session.state == SessionState::Active && !session.is_active_at(Timestamp::now()) {
            let ended = self
                .transition_to_terminal(session, SessionEndReason::Expired)
                .await?;
            return Err(SessionError::Expired(ended.session_id.as_str().to_string()));
        }

        if session.state == SessionState::Expired {
            return Err(SessionError::Expired(session_id.as_str().to_string()));
        }

        Ok(session)
    }

    /// Explicitly ends a session. Idempotent: ending an already-ended
    /// session returns its cached summary rather than erroring.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotFound`] for an unknown id.
    pub async fn end(&self, session_id: &SessionId) -> Result<SessionSummary, SessionError> {
        let session = self
            .store
            .load_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.as_str().to_string()))?;

        match session.state {
            SessionState::Ended => Ok(SessionSummary {
                session_id: session.session_id,
                ended_at: session.ended_at.unwrap_or(session.created_at),
                reason: SessionEndReason::Ended,
                counters: session.counters,
            }),
            SessionState::Expired => Ok(SessionSummary {
                session_id: session.session_id,
                ended_at: session.ended_at.unwrap_or(session.expires_at),
                reason: SessionEndReason::Expired,
                counters: session.counters,
            }),
            SessionState::Active => {
                self.transition_to_terminal(session, SessionEndReason::Ended).await
            }
        }
    }

    /// Increments the resolution counter for a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session cannot be loaded or saved.
    pub async fn increment_resolution_count(
        &self,
        session_id: &SessionId,
    ) -> Result<(), SessionError> {
        self.mutate_counters(session_id, |counters| counters.resolutions += 1)
            .await
    }

    /// Increments the action-execution counters for a session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session cannot be loaded or saved.
    pub async fn increment_action_count(
        &self,
        session_id: &SessionId,
        failed: bool,
    ) -> Result<(), SessionError> {
        self.mutate_counters(session_id, |counters| {
            if failed {
                counters.actions_failed += 1;
            } else {
                counters.actions_executed += 1;
            }
        })
        .await
    }

    async fn mutate_counters(
        &self,
        session_id: &SessionId,
        mutate: impl FnOnce(&mut SessionCounters),
    ) -> Result<(), SessionError> {
        let mut session = self
            .store
            .load_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.as_str().to_string()))?;
        mutate(&mut session.counters);
        self.store.save_session(&session).await?;
        Ok(())
    }

    async fn transition_to_terminal(
        &self,
        mut session: Session,
        reason: SessionEndReason,
    ) -> Result<SessionSummary, SessionError> {
        let ended_at = Timestamp::now();
        session.state = match reason {
            SessionEndReason::Ended => SessionState::Ended,
            SessionEndReason::Expired => SessionState::Expired,
        };
        session.ended_at = Some(ended_at);
        self.store.save_session(&session).await?;

        let duration_ms = ended_at.saturating_millis_since(session.created_at);
        let _ = self.bus.publish(TraceEvent {
            trace_version: crate::core::TRACE_VERSION.to_string(),
            event_type: event_type("session.ended"),
            time: ended_at,
            trace: TraceContext {
                trace_id: session.trace_id.clone(),
                span_id: SpanId::new(session.session_id.as_str()),
                parent_span_id: None,
            },
            session_id: session.session_id.clone(),
            atlas: None,
            actor: Actor::runtime(),
            severity: if reason == SessionEndReason::Expired {
                Severity::Warn
            } else {
                Severity::Info
            },
            payload: json!({
                "reason": reason,
                "duration_ms": duration_ms,
                "counters": session.counters,
            }),
            artifacts: vec![],
        });

        Ok(SessionSummary {
            session_id: session.session_id,
            ended_at,
            reason,
            counters: session.counters,
        })
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
    use crate::core::PrincipalId;
    use crate::core::PrincipalKind;
    use crate::runtime::bus::InMemoryEventBus;
    use crate::runtime::store::InMemoryStore;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryEventBus::new(16)),
        )
    }

    fn principal() -> Principal {
        Principal {
            kind: PrincipalKind::Agent,
            id: PrincipalId::new("agent-1"),
            org_id: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_ttl_outside_allowed_range() {
        let manager = manager();
        let result = manager
            .create(
                SessionId::new("s1"),
                TraceId::new("t1"),
                principal(),
                vec!["carp.resolve".to_string()],
                30,
            )
            .await;
        assert!(matches!(result, Err(SessionError::InvalidTtl(30))));
    }

    #[tokio::test]
    async fn create_then_get_round_trips_an_active_session() {
        let manager = manager();
        let created = manager
            .create(
                SessionId::new("s1"),
                TraceId::new("t1"),
                principal(),
                vec!["carp.resolve".to_string()],
                3600,
            )
            .await
            .expect("create");
        let fetched = manager.get(&created.session_id).await.expect("get");
        assert_eq!(fetched.session_id, created.session_id);
        assert_eq!(fetched.state, SessionState::Active);
    }

    #[tokio::test]
    async fn end_is_idempotent_on_an_already_ended_session() {
        let manager = manager();
        let created = manager
            .create(
                SessionId::new("s1"),
                TraceId::new("t1"),
                principal(),
                vec!["carp.resolve".to_string()],
                3600,
            )
            .await
            .expect("create");
        let first = manager.end(&created.session_id).await.expect("end once");
        let second = manager.end(&created.session_id).await.expect("end twice");
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(second.reason, SessionEndReason::Ended);
    }

    #[tokio::test]
    async fn get_on_unknown_session_fails_not_found() {
        let manager = manager();
        let result = manager.get(&SessionId::new("missing")).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn increment_resolution_count_accumulates() {
        let manager = manager();
        let created = manager
            .create(
                SessionId::new("s1"),
                TraceId::new("t1"),
                principal(),
                vec!["carp.resolve".to_string()],
                3600,
            )
            .await
            .expect("create");
        manager
            .increment_resolution_count(&created.session_id)
            .await
            .expect("increment");
        manager
            .increment_resolution_count(&created.session_id)
            .await
            .expect("increment");
        let fetched = manager.get(&created.session_id).await.expect("get");
        assert_eq!(fetched.counters.resolutions, 2);
    }
}
