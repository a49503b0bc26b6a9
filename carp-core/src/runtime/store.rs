// carp-core/src/runtime/store.rs
// ============================================================================
// Module: CARP Runtime In-Memory Store
// Description: Default in-process implementation of the Store contract.
// Purpose: Back local runs, tests, and demos without an external database.
// Dependencies: crate::core, crate::interfaces, async-trait
// ============================================================================

//! ## Overview
//! This module provides an in-memory [`Store`] implementation. It holds
//! every record in process memory behind a mutex and is lost on restart;
//! production deployments back the same trait with a durable backend
//! instead (e.g. a SQLite-backed store).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::ActionExecution;
use crate::core::ActionGrant;
use crate::core::ExecutionId;
use crate::core::GrantId;
use crate::core::Session;
use crate::core::SessionId;
use crate::core::TraceEvent;
use crate::core::TraceId;
use crate::interfaces::Store;
use crate::interfaces::StoreError;

/// Turns a poisoned-mutex panic into a recoverable [`StoreError`].
fn poisoned(what: &str) -> StoreError {
    StoreError::Backend(format!("{what} mutex poisoned"))
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

#[derive(Debug, Default)]
struct Inner {
    sessions: BTreeMap<String, Session>,
    trace_events: BTreeMap<String, Vec<TraceEvent>>,
    grants: BTreeMap<String, ActionGrant>,
    executions: BTreeMap<String, ActionExecution>,
}

/// In-memory [`Store`] implementation, suitable for tests, demos, and
/// single-process deployments where durability across restarts is not
/// required.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| poisoned("session store"))?;
        guard
            .sessions
            .insert(session.session_id.as_str().to_string(), session.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        let guard = self.inner.lock().map_err(|_| poisoned("session store"))?;
        Ok(guard.sessions.get(session_id.as_str()).cloned())
    }

    async fn append_trace_event(&self, event: &TraceEvent) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| poisoned("trace store"))?;
        guard
            .trace_events
            .entry(event.trace.trace_id.as_str().to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn load_trace_events(&self, trace_id: &TraceId) -> Result<Vec<TraceEvent>, StoreError> {
        let guard = self.inner.lock().map_err(|_| poisoned("trace store"))?;
        Ok(guard
            .trace_events
            .get(trace_id.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn save_grant(&self, grant: &ActionGrant) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| poisoned("grant store"))?;
        guard
            .grants
            .insert(grant.grant_id.as_str().to_string(), grant.clone());
        Ok(())
    }

    async fn load_grant(&self, grant_id: &GrantId) -> Result<Option<ActionGrant>, StoreError> {
        let guard = self.inner.lock().map_err(|_| poisoned("grant store"))?;
        Ok(guard.grants.get(grant_id.as_str()).cloned())
    }

    async fn list_pending_approvals(&self) -> Result<Vec<ActionGrant>, StoreError> {
        let guard = self.inner.lock().map_err(|_| poisoned("grant store"))?;
        let mut pending: Vec<ActionGrant> = guard
            .grants
            .values()
            .filter(|grant| !grant.consumed)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }

    async fn save_execution(&self, execution: &ActionExecution) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().map_err(|_| poisoned("execution store"))?;
        guard
            .executions
            .insert(execution.execution_id.as_str().to_string(), execution.clone());
        Ok(())
    }

    async fn load_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<ActionExecution>, StoreError> {
        let guard = self.inner.lock().map_err(|_| poisoned("execution store"))?;
        Ok(guard.executions.get(execution_id.as_str()).cloned())
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
    use crate::core::PrincipalId;
    use crate::core::PrincipalKind;
    use crate::core::SessionCounters;
    use crate::core::SessionState;
    use crate::core::Timestamp;

    fn session() -> Session {
        Session {
            session_id: SessionId::new("s1"),
            trace_id: TraceId::new("t1"),
            principal: Principal {
                kind: PrincipalKind::Agent,
                id: PrincipalId::new("agent-1"),
                org_id: None,
            },
            scopes: vec!["carp.resolve".to_string()],
            state: SessionState::Active,
            created_at: Timestamp::parse("2026-01-01T00:00:00Z").expect("created"),
            expires_at: Timestamp::parse("2026-01-01T01:00:00Z").expect("expires"),
            ended_at: None,
            counters: SessionCounters::default(),
        }
    }

    #[tokio::test]
    async fn save_and_load_session_round_trips() {
        let store = InMemoryStore::new();
        let session = session();
        store.save_session(&session).await.expect("save");
        let loaded = store
            .load_session(&session.session_id)
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn load_session_returns_none_for_unknown_id() {
        let store = InMemoryStore::new();
        let loaded = store
            .load_session(&SessionId::new("missing"))
            .await
            .expect("load");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn trace_events_accumulate_in_append_order() {
        let store = InMemoryStore::new();
        let trace_id = TraceId::new("trace-1");
        for sequence in 0..3 {
            let event = crate::core::TraceEvent {
                trace_version: crate::core::TRACE_VERSION.to_string(),
                event_type: crate::core::event_type("test.event"),
                time: Timestamp::parse("2026-01-01T00:00:00Z").expect("time"),
                trace: crate::core::TraceContext {
                    trace_id: trace_id.clone(),
                    span_id: crate::core::SpanId::new(format!("span-{sequence}")),
                    parent_span_id: None,
                },
                session_id: SessionId::new("s1"),
                atlas: None,
                actor: crate::core::Actor::runtime(),
                severity: crate::core::Severity::Info,
                payload: serde_json::Value::Null,
                artifacts: vec![],
            };
            store.append_trace_event(&event).await.expect("append");
        }
        let events = store.load_trace_events(&trace_id).await.expect("load");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].trace.span_id.as_str(), "span-0");
        assert_eq!(events[2].trace.span_id.as_str(), "span-2");
    }
}
