// carp-core/tests/store.rs
// ============================================================================
// Module: In-Memory Store Tests
// Description: Tests for the in-memory persistence backend.
// Purpose: Validate deterministic save/load behavior and fail-closed reads
//          for missing records.
// Dependencies: carp-core, tokio
// ============================================================================
//! ## Overview
//! Ensures the in-memory store returns saved sessions and fails closed
//! (returns `None`, not an error) on missing entries.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use carp_core::InMemoryStore;
use carp_core::Principal;
use carp_core::PrincipalId;
use carp_core::PrincipalKind;
use carp_core::Session;
use carp_core::SessionCounters;
use carp_core::SessionId;
use carp_core::SessionState;
use carp_core::Store;
use carp_core::Timestamp;
use carp_core::TraceId;

fn sample_session(session_id: &str) -> Session {
    let created_at = Timestamp::parse("2026-01-01T00:00:00Z").expect("created");
    let expires_at = Timestamp::parse("2026-01-01T01:00:00Z").expect("expires");
    Session {
        session_id: SessionId::new(session_id),
        trace_id: TraceId::new("trace-1"),
        principal: Principal {
            kind: PrincipalKind::Agent,
            id: PrincipalId::new("agent-1"),
            org_id: None,
        },
        scopes: vec!["carp.resolve".to_string()],
        state: SessionState::Active,
        created_at,
        expires_at,
        ended_at: None,
        counters: SessionCounters::default(),
    }
}

/// Verifies saving then loading a session round-trips exactly.
#[tokio::test]
async fn store_save_and_load_session_roundtrip() {
    let store = InMemoryStore::new();
    let session = sample_session("session-1");

    store.save_session(&session).await.unwrap();
    let loaded = store.load_session(&session.session_id).await.unwrap();
    assert_eq!(loaded, Some(session));
}

/// Verifies loading a missing session returns `None` rather than an error.
#[tokio::test]
async fn store_returns_none_for_missing_session() {
    let store = InMemoryStore::new();
    let loaded = store
        .load_session(&SessionId::new("missing"))
        .await
        .unwrap();
    assert!(loaded.is_none());
}
