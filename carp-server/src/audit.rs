// carp-server/src/audit.rs
// ============================================================================
// Module: Auth Audit Logging
// Description: Structured audit events for authentication attempts.
// Purpose: Record perimeter authn/authz decisions independently of the
//          governed TRACE stream — authentication is a perimeter concern,
//          governance decisions are the TRACE's concern.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! `AuthAuditSink` is deliberately a separate trait from anything in
//! `carp-core`'s telemetry bus: a failed bearer-token match is never a
//! `trace.*` event, since the TRACE stream records what a *session* did,
//! not who tried and failed to get one.

use serde::Serialize;

use crate::auth::AuthMethod;

/// One authentication attempt, successful or not.
#[derive(Debug, Clone, Serialize)]
pub struct AuthAuditEvent {
    /// Always `"auth_attempt"`; kept as a field (not inferred from type) so
    /// sinks that fan events into one log stream can filter on it directly.
    pub event: &'static str,
    /// Outcome of the attempt.
    pub outcome: AuthOutcome,
    /// Method presented, if any.
    pub method: AuthMethod,
    /// Resolved principal id, when the attempt succeeded.
    pub principal_id: Option<String>,
    /// Request path the credential was presented against.
    pub path: String,
    /// Failure reason, when the attempt did not succeed.
    pub reason: Option<String>,
}

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    /// Credential resolved (or the request was anonymous and anonymous
    /// access is permitted for the endpoint).
    Allowed,
    /// Credential was presented but did not resolve, or RBAC denied it.
    Denied,
}

/// Sink for [`AuthAuditEvent`]s.
pub trait AuthAuditSink: Send + Sync {
    /// Records one auth audit event.
    fn record(&self, event: &AuthAuditEvent);
}

/// Discards every event; the default for tests and local development.
pub struct NoopAuditSink;

impl AuthAuditSink for NoopAuditSink {
    fn record(&self, _event: &AuthAuditEvent) {}
}

/// Writes one JSON line per event to stderr.
pub struct StderrAuditSink;

impl AuthAuditSink for StderrAuditSink {
    fn record(&self, event: &AuthAuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            eprintln!("{line}");
        }
    }
}
