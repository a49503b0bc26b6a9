// carp-core/src/core/grant.rs
// ============================================================================
// Module: CARP Runtime Action Grant Model
// Description: Materialized permission to execute one action, and its
//              subsequent execution record.
// Purpose: Define the data shapes the Action Executor (C6) creates, tracks,
//          and transitions through its state machine.
// Dependencies: crate::core::{identifiers, time, policy}, serde, serde_json
// ============================================================================

//! ## Overview
//! An action grant is a materialized, time-bounded permission to execute one
//! action with a specific parameter set. Executing a grant produces an
//! execution record that advances through a linear state machine from
//! `pending` to a terminal state, hashing both parameters and result with
//! canonical JSON + SHA-256 so executions are independently verifiable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ExecutionId;
use crate::core::identifiers::GrantId;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::ResolutionId;
use crate::core::identifiers::SessionId;
use crate::core::policy::PolicyConstraints;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Action Grant
// ============================================================================

/// A materialized, time-bounded permission to execute one action.
///
/// # Invariants
/// - `expires_at > created_at`.
/// - A grant is consumed by at most one successful execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionGrant {
    /// Grant identifier.
    pub grant_id: GrantId,
    /// Owning session.
    pub session_id: SessionId,
    /// Resolution this grant was materialized from.
    pub resolution_id: ResolutionId,
    /// Action identifier being granted.
    pub action_id: String,
    /// Parameters bound to this grant.
    pub parameters: Value,
    /// Schema the bound parameters are validated against before dispatch.
    #[serde(default)]
    pub parameters_schema: Value,
    /// Constraints (e.g. redactions) carried over from the policy decision.
    pub constraints: PolicyConstraints,
    /// Whether the policy decision that produced this grant requires human
    /// approval before the first dispatch attempt.
    #[serde(default)]
    pub requires_approval: bool,
    /// Creation timestamp.
    pub created_at: Timestamp,
    /// Expiry timestamp; a grant may not be executed after this instant.
    pub expires_at: Timestamp,
    /// Whether this grant has already been consumed by an execution.
    #[serde(default)]
    pub consumed: bool,
}

impl ActionGrant {
    /// Returns whether this grant is still usable as of `now`: unexpired
    /// and not yet consumed.
    #[must_use]
    pub fn is_usable_at(&self, now: Timestamp) -> bool {
        !self.consumed && now < self.expires_at
    }
}

// ============================================================================
// SECTION: Approval
// ============================================================================

/// A pending request for human approval of a grant gated by a
/// `require_approval` policy decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Grant awaiting approval.
    pub grant_id: GrantId,
    /// Principal who must approve or reject.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub requested_approver: Option<PrincipalId>,
    /// Timestamp the approval was requested.
    pub requested_at: Timestamp,
}

// ============================================================================
// SECTION: Execution State Machine
// ============================================================================

/// Lifecycle state of an action execution.
///
/// # Invariants
/// - Transitions are linear: `Pending` → (`Approved` | `Rejected`);
///   `Approved` → `Running` → (`Completed` | `Failed`); `Pending` may also
///   move directly to `Running` when no approval was required.
/// - `Cancelled` is reachable from `Pending` or `Approved` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Awaiting either approval or dispatch.
    Pending,
    /// Approved; awaiting dispatch.
    Approved,
    /// Dispatched to the handler; awaiting a result.
    Running,
    /// Completed successfully.
    Completed,
    /// Completed with a failure.
    Failed,
    /// Cancelled before completion.
    Cancelled,
    /// Rejected during approval.
    Rejected,
}

impl ExecutionState {
    /// Returns whether this state is terminal (no further transitions).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Rejected
        )
    }
}

/// A single action execution, created when a grant is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecution {
    /// Execution identifier.
    pub execution_id: ExecutionId,
    /// Grant this execution was dispatched from.
    pub grant_id: GrantId,
    /// Owning session.
    pub session_id: SessionId,
    /// Action identifier executed.
    pub action_id: String,
    /// Current lifecycle state.
    pub state: ExecutionState,
    /// SHA-256 hash of the canonical JSON of the bound parameters.
    pub parameters_hash: String,
    /// SHA-256 hash of the canonical JSON of the result, once produced.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result_hash: Option<String>,
    /// Raw result payload, once produced (subject to redaction constraints
    /// before being surfaced to a caller).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<Value>,
    /// Failure reason, if `state` is [`ExecutionState::Failed`].
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure_reason: Option<String>,
    /// Timestamp the execution was created.
    pub created_at: Timestamp,
    /// Timestamp dispatch began, if it has.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<Timestamp>,
    /// Timestamp the execution reached a terminal state, if it has.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub finished_at: Option<Timestamp>,
}

impl ActionExecution {
    /// Returns the wall-clock duration of dispatch in milliseconds, if both
    /// `started_at` and `finished_at` are set.
    #[must_use]
    pub fn duration_millis(&self) -> Option<u64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some(finished.saturating_millis_since(started))
    }
}

// ============================================================================
// SECTION: Execute Request / Response
// ============================================================================

/// A request to dispatch a previously granted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Grant to execute.
    pub grant_id: GrantId,
    /// Timeout applied to dispatch, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeout_millis: Option<u64>,
}

/// The response to an execute request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// The resulting execution record.
    pub execution: ActionExecution,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use super::*;

    fn grant(expires_at: Timestamp, consumed: bool) -> ActionGrant {
        ActionGrant {
            grant_id: GrantId::new("g1"),
            session_id: SessionId::new("s1"),
            resolution_id: ResolutionId::new("r1"),
            action_id: "cra.echo".to_string(),
            parameters: Value::Null,
            parameters_schema: Value::Null,
            constraints: PolicyConstraints::default(),
            requires_approval: false,
            created_at: Timestamp::parse("2026-01-01T00:00:00Z").expect("created"),
            expires_at,
            consumed,
        }
    }

    #[test]
    fn is_usable_at_checks_expiry_and_consumption() {
        let expires = Timestamp::parse("2026-01-01T01:00:00Z").expect("expires");
        let before = Timestamp::parse("2026-01-01T00:30:00Z").expect("before");
        let after = Timestamp::parse("2026-01-01T02:00:00Z").expect("after");

        let fresh = grant(expires, false);
        assert!(fresh.is_usable_at(before));
        assert!(!fresh.is_usable_at(after));

        let spent = grant(expires, true);
        assert!(!spent.is_usable_at(before));
    }

    #[test]
    fn terminal_states_are_exactly_the_four_end_states() {
        assert!(ExecutionState::Completed.is_terminal());
        assert!(ExecutionState::Failed.is_terminal());
        assert!(ExecutionState::Cancelled.is_terminal());
        assert!(ExecutionState::Rejected.is_terminal());
        assert!(!ExecutionState::Pending.is_terminal());
        assert!(!ExecutionState::Approved.is_terminal());
        assert!(!ExecutionState::Running.is_terminal());
    }

    #[test]
    fn duration_millis_requires_both_timestamps() {
        let started = Timestamp::parse("2026-01-01T00:00:00Z").expect("start");
        let finished = Timestamp::parse("2026-01-01T00:00:02Z").expect("finish");
        let mut execution = ActionExecution {
            execution_id: ExecutionId::new("e1"),
            grant_id: GrantId::new("g1"),
            session_id: SessionId::new("s1"),
            action_id: "cra.echo".to_string(),
            state: ExecutionState::Completed,
            parameters_hash: "a".repeat(64),
            result_hash: None,
            result: None,
            failure_reason: None,
            created_at: started,
            started_at: None,
            finished_at: None,
        };
        assert_eq!(execution.duration_millis(), None);

        execution.started_at = Some(started);
        execution.finished_at = Some(finished);
        assert_eq!(execution.duration_millis(), Some(2_000));
    }
}
