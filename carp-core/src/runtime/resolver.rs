// carp-core/src/runtime/resolver.rs
// ============================================================================
// Module: Resolver (C5)
// Description: Turns a session, a goal, and a set of Atlases into one
//              Resolution: ranked context, permitted actions, and deny rules.
// Purpose: The single place where context assembly meets policy evaluation;
//          every downstream action grant traces back to a Resolution.
// Dependencies: crate::{core, interfaces, runtime::{atlas_registry, policy_engine, session_manager}}, uuid
// ============================================================================

//! ## Overview
//! Resolving is nine steps: validate the session, open a child span, emit
//! `trace.carp.resolve.requested`, evaluate policy over the request, deny
//! short-circuits with `trace.carp.policy.denied`, otherwise context blocks
//! and allowed actions are assembled from the requested Atlases, a
//! confidence score is computed, the session's resolution counter is
//! incremented, and `trace.carp.resolve.returned` is emitted. Given the same
//! Atlas contents, policy rules, and request, two resolves produce the same
//! `Resolution` modulo generated ids and timestamps.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::core::Actor;
use crate::core::ActionKind;
use crate::core::AllowedAction;
use crate::core::Atlas;
use crate::core::AtlasId;
use crate::core::BlockId;
use crate::core::ContextBlock;
use crate::core::ContextBlockContentType;
use crate::core::DenyRule;
use crate::core::HashAlgorithm;
use crate::core::MergeConflictPolicy;
use crate::core::MergeRules;
use crate::core::PolicyContext;
use crate::core::PolicyEffect;
use crate::core::PolicyRule;
use crate::core::Resolution;
use crate::core::ResolutionId;
use crate::core::ResolveRequest;
use crate::core::ResolveResponse;
use crate::core::RiskTier;
use crate::core::Severity;
use crate::core::SourceEvidence;
use crate::core::SourceEvidenceKind;
use crate::core::SpanId;
use crate::core::TraceContext;
use crate::core::TraceEvent;
use crate::core::event_type;
use crate::core::hash_bytes;
use crate::interfaces::EventBus;
use crate::runtime::atlas_registry::AtlasRegistry;
use crate::runtime::policy_engine::PolicyEngine;
use crate::runtime::session_manager::SessionError;
use crate::runtime::session_manager::SessionManager;

/// TTL applied to the static agent-guidelines baseline block.
const AGENT_GUIDELINES_TTL_SECONDS: u64 = 3600;

/// TTL applied to the task-context baseline block, and to the
/// policy-context block when one is produced.
const TASK_CONTEXT_TTL_SECONDS: u64 = 1800;

/// TTL applied to blocks pulled from an Atlas's own context packs.
const ATLAS_CONTEXT_TTL_SECONDS: u64 = 3600;

/// Dispatch timeout applied to an allowed action when its adapter
/// descriptor does not declare one, matching the Action Executor's own
/// default.
const DEFAULT_ACTION_TIMEOUT_MILLIS: u64 = 30_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while resolving context and actions for a session.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// The session failed validation (unknown, or expired on this read).
    #[error(transparent)]
    Session(#[from] SessionError),
    /// One of the requested Atlases is not registered.
    #[error("atlas {0:?} not found")]
    AtlasNotFound(String),
    /// Policy evaluation denied the resolve request outright.
    #[error("resolve denied: {reason}")]
    PolicyDenied {
        /// Human-readable denial reason.
        reason: String,
    },
    /// Merge policy `fail` encountered the same action id contributed by
    /// more than one Atlas.
    #[error("merge conflict: action {0:?} contributed by more than one atlas")]
    MergeConflict(String),
}

// ============================================================================
// SECTION: Adapter Action Parsing
// ============================================================================

/// Shape expected of one action entry inside an adapter descriptor's
/// `content`, tolerant of the descriptor carrying either a single action, a
/// bare array of actions, or an `{"actions": [...]}` wrapper.
#[derive(Debug, Deserialize)]
struct AdapterAction {
    action_id: String,
    kind: ActionKind,
    risk_tier: RiskTier,
    #[serde(default)]
    parameters_schema: Value,
    #[serde(default)]
    constraints: Vec<String>,
    /// The action's own intrinsic approval requirement, independent of
    /// policy or risk tier (e.g. an adapter marking a destructive call as
    /// always requiring a human in the loop).
    #[serde(default)]
    requires_approval: bool,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Extracts the [`AllowedAction`] records an adapter descriptor contributes,
/// skipping entries that do not match the expected shape rather than
/// failing the whole resolve. `requires_approval` on each returned action is
/// the OR of the policy decision's `requires_approval`, `risk_tier == high`,
/// and the action's own intrinsic requirement (§4.5 step 6).
fn actions_from_adapter(
    content: &Value,
    source_atlas: &AtlasId,
    adapter_name: &str,
    policy_requires_approval: bool,
    request_risk_tier: RiskTier,
) -> Vec<AllowedAction> {
    let candidates: Vec<Value> = match content {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("actions") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![content.clone()],
        },
        _ => vec![],
    };

    candidates
        .into_iter()
        .filter_map(|candidate| serde_json::from_value::<AdapterAction>(candidate).ok())
        .map(|action| AllowedAction {
            action_id: action.action_id,
            kind: action.kind,
            risk_tier: action.risk_tier,
            adapter: adapter_name.to_string(),
            parameters_schema: action.parameters_schema,
            constraints: action.constraints,
            requires_approval: policy_requires_approval
                || request_risk_tier == RiskTier::High
                || action.requires_approval,
            timeout_ms: action.timeout_ms.unwrap_or(DEFAULT_ACTION_TIMEOUT_MILLIS),
            source_atlas: source_atlas.clone(),
        })
        .collect()
}

// ============================================================================
// SECTION: Confidence Scoring
// ============================================================================

/// Computes the Resolution's confidence score: a base of `0.85`, reduced by
/// `0.9` if the policy decision narrowed the result with constraints, then
/// further reduced by the request's declared risk tier (`medium` → `0.75`,
/// `high` → `0.65`, `low` → `1.0`), rounded to two decimal places.
fn compute_confidence(has_constraints: bool, risk_tier: RiskTier) -> f64 {
    let mut score = 0.85;
    if has_constraints {
        score *= 0.9;
    }
    score *= match risk_tier {
        RiskTier::High => 0.65,
        RiskTier::Medium => 0.75,
        RiskTier::Low => 1.0,
    };
    (score * 100.0).round() / 100.0
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolver (C5): assembles a [`Resolution`] for one session against one or
/// more Atlases.
pub struct Resolver {
    sessions: Arc<SessionManager>,
    policy: Arc<PolicyEngine>,
    atlases: Arc<AtlasRegistry>,
    bus: Arc<dyn EventBus>,
}

impl Resolver {
    /// Creates a resolver over the given Session Manager, Policy Engine,
    /// Atlas Registry, and telemetry bus.
    #[must_use]
    pub fn new(
        sessions: Arc<SessionManager>,
        policy: Arc<PolicyEngine>,
        atlases: Arc<AtlasRegistry>,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            sessions,
            policy,
            atlases,
            bus,
        }
    }

    /// Resolves context and actions for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolverError::Session`] when the session is unknown or
    /// expired, [`ResolverError::AtlasNotFound`] when a requested Atlas is
    /// not registered, and [`ResolverError::PolicyDenied`] when policy
    /// evaluation denies the request outright.
    pub async fn resolve(&self, request: ResolveRequest) -> Result<ResolveResponse, ResolverError> {
        let session = self.sessions.get(&request.session_id).await?;
        let span_id = SpanId::new(Uuid::new_v4().to_string());
        let parent_span_id = request
            .trace
            .parent_span_id
            .clone()
            .unwrap_or_else(|| request.trace.span_id.clone());
        let trace = TraceContext {
            trace_id: session.trace_id.clone(),
            span_id,
            parent_span_id: Some(parent_span_id),
        };

        self.emit(
            &trace,
            &session.session_id,
            "carp.resolve.requested",
            Severity::Info,
            json!({
                "goal": request.goal.clone(),
                "atlases": request.atlases.clone(),
                "capability": request.capability.clone(),
                "risk_tier": request.risk_tier,
                "target_platforms": request.target_platforms.clone(),
            }),
        );

        let mut atlases: Vec<Atlas> = Vec::with_capacity(request.atlases.len());
        for atlas_id in &request.atlases {
            let atlas = self
                .atlases
                .get(atlas_id)
                .ok_or_else(|| ResolverError::AtlasNotFound(atlas_id.as_str().to_string()))?;
            atlases.push(atlas);
        }

        let extra_rules: Vec<PolicyRule> = atlases
            .iter()
            .flat_map(|atlas| atlas.policy_files.iter())
            .flat_map(crate::core::atlas::AtlasPolicyFile::parsed_rules)
            .collect();

        let ctx = PolicyContext {
            session_scopes: session.scopes.clone(),
            action_id: None,
            risk_tier: Some(request.risk_tier),
            target: None,
            facts: std::collections::BTreeMap::new(),
            extra: json!({"goal": request.goal.clone()}),
        };
        let decision = self.policy.evaluate_with_extra(&ctx, &extra_rules);

        if decision.effect == PolicyEffect::Deny {
            let reason = decision
                .reason
                .clone()
                .unwrap_or_else(|| "resolve denied by policy".to_string());
            self.emit(
                &trace,
                &session.session_id,
                "carp.policy.denied",
                Severity::Warn,
                json!({"reason": reason.clone(), "matched_rules": decision.matched_rules.clone()}),
            );
            return Err(ResolverError::PolicyDenied { reason });
        }

        let has_constraints = !decision.constraints.redact_fields.is_empty()
            || decision.constraints.narrowed_scopes.is_some();

        let mut context_blocks = Vec::new();
        let mut next_rank = 0u32;

        context_blocks.push(baseline_block(
            "agent-guidelines",
            "Follow the active session's granted scopes and the Atlas context below. Do not exceed granted capabilities.",
            next_rank,
            AGENT_GUIDELINES_TTL_SECONDS,
            vec![],
        ));
        next_rank += 1;

        context_blocks.push(baseline_block(
            "task-context",
            &format!("Goal: {}", request.goal),
            next_rank,
            TASK_CONTEXT_TTL_SECONDS,
            vec![],
        ));
        next_rank += 1;

        if has_constraints || decision.requires_approval {
            context_blocks.push(baseline_block(
                "policy-context",
                &format!(
                    "Constraints in force: redact {:?}; narrowed scopes: {:?}",
                    decision.constraints.redact_fields, decision.constraints.narrowed_scopes
                ),
                next_rank,
                TASK_CONTEXT_TTL_SECONDS,
                decision.constraints.redact_fields.clone(),
            ));
            next_rank += 1;
        }

        let mut allowed_actions = Vec::new();
        for atlas in &atlases {
            for block in atlas.context_blocks_for(request.capability.as_deref()) {
                let sha256 = hash_bytes(HashAlgorithm::Sha256, block.content.as_bytes()).value;
                context_blocks.push(ContextBlock {
                    block_id: BlockId::new(Uuid::new_v4().to_string()),
                    purpose: format!("atlas-context:{}", atlas.id()),
                    ttl_seconds: ATLAS_CONTEXT_TTL_SECONDS,
                    content_type: ContextBlockContentType::from(block.content_type),
                    content: block.content.clone(),
                    rank: next_rank,
                    redactions: vec![],
                    source_evidence: SourceEvidence {
                        kind: SourceEvidenceKind::AtlasContextPack,
                        reference: block.relative_path.clone(),
                        sha256,
                    },
                });
                next_rank += 1;
            }

            for adapter in &atlas.adapters {
                allowed_actions.extend(actions_from_adapter(
                    &adapter.content,
                    atlas.id(),
                    &adapter.name,
                    decision.requires_approval,
                    request.risk_tier,
                ));
            }
        }

        if let Some(capability) = &request.capability {
            allowed_actions.retain(|action| {
                atlases
                    .iter()
                    .find(|atlas| atlas.id() == &action.source_atlas)
                    .is_none_or(|atlas| atlas.has_capability(capability))
            });
        }

        let merge_rules = request.merge_rules.clone().unwrap_or(MergeRules {
            conflict_policy: MergeConflictPolicy::LastWriteWins,
            priority_order: vec![],
        });
        let allowed_actions = apply_merge_rules(allowed_actions, &merge_rules)?;

        context_blocks.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.block_id.as_str().cmp(b.block_id.as_str())));

        let deny_rules: Vec<DenyRule> = self.policy.deny_rules_for(&extra_rules);

        let confidence = compute_confidence(has_constraints, request.risk_tier);
        let requires_approval =
            decision.requires_approval || allowed_actions.iter().any(|action| action.requires_approval);
        let next_steps = next_steps_for(requires_approval);

        let resolution = Resolution {
            resolution_id: ResolutionId::new(Uuid::new_v4().to_string()),
            session_id: session.session_id.clone(),
            atlases: request.atlases.clone(),
            context_blocks,
            allowed_actions,
            deny_rules,
            merge_rules,
            confidence,
            next_steps,
            created_at: crate::core::Timestamp::now(),
        };

        self.sessions.increment_resolution_count(&session.session_id).await?;

        self.emit(
            &trace,
            &session.session_id,
            "carp.resolve.returned",
            Severity::Info,
            json!({
                "resolution_id": resolution.resolution_id.clone(),
                "atlases": resolution.atlases.clone(),
                "confidence": resolution.confidence,
                "counts": {
                    "context_blocks": resolution.context_blocks.len(),
                    "allowed_actions": resolution.allowed_actions.len(),
                    "deny_rules": resolution.deny_rules.len(),
                },
                "policy_effect": decision.effect,
                "requires_approval": requires_approval,
            }),
        );

        Ok(ResolveResponse { resolution })
    }

    fn emit(
        &self,
        trace: &TraceContext,
        session_id: &crate::core::SessionId,
        event_suffix: &str,
        severity: Severity,
        payload: Value,
    ) {
        let _ = self.bus.publish(TraceEvent {
            trace_version: crate::core::TRACE_VERSION.to_string(),
            event_type: event_type(event_suffix),
            time: crate::core::Timestamp::now(),
            trace: trace.clone(),
            session_id: session_id.clone(),
            atlas: None,
            actor: Actor::runtime(),
            severity,
            payload,
            artifacts: vec![],
        });
    }
}

/// Builds one of the runtime's own baseline context blocks, attributed to
/// the synthetic `runtime.core` source rather than a registered Atlas.
fn baseline_block(
    name: &str,
    content: &str,
    rank: u32,
    ttl_seconds: u64,
    redactions: Vec<String>,
) -> ContextBlock {
    let sha256 = hash_bytes(HashAlgorithm::Sha256, content.as_bytes()).value;
    ContextBlock {
        block_id: BlockId::new(format!("builtin.{name}")),
        purpose: name.to_string(),
        ttl_seconds,
        content_type: ContextBlockContentType::Plain,
        content: content.to_string(),
        rank,
        redactions,
        source_evidence: SourceEvidence {
            kind: SourceEvidenceKind::RuntimeBaseline,
            reference: format!("builtin/{name}"),
            sha256,
        },
    }
}

/// Builds the guidance returned in `Resolution.next_steps`, phrased around
/// the approval workflow when the resolution gates on human approval.
fn next_steps_for(requires_approval: bool) -> Vec<String> {
    if requires_approval {
        vec![
            "submit the gated action(s) for approval before dispatch".to_string(),
            "re-resolve once approval is granted or the task's risk tier changes".to_string(),
        ]
    } else {
        vec!["proceed with the allowed actions".to_string()]
    }
}

/// Applies `merge_rules` across the actions contributed by every Atlas,
/// resolving `action_id` collisions per [`MergeConflictPolicy`]. Iteration
/// order is a [`std::collections::BTreeMap`] keyed by `action_id` so the
/// result is deterministic regardless of Atlas contribution order.
fn apply_merge_rules(
    actions: Vec<AllowedAction>,
    merge_rules: &MergeRules,
) -> Result<Vec<AllowedAction>, ResolverError> {
    let mut merged: std::collections::BTreeMap<String, AllowedAction> = std::collections::BTreeMap::new();

    for action in actions {
        match merge_rules.conflict_policy {
            MergeConflictPolicy::Fail => {
                if merged.contains_key(&action.action_id) {
                    return Err(ResolverError::MergeConflict(action.action_id));
                }
                merged.insert(action.action_id.clone(), action);
            }
            MergeConflictPolicy::LastWriteWins => {
                merged.insert(action.action_id.clone(), action);
            }
            MergeConflictPolicy::Priority => {
                let incoming_rank = merge_rules
                    .priority_order
                    .iter()
                    .position(|atlas_id| atlas_id == &action.source_atlas)
                    .unwrap_or(usize::MAX);
                match merged.get(&action.action_id) {
                    Some(existing) => {
                        let existing_rank = merge_rules
                            .priority_order
                            .iter()
                            .position(|atlas_id| atlas_id == &existing.source_atlas)
                            .unwrap_or(usize::MAX);
                        if incoming_rank < existing_rank {
                            merged.insert(action.action_id.clone(), action);
                        }
                    }
                    None => {
                        merged.insert(action.action_id.clone(), action);
                    }
                }
            }
        }
    }

    Ok(merged.into_values().collect())
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
    use crate::core::SessionId;
    use crate::core::SpanId;
    use crate::core::TraceId;
    use crate::runtime::bus::InMemoryEventBus;
    use crate::runtime::store::InMemoryStore;

    fn test_trace() -> TraceContext {
        TraceContext {
            trace_id: TraceId::new("t1"),
            span_id: SpanId::new("span-root"),
            parent_span_id: None,
        }
    }

    fn resolver() -> Resolver {
        Resolver::new(
            Arc::new(SessionManager::new(
                Arc::new(InMemoryStore::new()),
                Arc::new(InMemoryEventBus::new(16)),
            )),
            Arc::new(PolicyEngine::new()),
            Arc::new(AtlasRegistry::new()),
            Arc::new(InMemoryEventBus::new(16)),
        )
    }

    async fn seeded_session(resolver: &Resolver) -> SessionId {
        let session = resolver
            .sessions
            .create(
                SessionId::new("s1"),
                TraceId::new("t1"),
                Principal {
                    kind: PrincipalKind::Agent,
                    id: PrincipalId::new("agent-1"),
                    org_id: None,
                },
                vec!["carp.resolve".to_string()],
                3600,
            )
            .await
            .expect("create session");
        session.session_id
    }

    #[tokio::test]
    async fn resolve_fails_for_unknown_session() {
        let resolver = resolver();
        let request = ResolveRequest {
            session_id: SessionId::new("missing"),
            atlases: vec![],
            goal: "say hello".to_string(),
            risk_tier: RiskTier::Low,
            target_platforms: vec![],
            trace: test_trace(),
            capability: None,
            merge_rules: None,
        };
        let result = resolver.resolve(request).await;
        assert!(matches!(result, Err(ResolverError::Session(SessionError::NotFound(_)))));
    }

    #[tokio::test]
    async fn resolve_fails_for_unregistered_atlas() {
        let resolver = resolver();
        let session_id = seeded_session(&resolver).await;
        let request = ResolveRequest {
            session_id,
            atlases: vec![AtlasId::new("missing.atlas")],
            goal: "say hello".to_string(),
            risk_tier: RiskTier::Low,
            target_platforms: vec![],
            trace: test_trace(),
            capability: None,
            merge_rules: None,
        };
        let result = resolver.resolve(request).await;
        assert!(matches!(result, Err(ResolverError::AtlasNotFound(_))));
    }

    #[tokio::test]
    async fn resolve_denies_a_destructive_goal() {
        let resolver = resolver();
        let session_id = seeded_session(&resolver).await;
        let request = ResolveRequest {
            session_id,
            atlases: vec![],
            goal: "rm -rf /".to_string(),
            risk_tier: RiskTier::Medium,
            target_platforms: vec![],
            trace: test_trace(),
            capability: None,
            merge_rules: None,
        };
        let result = resolver.resolve(request).await;
        assert!(matches!(result, Err(ResolverError::PolicyDenied { .. })));
    }

    #[tokio::test]
    async fn resolve_returns_baseline_context_blocks_for_a_benign_goal() {
        let resolver = resolver();
        let session_id = seeded_session(&resolver).await;
        let request = ResolveRequest {
            session_id,
            atlases: vec![],
            goal: "summarize the quarterly report".to_string(),
            risk_tier: RiskTier::Low,
            target_platforms: vec![],
            trace: test_trace(),
            capability: None,
            merge_rules: None,
        };
        let response = resolver.resolve(request).await.expect("resolve");
        assert!(response.resolution.context_blocks.len() >= 2);
        assert_eq!(response.resolution.context_blocks[0].rank, 0);
        assert!((0.0..=1.0).contains(&response.resolution.confidence));
    }
}
