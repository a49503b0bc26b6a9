// carp-core/src/runtime/mod.rs
// ============================================================================
// Module: CARP Runtime Components
// Description: Submodule declarations for the six stateful runtime
//              components (C1-C6) and a `Runtime` facade wiring them together.
// Purpose: Give callers a single entry point that owns the shared store and
//          telemetry bus every component depends on.
// Dependencies: crate::{core, interfaces}, std::sync::Arc
// ============================================================================

//! ## Overview
//! Six components, each the sole mutator of its slice of state: the
//! Telemetry Bus (C1) fans trace events out to subscribers; the Atlas
//! Registry (C2) loads and caches Atlas bundles; the Policy Engine (C3)
//! evaluates rules into decisions; the Session & Trace Manager (C4) owns
//! session lifecycle; the Resolver (C5) assembles resolutions from Atlases
//! and policy; the Action Executor (C6) carries grants through approval and
//! dispatch. [`Runtime`] constructs all six over one shared store and bus.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod atlas_registry;
pub mod bus;
pub mod executor;
pub mod policy_engine;
pub mod resolver;
pub mod session_manager;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use atlas_registry::AtlasRegistry;
pub use atlas_registry::AtlasRegistryError;
pub use bus::InMemoryEventBus;
pub use executor::Executor;
pub use executor::ExecutorError;
pub use policy_engine::PolicyEngine;
pub use policy_engine::builtin_rules;
pub use resolver::Resolver;
pub use resolver::ResolverError;
pub use session_manager::SessionError;
pub use session_manager::SessionManager;
pub use store::InMemoryStore;

// ============================================================================
// SECTION: Runtime Facade
// ============================================================================

use std::sync::Arc;

use crate::interfaces::EventBus;
use crate::interfaces::Store;

/// Wires the six runtime components over one shared store and telemetry bus.
///
/// This is a convenience facade, not a required entry point: each component
/// can be constructed and used independently when only a subset is needed
/// (for example, a worker that only calls into the Policy Engine).
pub struct Runtime {
    /// Telemetry bus every component publishes trace events to.
    pub bus: Arc<dyn EventBus>,
    /// Durable store backing sessions, grants, and executions.
    pub store: Arc<dyn Store>,
    /// Atlas Registry (C2).
    pub atlases: Arc<AtlasRegistry>,
    /// Policy Engine (C3).
    pub policy: Arc<PolicyEngine>,
    /// Session & Trace Manager (C4).
    pub sessions: Arc<SessionManager>,
    /// Resolver (C5).
    pub resolver: Arc<Resolver>,
    /// Action Executor (C6).
    pub executor: Arc<Executor>,
}

impl Runtime {
    /// Builds a runtime over the given store and bus, with a fresh Atlas
    /// Registry and a Policy Engine seeded with [`builtin_rules`].
    #[must_use]
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn EventBus>) -> Self {
        let atlases = Arc::new(AtlasRegistry::new());
        let policy = Arc::new(PolicyEngine::with_rules(builtin_rules()));
        let sessions = Arc::new(SessionManager::new(store.clone(), bus.clone()));
        let resolver = Arc::new(Resolver::new(
            sessions.clone(),
            policy.clone(),
            atlases.clone(),
            bus.clone(),
        ));
        let executor = Arc::new(Executor::new(sessions.clone(), store.clone(), bus.clone()));

        Self {
            bus,
            store,
            atlases,
            policy,
            sessions,
            resolver,
            executor,
        }
    }
}
