// carp-config/src/lib.rs
// ============================================================================
// Module: CARP Runtime Config Library
// Description: Canonical config model, validation, and artifact generation.
// Purpose: Single source of truth for carp.toml semantics.
// Dependencies: carp-core, serde, toml
// ============================================================================

//! ## Overview
//! `carp-config` defines the canonical configuration model for
//! CARP Runtime. It provides strict, fail-closed validation and deterministic
//! generators for config schema, examples, and docs.
//!
//! Security posture: config inputs are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod docs;
pub mod examples;
pub mod policy;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use docs::config_docs_markdown;
pub use docs::verify_config_docs;
pub use docs::write_config_docs;
pub use examples::config_toml_example;
pub use policy::*;
pub use schema::config_schema;
