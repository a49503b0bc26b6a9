// carp-server/src/lib.rs
// ============================================================================
// Module: CARP Runtime REST/SSE Server
// Description: HTTP front door over one `carp_core::Runtime`.
// Purpose: Expose sessions, resolve, execute, approvals, and trace streaming
//          as a REST/SSE surface, with perimeter authentication, optional
//          RBAC, and replay-manifest artifact storage.
// Dependencies: carp-core, axum, axum-server, aws-sdk-s3, aws-config
// ============================================================================

//! ## Overview
//! `carp-server` wires a [`server::AppState`] around a `carp_core::Runtime`
//! and serves [`server::router`] over `axum`/`axum-server`. [`auth`] and
//! [`audit`] implement the perimeter (credential resolution, RBAC, auth
//! audit logging) described as ambient to the governance core itself;
//! [`artifact_store`] persists replay manifests independently of the
//! runtime's own `Store` trait.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod artifact_store;
pub mod audit;
pub mod auth;
pub mod config;
pub mod security;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use artifact_store::ArtifactReader;
pub use artifact_store::ArtifactSink;
pub use artifact_store::ArtifactStoreError;
pub use artifact_store::FilesystemArtifactStore;
pub use artifact_store::S3ArtifactStore;
pub use artifact_store::default_manifest_key;
pub use audit::AuthAuditEvent;
pub use audit::AuthAuditSink;
pub use audit::AuthOutcome;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use auth::AuthContext;
pub use auth::AuthError;
pub use auth::AuthMethod;
pub use auth::CredentialEntry;
pub use auth::CredentialTable;
pub use auth::InboundCredential;
pub use auth::Permission;
pub use auth::RbacPolicy;
pub use auth::resolve_credential;
pub use config::ConfigError;
pub use config::CredentialConfig;
pub use config::ServerConfig;
pub use config::TlsConfig;
pub use security::constant_time_eq;
pub use server::AppState;
pub use server::router;
