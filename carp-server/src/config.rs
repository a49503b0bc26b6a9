// carp-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: Bind address, TLS, and credential-table configuration for
//              the REST/SSE server binary.
// Purpose: Load a small, strictly-bounded TOML document describing how this
//          process should listen and who it trusts, failing closed on any
//          malformed or oversized input.
// Dependencies: serde, toml
// ============================================================================

//! ## Overview
//! `carp-server`'s own configuration is narrow: where to bind, whether to
//! terminate TLS, and the static credential/role tables `auth` resolves
//! against. Everything else the governance runtime needs (policy rules,
//! Atlas sources) is configured through the core components directly, not
//! through this file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Maximum configuration file size accepted; larger files are rejected
/// before parsing rather than read in full.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path:?}: {reason}")]
    Read {
        /// Path that could not be read.
        path: String,
        /// Underlying I/O failure description.
        reason: String,
    },
    /// The configuration file exceeded [`MAX_CONFIG_FILE_SIZE`].
    #[error("config file {0:?} exceeds the maximum allowed size")]
    TooLarge(String),
    /// The configuration file's TOML could not be parsed.
    #[error("failed to parse config file {path:?}: {reason}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying parser failure description.
        reason: String,
    },
}

// ============================================================================
// SECTION: Config Shape
// ============================================================================

/// One static credential entry as loaded from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    /// Shared secret (bearer token or API key).
    pub secret: String,
    /// Principal id this secret resolves to.
    pub principal_id: String,
    /// Role names granted to this principal.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// TLS termination settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    /// Path to a PEM certificate chain.
    pub cert_path: Option<String>,
    /// Path to the matching PEM private key.
    pub key_path: Option<String>,
}

/// Top-level server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the HTTP(S) listener to.
    pub bind_addr: SocketAddr,
    /// Static credential table; empty means every request is anonymous.
    #[serde(default)]
    pub credentials: Vec<CredentialConfig>,
    /// TLS settings; `None` serves plaintext HTTP.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl ServerConfig {
    /// Loads and parses a [`ServerConfig`] from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, exceeds
    /// [`MAX_CONFIG_FILE_SIZE`], or fails to parse as TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        if metadata.len() as usize > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge(path.display().to_string()));
        }
        let raw = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        toml::from_str(&raw).map_err(|err| ConfigError::Parse {
            path: path.display().to_string(),
            reason: err.to_string(),
        })
    }
}
