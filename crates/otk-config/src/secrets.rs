//! Credential resolution.
//!
//! # Contract
//! - Config YAML stores only the env var NAME (`/api/credential_env`).
//! - Callers resolve the credential once at startup and pass the resulting
//!   [`Credential`] into constructors; no other code reads the environment.
//! - Error messages reference the env var NAME, never the value.

use anyhow::{bail, Result};
use otk_schemas::Credential;

use crate::ApiConfig;

/// Value of the named environment variable, or `None` if unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Resolve the bearer credential named by `api.credential_env`.
///
/// # Errors
/// Returns `Err` naming the env var when it is unset or blank.
pub fn resolve_credential(api: &ApiConfig) -> Result<Credential> {
    match resolve_env(&api.credential_env) {
        Some(token) => Ok(Credential::new(token)),
        None => bail!(
            "SECRETS_MISSING: required env var '{}' (api credential) is not set or empty",
            api.credential_env
        ),
    }
}
