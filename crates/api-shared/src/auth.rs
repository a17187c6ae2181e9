//! Caller identification.
//!
//! Authentication itself happens upstream (a gateway or identity provider). By the time a
//! request reaches Mixlab the caller's identity travels in plain headers:
//!
//! - `x-user-id` (required for anything but public reads)
//! - `x-user-name`
//! - `x-user-email`
//!
//! When an API key is configured, every request must also carry a matching `x-api-key`.

use mixlab_core::{Actor, FormulationError};
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("invalid API key")]
    InvalidApiKey,
    #[error("caller identity required")]
    Anonymous,
    #[error("invalid caller identity: {0}")]
    InvalidIdentity(String),
}

/// The API key expected from callers, resolved once at startup.
#[derive(Clone, Debug, Default)]
pub struct ApiKey(Option<String>);

impl ApiKey {
    /// `None` or a blank value disables the check.
    pub fn new(expected: Option<String>) -> Self {
        Self(expected.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Validates the provided API key against the expected one.
    pub fn validate(&self, provided: Option<&str>) -> Result<(), AuthError> {
        let Some(expected) = &self.0 else {
            return Ok(());
        };
        let provided = provided.ok_or(AuthError::MissingApiKey)?;
        if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::InvalidApiKey)
        }
    }
}

/// Builds the caller from identity header values.
///
/// Returns `Ok(None)` for an anonymous caller (no or blank user id).
pub fn identify(
    user_id: Option<&str>,
    display_name: Option<&str>,
    email: Option<&str>,
) -> Result<Option<Actor>, AuthError> {
    let Some(user_id) = user_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    Actor::new(user_id, display_name.unwrap_or_default(), email)
        .map(Some)
        .map_err(|e: FormulationError| AuthError::InvalidIdentity(e.to_string()))
}
