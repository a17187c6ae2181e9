//! # API Shared
//!
//! Shared utilities and definitions for the Mixlab APIs.
//!
//! Contains:
//! - Request/response types with OpenAPI schemas (`dto` module)
//! - Shared services like `HealthService`
//! - Caller identification and API key checks
//!
//! Used by `api-rest` and the workspace binary.

pub mod auth;
pub mod dto;
pub mod health;

pub use auth::{
    identify, ApiKey, AuthError, API_KEY_HEADER, USER_EMAIL_HEADER, USER_ID_HEADER,
    USER_NAME_HEADER,
};
pub use dto::*;
pub use health::HealthService;
