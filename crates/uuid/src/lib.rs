//! UUID, content-hash and sharded-path utilities.
//!
//! Mixlab stores formulations and uploaded objects under sharded directories derived from an
//! identifier.
//!
//! To keep path derivation deterministic, Mixlab uses a *canonical* UUID representation for
//! storage identifiers: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! This crate provides:
//! - [`ShardableUuid`], a wrapper that *guarantees* the canonical format once constructed.
//! - [`Sha256Hash`], a validated lowercase hex SHA-256 digest used for content addressing.
//! - Shared sharding logic to derive directory locations from either identifier.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`ShardableUuid::parse`].
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, data lives under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `mixlab_data/formulations/55/0e/550e8400e29b41d4a716446655440000/`

mod service;

pub use service::{Sha256Hash, ShardableUuid, Uuid};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
