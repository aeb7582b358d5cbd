//! Typed error type for the db crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("row not found")]
    NotFound,

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// `(name, version)` is already taken by another row.
    #[error("version {version} of function unit '{name}' already exists")]
    DuplicateVersion { name: String, version: String },

    /// A write would break referential integrity (e.g. deleting a version
    /// that still owns access rules or process instances).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Failure injected by [`crate::memory::MemoryStore`].
    #[error("injected storage fault: {0}")]
    Injected(String),
}
