//! Error types for the archive layer.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] errors and reports archive rows that no longer decode.

/// Errors that can occur in the archive layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A value could not be converted to or from its JSONB column.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An archived row does not decode into a journal entry.
    #[error("Corrupt archive row {seq}: {reason}")]
    CorruptRow {
        /// Sequence number of the row.
        seq: i64,
        /// What failed to decode.
        reason: String,
    },

    /// The archive URL does not parse as a `PostgreSQL` connection string.
    #[error("Invalid archive URL: {0}")]
    BadUrl(String),
}
