//! Store error taxonomy (§7).

/// Distinguishes errors the worker should treat as "try again later"
/// (connection loss, timeout, deadlock) from ones where the operation
/// itself is permanently invalid (constraint violation) and should just be
/// skipped.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(#[source] sqlx::Error),

    #[error("permanent store error: {0}")]
    Permanent(#[source] sqlx::Error),
}

impl StoreError {
    /// Classifies a raw `sqlx::Error` using the same heuristic as `§7`:
    /// constraint violations are permanent, everything else (connection
    /// loss, timeout, deadlock, protocol errors) is transient.
    #[must_use]
    pub fn classify(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation()
                || db_err.is_check_violation()
                || db_err.is_foreign_key_violation()
            {
                return Self::Permanent(err);
            }
        }
        Self::Transient(err)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::classify(err)
    }
}
