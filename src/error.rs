//! Library error taxonomy.
//!
//! Queries report missing entities as `Ok(None)` / empty results; `NotFound`
//! is reserved for operations that require the entity to exist. Unique
//! constraint violations are surfaced as a typed condition since some flows
//! (duplicate task creation) branch on them.

use std::borrow::Cow;

/// Constraint class extracted from the underlying SQL error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    Check,
    ForeignKey,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An entity id or MRL that the operation requires is unknown.
    #[error("entity not found")]
    NotFound,

    /// A database constraint rejected the mutation.
    #[error("constraint violation ({0:?})")]
    Constraint(ConstraintKind),

    /// The device holding the file disappeared mid-operation.
    #[error("device removed while accessing {mrl}")]
    DeviceRemoved { mrl: String },

    /// Any other filesystem-level failure.
    #[error("filesystem error on {mrl}: {source}")]
    Filesystem {
        mrl: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid mrl: {0}")]
    BadMrl(String),

    /// The database file uses a schema version newer than this build.
    #[error("database model version {found} is newer than supported version {supported}")]
    UnsupportedModel { found: u32, supported: u32 },

    #[error("the library is shutting down")]
    Shutdown,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Other(Cow<'static, str>),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify an sqlx error, mapping SQLite constraint failures onto the
    /// typed variants callers branch on.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return Error::Constraint(ConstraintKind::Unique);
            }
            if db_err.is_foreign_key_violation() {
                return Error::Constraint(ConstraintKind::ForeignKey);
            }
            if db_err.is_check_violation() {
                return Error::Constraint(ConstraintKind::Check);
            }
        }
        Error::Database(err)
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::Constraint(ConstraintKind::Unique))
    }
}

/// Map an io error on `mrl`, detecting device removal (the backing mount
/// vanishing surfaces as NotFound on a path we just listed).
pub(crate) fn io_error(mrl: impl Into<String>, source: std::io::Error) -> Error {
    Error::Filesystem {
        mrl: mrl.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_detection() {
        let err = Error::Constraint(ConstraintKind::Unique);
        assert!(err.is_unique_violation());
        let err = Error::Constraint(ConstraintKind::ForeignKey);
        assert!(!err.is_unique_violation());
        assert!(!Error::NotFound.is_unique_violation());
    }
}
