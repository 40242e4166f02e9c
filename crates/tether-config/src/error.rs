//! Error types for settings staging and native validation.

use thiserror::Error;

use crate::pack::ValueKind;

/// Primary error type for settings operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// A stored value was read back as a different type.
    #[error("settings value type mismatch")]
    TypeMismatch {
        /// Key that was read.
        key: String,
        /// Type requested by the caller.
        expected: ValueKind,
        /// Type actually stored.
        found: ValueKind,
    },
    /// The native side could not allocate a settings object.
    #[error("native settings object unavailable")]
    PackUnavailable,
    /// The native side refused a key, either unknown or of another type.
    #[error("native settings rejected key")]
    Rejected {
        /// Offending key.
        key: String,
        /// Type of the value that was submitted.
        kind: ValueKind,
    },
}

/// Convenience alias for settings results.
pub type SettingsResult<T> = Result<T, SettingsError>;
