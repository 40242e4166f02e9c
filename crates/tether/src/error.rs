//! # Design
//!
//! - One error enum for every client-facing operation.
//! - Messages stay constant; the operation, path or key lives in fields.
//! - Raised at the violation point; nothing here is retried.

use std::io;
use std::path::PathBuf;

use tether_config::SettingsError;
use thiserror::Error;

use crate::types::InfoHash;

/// Errors raised by sessions, descriptors and attachments.
#[derive(Debug, Error)]
pub enum TetherError {
    /// The torrent file does not exist.
    #[error("torrent file not found")]
    NotFound {
        /// Path that was probed.
        path: PathBuf,
    },
    /// The engine could not parse the torrent content.
    #[error("torrent content could not be parsed")]
    Parse {
        /// Source file, when parsing from disk.
        path: Option<PathBuf>,
    },
    /// A native call returned a null handle.
    #[error("native call returned an invalid handle")]
    InvalidHandle {
        /// Native operation that failed.
        operation: &'static str,
    },
    /// A torrent with the same content hash is already attached.
    #[error("torrent already attached")]
    AlreadyAttached {
        /// Content hash of the torrent.
        info_hash: InfoHash,
    },
    /// The torrent is not attached to this session.
    #[error("torrent not attached")]
    NotAttached {
        /// Content hash of the torrent.
        info_hash: InfoHash,
    },
    /// The object was disposed or detached.
    #[error("object disposed")]
    Disposed {
        /// Kind of object that was used.
        object: &'static str,
    },
    /// Settings failed validation.
    #[error("settings validation failed")]
    Settings {
        /// Underlying settings error.
        #[from]
        source: SettingsError,
    },
    /// An argument fell outside the accepted range.
    #[error("value out of range")]
    OutOfRange {
        /// Argument name.
        field: &'static str,
        /// Rendered value.
        value: String,
    },
    /// A filesystem operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

impl TetherError {
    pub(crate) const fn disposed(object: &'static str) -> Self {
        Self::Disposed { object }
    }

    pub(crate) fn out_of_range(field: &'static str, value: impl ToString) -> Self {
        Self::OutOfRange {
            field,
            value: value.to_string(),
        }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias for client results.
pub type TetherResult<T> = Result<T, TetherError>;
