use ledgerline_core::error::ErrorCode;
use ledgerline_core::fields::FieldError;
use ledgerline_core::snapshot::SnapshotError;

use crate::api::ApiError;

/// Failures a sync task cannot turn into a notification.
///
/// API failures are normally reported through [`crate::notify::Notifier`]
/// instead; these are contract errors and a closed store.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("store is closed")]
    Closed,

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("fetched scope is invalid: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SyncError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Closed => ErrorCode::InternalUnexpected,
            Self::Field(err) => err.code(),
            Self::Snapshot(err) => err.code(),
            Self::Api(err) => err.code(),
        }
    }
}
