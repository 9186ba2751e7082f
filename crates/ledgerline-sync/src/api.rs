//! The injected budget API client.
//!
//! Every request takes [`RequestOptions`] carrying its cancellation token and
//! timeout. Implementations check the token before sending and again before
//! returning, so a cancelled request never hands back a response.

use ledgerline_core::error::ErrorCode;
use ledgerline_core::fields::manager::{BulkCreatePayload, BulkDeletePayload, BulkUpdatePayload};
use ledgerline_core::model::{Fringe, Group, LineItem, Markup, ModelId, Scope, Totals};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::cancel::CancelToken;

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub cancel: CancelToken,
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub const fn new(cancel: CancelToken, timeout: Option<Duration>) -> Self {
        Self { cancel, timeout }
    }

    /// `Err(Cancelled)` once the token has fired.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Cancelled`] when the request was cancelled.
    pub fn check(&self) -> Result<(), ApiError> {
        if self.cancel.is_cancelled() {
            Err(ApiError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// List envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub count: usize,
}

impl<T> ListResponse<T> {
    #[must_use]
    pub fn new(data: Vec<T>) -> Self {
        Self {
            count: data.len(),
            data,
        }
    }
}

/// The scope entity as returned after a bulk mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BulkParent {
    pub id: ModelId,
    #[serde(flatten)]
    pub totals: Totals,
}

/// Bulk mutation envelope: the updated scope and the touched children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    pub parent: BulkParent,
    #[serde(default)]
    pub children: Vec<LineItem>,
}

/// Which collection a read request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Children,
    Groups,
    Markups,
    Fringes,
}

impl Resource {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Children => "children",
            Self::Groups => "groups",
            Self::Markups => "markups",
            Self::Fringes => "fringes",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("no API base URL configured")]
    NotConfigured,
}

impl ApiError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Cancelled => ErrorCode::RequestCancelled,
            Self::Timeout => ErrorCode::RequestTimedOut,
            Self::NotConfigured => ErrorCode::ConfigParseError,
            Self::Status { .. } | Self::Transport(_) | Self::Decode(_) => ErrorCode::RequestFailed,
        }
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Client for the budget API, scoped per call.
pub trait BudgetApi: Send + Sync {
    /// # Errors
    ///
    /// Any [`ApiError`].
    fn list_children(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<LineItem>, ApiError>;

    /// # Errors
    ///
    /// Any [`ApiError`].
    fn list_groups(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Group>, ApiError>;

    /// # Errors
    ///
    /// Any [`ApiError`].
    fn list_markups(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Markup>, ApiError>;

    /// # Errors
    ///
    /// Any [`ApiError`].
    fn list_fringes(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Fringe>, ApiError>;

    /// Create children; the response lists them in request order.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`].
    fn bulk_create(
        &self,
        scope: Scope,
        payload: &BulkCreatePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError>;

    /// # Errors
    ///
    /// Any [`ApiError`].
    fn bulk_update(
        &self,
        scope: Scope,
        payload: &BulkUpdatePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError>;

    /// # Errors
    ///
    /// Any [`ApiError`].
    fn bulk_delete(
        &self,
        scope: Scope,
        payload: &BulkDeletePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError>;
}
