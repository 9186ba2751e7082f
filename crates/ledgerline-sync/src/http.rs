//! Blocking HTTP client for the budget API.

use ledgerline_core::config::SyncConfig;
use ledgerline_core::fields::manager::{BulkCreatePayload, BulkDeletePayload, BulkUpdatePayload};
use ledgerline_core::model::{Fringe, Group, LineItem, Markup, Scope};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::error::Error as _;
use std::io;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::api::{ApiError, BudgetApi, BulkResponse, ListResponse, RequestOptions, Resource};

const USER_AGENT: &str = concat!("ledgerline/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpApi {
    agent: ureq::Agent,
    base_url: String,
    token: Option<String>,
}

impl HttpApi {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            base_url,
            token,
        }
    }

    /// Build a client from the `[sync]` config section. The token is read
    /// from the environment variable named by `token_env`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotConfigured`] when no base URL is set.
    pub fn from_config(config: &SyncConfig) -> Result<Self, ApiError> {
        let Some(base_url) = config.base_url.as_deref() else {
            return Err(ApiError::NotConfigured);
        };
        let token = std::env::var(&config.token_env).ok().filter(|t| !t.is_empty());
        Ok(Self::new(
            base_url,
            token,
            Duration::from_millis(config.request_timeout_ms),
        ))
    }

    fn url(&self, scope: Scope, tail: &str) -> String {
        format!("{}/v1/{}/{tail}/", self.base_url, scope.path())
    }

    fn request(&self, method: &str, url: &str, options: &RequestOptions) -> ureq::Request {
        let mut request = self
            .agent
            .request(method, url)
            .set("Accept", "application/json");
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    #[instrument(level = "debug", skip(self, options), err)]
    fn get<T: DeserializeOwned>(&self, url: &str, options: &RequestOptions) -> Result<T, ApiError> {
        options.check()?;
        let response = self.request("GET", url, options).call().map_err(map_error)?;
        let body = response
            .into_json::<T>()
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        options.check()?;
        Ok(body)
    }

    #[instrument(level = "debug", skip(self, payload, options), err)]
    fn patch<B: Serialize>(
        &self,
        url: &str,
        payload: &B,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError> {
        options.check()?;
        let response = self
            .request("PATCH", url, options)
            .send_json(payload)
            .map_err(map_error)?;
        let body = response
            .into_json::<BulkResponse>()
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        options.check()?;
        debug!(children = body.children.len(), "bulk request applied");
        Ok(body)
    }

    fn list<T: DeserializeOwned>(
        &self,
        scope: Scope,
        resource: Resource,
        options: &RequestOptions,
    ) -> Result<ListResponse<T>, ApiError> {
        self.get(&self.url(scope, resource.path()), options)
    }
}

fn map_error(err: ureq::Error) -> ApiError {
    match err {
        ureq::Error::Status(status, response) => ApiError::Status {
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => {
            let timed_out = transport
                .source()
                .and_then(|source| source.downcast_ref::<io::Error>())
                .is_some_and(|io| matches!(io.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock));
            if timed_out {
                ApiError::Timeout
            } else {
                ApiError::Transport(transport.to_string())
            }
        }
    }
}

impl BudgetApi for HttpApi {
    fn list_children(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<LineItem>, ApiError> {
        self.list(scope, Resource::Children, options)
    }

    fn list_groups(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Group>, ApiError> {
        self.list(scope, Resource::Groups, options)
    }

    fn list_markups(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Markup>, ApiError> {
        self.list(scope, Resource::Markups, options)
    }

    fn list_fringes(
        &self,
        scope: Scope,
        options: &RequestOptions,
    ) -> Result<ListResponse<Fringe>, ApiError> {
        self.list(scope, Resource::Fringes, options)
    }

    fn bulk_create(
        &self,
        scope: Scope,
        payload: &BulkCreatePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError> {
        self.patch(&self.url(scope, "bulk-create-children"), payload, options)
    }

    fn bulk_update(
        &self,
        scope: Scope,
        payload: &BulkUpdatePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError> {
        self.patch(&self.url(scope, "bulk-update-children"), payload, options)
    }

    fn bulk_delete(
        &self,
        scope: Scope,
        payload: &BulkDeletePayload,
        options: &RequestOptions,
    ) -> Result<BulkResponse, ApiError> {
        self.patch(&self.url(scope, "bulk-delete-children"), payload, options)
    }
}
