//! REST client for the record backend.
//!
//! Uses `reqwest` with a shared connection pool. Every request optionally
//! carries a user's auth token; responses are mapped onto [`BackendError`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::config::BackendConfig;

use super::types::{ApiErrorBody, AuthResponse, ListResult, collections};
use super::{BackendError, Identity};

/// Largest page size the backend accepts.
pub const MAX_PER_PAGE: u32 = 500;

/// Parameters for a list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub expand: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            expand: None,
            page: 1,
            per_page: 30,
        }
    }
}

impl ListQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    #[must_use]
    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    #[must_use]
    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page.max(1);
        self.per_page = per_page.clamp(1, MAX_PER_PAGE);
        self
    }

    /// Query string pairs in the backend's naming.
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("perPage", self.per_page.to_string()),
        ];
        if let Some(filter) = &self.filter {
            pairs.push(("filter", filter.clone()));
        }
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.clone()));
        }
        if let Some(expand) = &self.expand {
            pairs.push(("expand", expand.clone()));
        }
        pairs
    }
}

/// Client for the record backend's REST API.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct RecordClient {
    inner: Arc<RecordClientInner>,
}

struct RecordClientInner {
    client: reqwest::Client,
    base_url: String,
}

impl RecordClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Config` if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| BackendError::Config(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(RecordClientInner {
                client,
                base_url: config.url.as_str().trim_end_matches('/').to_string(),
            }),
        })
    }

    fn records_url(&self, collection: &str) -> String {
        format!(
            "{}/api/collections/{collection}/records",
            self.inner.base_url
        )
    }

    fn request(&self, method: Method, url: &str, auth: Option<&Identity>) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match auth {
            Some(identity) => builder.header("Authorization", identity.token().expose_secret()),
            None => builder,
        }
    }

    /// Authenticate a user by email and password.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Api` (status 400) for bad credentials, or any
    /// transport error.
    #[instrument(skip(self, password))]
    pub async fn auth_with_password(
        &self,
        identity: &str,
        password: &SecretString,
    ) -> Result<AuthResponse, BackendError> {
        #[derive(Serialize)]
        struct Body<'a> {
            identity: &'a str,
            password: &'a str,
        }

        let url = format!(
            "{}/api/collections/{}/auth-with-password",
            self.inner.base_url,
            collections::USERS
        );
        let request = self.request(Method::POST, &url, None).json(&Body {
            identity,
            password: password.expose_secret(),
        });
        self.send_json(request).await
    }

    /// List records from a collection.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` on transport, status or parse failure.
    #[instrument(skip(self, auth), fields(filter = query.filter.as_deref()))]
    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        query: &ListQuery,
        auth: Option<&Identity>,
    ) -> Result<ListResult<T>, BackendError> {
        let request = self
            .request(Method::GET, &self.records_url(collection), auth)
            .query(&query.pairs());
        self.send_json(request).await
    }

    /// Fetch one record by ID.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the record does not exist.
    #[instrument(skip(self, auth))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
        auth: Option<&Identity>,
    ) -> Result<T, BackendError> {
        let url = format!("{}/{id}", self.records_url(collection));
        self.send_json(self.request(Method::GET, &url, auth)).await
    }

    /// Create a record.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` on validation, transport or parse failure.
    #[instrument(skip(self, body, auth))]
    pub async fn create<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        collection: &str,
        body: &B,
        auth: Option<&Identity>,
    ) -> Result<T, BackendError> {
        let request = self
            .request(Method::POST, &self.records_url(collection), auth)
            .json(body);
        self.send_json(request).await
    }

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` on transport or status failure.
    #[instrument(skip(self, auth))]
    pub async fn delete(
        &self,
        collection: &str,
        id: &str,
        auth: Option<&Identity>,
    ) -> Result<(), BackendError> {
        let url = format!("{}/{id}", self.records_url(collection));
        let response = self.request(Method::DELETE, &url, auth).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let retry_after = retry_after(response.headers());
        let body = response.text().await?;
        Err(map_error_status(status, retry_after, &body))
    }

    /// Send a request and parse a JSON success body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response.text().await?;

        if !status.is_success() {
            return Err(map_error_status(status, retry_after, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }
}

/// Seconds from a `Retry-After` header, when given as a number.
fn retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Map a non-success status and body onto a `BackendError`.
fn map_error_status(status: StatusCode, retry_after: Option<u64>, body: &str) -> BackendError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    debug!(status = %status, message = %message, "Backend returned error status");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
        StatusCode::NOT_FOUND => BackendError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited(retry_after.unwrap_or(1)),
        _ => BackendError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_pairs() {
        let query = ListQuery::new()
            .filter(Some("user = \"u1\"".to_string()))
            .sort("-created")
            .expand("product")
            .page(0, 10_000);
        let pairs = query.pairs();
        assert!(pairs.contains(&("page", "1".to_string())));
        assert!(pairs.contains(&("perPage", MAX_PER_PAGE.to_string())));
        assert!(pairs.contains(&("filter", "user = \"u1\"".to_string())));
        assert!(pairs.contains(&("sort", "-created".to_string())));
        assert!(pairs.contains(&("expand", "product".to_string())));
    }

    #[test]
    fn test_list_query_defaults_omit_optional_pairs() {
        let pairs = ListQuery::new().pairs();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_map_error_status_parses_body() {
        let err = map_error_status(
            StatusCode::BAD_REQUEST,
            None,
            r#"{"code":400,"message":"Failed to authenticate.","data":{}}"#,
        );
        assert!(matches!(
            err,
            BackendError::Api { status: 400, ref message } if message == "Failed to authenticate."
        ));
    }

    #[test]
    fn test_map_error_status_variants() {
        assert!(matches!(
            map_error_status(StatusCode::UNAUTHORIZED, None, "nope"),
            BackendError::Unauthorized(_)
        ));
        assert!(matches!(
            map_error_status(StatusCode::NOT_FOUND, None, "{}"),
            BackendError::NotFound(_)
        ));
        assert!(matches!(
            map_error_status(StatusCode::TOO_MANY_REQUESTS, None, ""),
            BackendError::RateLimited(1)
        ));
    }

    #[test]
    fn test_rate_limit_uses_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "42".parse().unwrap());
        let err = map_error_status(StatusCode::TOO_MANY_REQUESTS, retry_after(&headers), "");
        assert!(matches!(err, BackendError::RateLimited(42)));

        // HTTP-date form is not parsed; the default applies.
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }
}
