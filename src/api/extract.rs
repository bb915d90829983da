//! Request extractors.
//!
//! [`Inject`] and [`RequestScope`] read the request's scope instance that the
//! API middleware stored in the request extensions. [`ValidatedJson`] and
//! [`ValidatedQuery`] deserialize and then run `validator` rules, rejecting
//! with a 422 [`ApiError`].

use std::ops::Deref;
use std::sync::Arc;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use validator::Validate;

use super::errors::{deserialize_detail, json_error_detail, ApiError, ErrorDetail, Loc};
use crate::provider::ScopeHandle;
use crate::traits::Resolver;

/// Per-request data inserted by the API middleware.
#[derive(Clone, Debug)]
pub(crate) struct RequestContext {
    pub(crate) scope: ScopeHandle,
}

/// The request's `REQUEST` scope instance.
#[derive(Clone, Debug)]
pub struct RequestScope(pub ScopeHandle);

impl RequestScope {
    fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        parts
            .extensions
            .get::<RequestContext>()
            .map(|ctx| RequestScope(ctx.scope.clone()))
            .ok_or_else(|| ApiError::internal("request scope missing: serve the router returned by Api::start"))
    }
}

impl Deref for RequestScope {
    type Target = ScopeHandle;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts)
    }
}

/// A provider resolved from the request's scope.
///
/// ```rust,no_run
/// use scopewire::api::Inject;
/// use scopewire::Session;
///
/// async fn handler(Inject(session): Inject<Session>) -> &'static str {
///     let _conn = session.connection().await;
///     "ok"
/// }
/// ```
pub struct Inject<T>(pub Arc<T>);

impl<T> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for Inject<T>
where
    T: Send + Sync + 'static,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let scope = RequestScope::from_parts(parts)?;
        let value = scope.get::<T>().await?;
        Ok(Inject(value))
    }
}

/// JSON body that passed deserialization and `validator` rules.
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

impl<T> Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|mime| {
            let mime = mime.trim();
            mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json(req.headers()) {
            return Err(ApiError::Validation(vec![ErrorDetail::new(
                ["body"],
                "Expected request with `Content-Type: application/json`",
                "content_type",
            )]));
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            ApiError::Validation(vec![ErrorDetail::new(["body"], rejection.body_text(), "body_read")])
        })?;
        let value: T = serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::Validation(vec![json_error_detail(&err)]))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Query string that passed deserialization and `validator` rules.
#[derive(Debug, Clone)]
pub struct ValidatedQuery<T>(pub T);

impl<T> Deref for ValidatedQuery<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::try_from_uri(&parts.uri)
            .map_err(|rejection| ApiError::Validation(vec![deserialize_detail("query", &rejection.body_text())]))?;
        value
            .validate()
            .map_err(|errors| ApiError::Validation(super::errors::validation_details(&errors, vec![Loc::from("query")])))?;
        Ok(ValidatedQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_json_content_types() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(is_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/problem+json"));
        assert!(is_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json(&headers));
    }
}
