//! HTTP error bodies.
//!
//! Every error response has the shape `{"errors": [{"loc": [...], "msg": ...,
//! "type": ...}]}`. Validation failures answer 422; everything else answers
//! 500 with a generic message unless the application runs with `debug`.
//! Entries never echo the rejected input.
//!
//! Every [`ApiError`] response carries the [`RequestFailed`] marker, so its
//! `REQUEST` scope closes as failed and the request's session rolls back.

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, IntoResponseParts, Response, ResponseParts};
use axum::Json;
use serde::Serialize;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::error::DiError;

/// One segment of an error location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Loc {
    Key(String),
    Index(usize),
}

impl From<&str> for Loc {
    fn from(key: &str) -> Self {
        Loc::Key(key.to_string())
    }
}

impl From<String> for Loc {
    fn from(key: String) -> Self {
        Loc::Key(key)
    }
}

impl From<usize> for Loc {
    fn from(index: usize) -> Self {
        Loc::Index(index)
    }
}

/// One entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub loc: Vec<Loc>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ErrorDetail {
    pub fn new<L: Into<Loc>>(loc: impl IntoIterator<Item = L>, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc: loc.into_iter().map(Into::into).collect(),
            msg: msg.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    errors: &'a [ErrorDetail],
}

/// Detail of an internal error, attached to the response so the request
/// middleware can expose it when running with `debug`.
#[derive(Debug, Clone)]
pub(crate) struct InternalDetail(pub(crate) String);

/// Response marker that closes the request's `REQUEST` scope as
/// [`ScopeExit::Failed`](crate::ScopeExit::Failed) whatever the status.
///
/// 5xx responses always fail the scope. Any other response commits unless it
/// carries this marker:
///
/// ```rust
/// use axum::http::StatusCode;
/// use scopewire::api::RequestFailed;
///
/// async fn reserve() -> (RequestFailed, StatusCode) {
///     // writes made so far in this request are rolled back
///     (RequestFailed, StatusCode::CONFLICT)
/// }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFailed;

impl IntoResponseParts for RequestFailed {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

const INTERNAL_MESSAGE: &str = "Internal Server Error";

/// Errors returned by handlers and extractors.
#[derive(Debug)]
pub enum ApiError {
    /// 422 with the given entries
    Validation(Vec<ErrorDetail>),
    /// 500; the detail is shown only in debug mode
    Internal(String),
}

impl ApiError {
    pub fn internal(err: impl fmt::Display) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Validation(details) => write!(f, "{} validation error(s)", details.len()),
            ApiError::Internal(detail) => write!(f, "internal error: {detail}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<DiError> for ApiError {
    fn from(err: DiError) -> Self {
        ApiError::internal(err)
    }
}

impl From<crate::database::SessionError> for ApiError {
    fn from(err: crate::database::SessionError) -> Self {
        ApiError::internal(err)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::internal(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(validation_details(&errors, vec![Loc::from("body")]))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = match self {
            ApiError::Validation(details) => render(StatusCode::UNPROCESSABLE_ENTITY, &details),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                let mut response = internal_response(INTERNAL_MESSAGE);
                response.extensions_mut().insert(InternalDetail(detail));
                response
            }
        };
        response.extensions_mut().insert(RequestFailed);
        response
    }
}

fn render(status: StatusCode, details: &[ErrorDetail]) -> Response {
    (status, Json(ErrorBody { errors: details })).into_response()
}

/// A 500 in the common error shape.
pub(crate) fn internal_response(msg: &str) -> Response {
    let detail = ErrorDetail::new(Vec::<Loc>::new(), msg, "internal_error");
    render(StatusCode::INTERNAL_SERVER_ERROR, &[detail])
}

/// Flattens `validator` errors into entries, sorted by location.
pub fn validation_details(errors: &ValidationErrors, prefix: Vec<Loc>) -> Vec<ErrorDetail> {
    let mut details = Vec::new();
    collect(errors, &prefix, &mut details);
    details.sort_by(|a, b| format!("{:?}", a.loc).cmp(&format!("{:?}", b.loc)));
    details
}

fn collect(errors: &ValidationErrors, prefix: &[Loc], out: &mut Vec<ErrorDetail>) {
    for (field, kind) in errors.errors() {
        let mut loc = prefix.to_vec();
        loc.push(Loc::Key(field.to_string()));
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let msg = error
                        .message
                        .clone()
                        .unwrap_or_else(|| Cow::Owned(default_message(&error.code)));
                    out.push(ErrorDetail {
                        loc: loc.clone(),
                        msg: msg.into_owned(),
                        kind: error.code.to_string(),
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => collect(nested, &loc, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    let mut item_loc = loc.clone();
                    item_loc.push(Loc::Index(*index));
                    collect(nested, &item_loc, out);
                }
            }
        }
    }
}

fn default_message(code: &str) -> String {
    match code {
        "length" => "Value has an invalid length".to_string(),
        "range" => "Value is out of range".to_string(),
        "email" => "Value is not a valid email address".to_string(),
        "url" => "Value is not a valid URL".to_string(),
        "required" => "Field required".to_string(),
        other => format!("Value error, {other}"),
    }
}

/// Turns a serde_json failure into an entry without echoing the input.
pub fn json_error_detail(err: &serde_json::Error) -> ErrorDetail {
    use serde_json::error::Category;

    match err.classify() {
        Category::Syntax | Category::Eof | Category::Io => {
            ErrorDetail::new(["body"], "JSON decode error", "json_invalid")
        }
        Category::Data => deserialize_detail("body", &err.to_string()),
    }
}

/// Classifies a serde deserialization message (serde_json or
/// serde_urlencoded wording) into an entry rooted at `root`.
pub(crate) fn deserialize_detail(root: &str, message: &str) -> ErrorDetail {
    let message = strip_position(message);

    if let Some(field) = backticked_after(message, "missing field ") {
        return ErrorDetail::new([root.to_string(), field], "Field required", "missing");
    }
    if let Some(field) = backticked_after(message, "unknown field ") {
        return ErrorDetail::new([root.to_string(), field], "Extra inputs are not permitted", "extra_forbidden");
    }
    if let Some(expected) = expected_after(message, "invalid type:") {
        return ErrorDetail::new([root], format!("Input should be {expected}"), "type_error");
    }
    if let Some(expected) = expected_after(message, "invalid value:") {
        return ErrorDetail::new([root], format!("Input should be {expected}"), "value_error");
    }
    if let Some(expected) = expected_after(message, "invalid length") {
        return ErrorDetail::new([root], format!("Input should be {expected}"), "value_error");
    }
    ErrorDetail::new([root], "Invalid input", "value_error")
}

fn strip_position(message: &str) -> &str {
    match message.rfind(" at line ") {
        Some(index) => &message[..index],
        None => message,
    }
}

fn backticked_after(message: &str, marker: &str) -> Option<String> {
    let rest = &message[message.find(marker)? + marker.len()..];
    let rest = rest.strip_prefix('`')?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

fn expected_after<'a>(message: &'a str, marker: &str) -> Option<&'a str> {
    if !message.contains(marker) {
        return None;
    }
    let index = message.rfind(", expected ")?;
    Some(&message[index + ", expected ".len()..])
}
