//! HTTP surface built on axum.
//!
//! [`ApiBuilder`] merges routers into an [`Api`]. Starting the API opens the
//! `LIFESPAN` scope instance; a middleware then opens one `REQUEST` instance
//! per call, which handlers reach through the [`Inject`] and [`RequestScope`]
//! extractors.
//!
//! The `REQUEST` instance closes as failed when the response is a 5xx or
//! carries [`RequestFailed`]; every other response, including a bare 4xx
//! status, closes it as completed and commits the request's session.

pub mod builder;
pub mod errors;
pub mod extract;

pub use builder::{Api, ApiBuilder, RunningApi};
pub use errors::{ApiError, ErrorDetail, Loc, RequestFailed};
pub use extract::{Inject, RequestScope, ValidatedJson, ValidatedQuery};
