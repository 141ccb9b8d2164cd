//! Client library for the Courseforge orchestration API.
//!
//! Wraps the HTTP surface and its `{ ok, data | error }` envelope.

pub mod error;
pub mod http;

pub use error::ClientError;
pub use http::ApiClient;
