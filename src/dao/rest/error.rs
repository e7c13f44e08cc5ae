//! Error types of the REST remote source.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::remote::RemoteError;

/// Convenient result alias returning [`RestError`] failures.
pub type RestResult<T> = Result<T, RestError>;

/// Failures that can occur while talking to the REST data service.
#[derive(Debug, Error)]
pub enum RestError {
    /// No base URL was configured for the remote service.
    #[error("remote base URL is not configured")]
    MissingBaseUrl,
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build REST client")]
    ClientBuilder {
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send request to `{path}`")]
    RequestSend {
        /// Table the request targeted.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The service answered with an unexpected status code.
    #[error("unexpected response status {status} for `{path}`")]
    RequestStatus {
        /// Table the request targeted.
        path: String,
        /// Status returned by the service.
        status: StatusCode,
    },
    /// Response payload could not be decoded.
    #[error("failed to decode response for `{path}`")]
    DecodeResponse {
        /// Table the request targeted.
        path: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// A singleton row was expected but the table returned none.
    #[error("table `{table}` returned no row")]
    MissingRow {
        /// Table that came back empty.
        table: &'static str,
    },
}

impl From<RestError> for RemoteError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::MissingRow { table } => RemoteError::MissingRow(table),
            other => RemoteError::unavailable(other.to_string(), other),
        }
    }
}
