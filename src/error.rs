//! Error types for the dashboard bridge.
//!
//! Every variant here is fatal for the request that produced it. A query the
//! analytics engine refuses to run is not an error: it comes back as
//! [`crate::tableau::vds::QueryOutcome::Rejected`] and is shown to the user.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use thiserror::Error;
use tracing::error;

use crate::routes::ErrorResponse;

pub type BridgeResult<T> = Result<T, BridgeError>;

/// The step of the metric → definition → datasource chain that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionHop {
    Metric,
    Definition,
    Datasource,
}

impl fmt::Display for ResolutionHop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResolutionHop::Metric => "metric",
            ResolutionHop::Definition => "definition",
            ResolutionHop::Datasource => "datasource",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    /// The connected-app assertion could not be built or signed
    #[error("signing error: {0}")]
    Signing(String),

    /// Sign-in to the REST API failed or returned no credentials
    #[error("authentication error: {0}")]
    Authentication(String),

    /// One hop of the metric resolution chain came back without the expected identifier
    #[error("resolution error at {hop} hop: {reason}")]
    Resolution { hop: ResolutionHop, reason: String },

    /// The datasource metadata envelope was malformed
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Network, timeout or HTTP-level failure on an outbound call
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BridgeError {
    pub fn resolution(hop: ResolutionHop, reason: impl Into<String>) -> Self {
        BridgeError::Resolution {
            hop,
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Signing(_) | BridgeError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            BridgeError::Authentication(_)
            | BridgeError::Resolution { .. }
            | BridgeError::Metadata(_)
            | BridgeError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BridgeError::Transport(format!("request timed out: {}", e))
        } else {
            BridgeError::Transport(e.to_string())
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);
        let status = self.status_code();
        (
            status,
            Json(ErrorResponse {
                error: "Tableau request failed".to_string(),
            }),
        )
            .into_response()
    }
}
