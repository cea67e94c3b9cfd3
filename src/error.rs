//! Stable error taxonomy shared across the pipeline.
//!
//! Every variant corresponds to one row of the error table in the gateway
//! design: a stable string identifier, an HTTP status, and whether the
//! failure is retryable against another target.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// Top-level gateway error, returned from fallible construction/startup paths.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Gateway failed to initialize a subsystem.
    #[error("initialization error: {0}")]
    Init(String),

    /// Server-level runtime error (bind failure, accept loop death).
    #[error("server error: {0}")]
    Server(String),
}

/// A single request's pipeline error, carrying the stable identifier used
/// in the JSON error body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No service descriptor matches `(host, path)`.
    #[error("errors.service.not.found")]
    ServiceNotFound,

    /// Client IP matched a blacklist entry, or failed a whitelist.
    #[error("errors.ip.blocked")]
    IpBlocked,

    /// A restriction's `forbidden` entry matched.
    #[error("errors.restriction.forbidden")]
    RestrictionForbidden,

    /// A restriction's `notFound` entry matched.
    #[error("errors.restriction.not.found")]
    RestrictionNotFound,

    /// Private endpoint hit with no credentials at all.
    #[error("errors.auth.required")]
    AuthRequired,

    /// A JWT was present but failed verification.
    #[error("error.bad.token")]
    BadToken,

    /// API key missing, disabled, or group mismatch.
    #[error("errors.apikey.invalid")]
    ApiKeyInvalid,

    /// API key failed a routing constraint (tags/metadata).
    #[error("errors.apikey.routing")]
    ApiKeyRouting,

    /// A quota dimension (second/day/month) was exceeded.
    #[error("errors.quota.exceeded")]
    QuotaExceeded {
        /// Which dimension tripped: "second", "day", or "month".
        dimension: &'static str,
    },

    /// Upstream TCP/TLS connect failed.
    #[error("errors.upstream.connect")]
    UpstreamConnect,

    /// A configured timeout tier expired before completion.
    #[error("errors.upstream.timeout")]
    UpstreamTimeout,

    /// The state-response token was missing, malformed, expired, or replayed.
    #[error("errors.upstream.token.invalid")]
    UpstreamTokenInvalid,

    /// Anything else: unhandled invariant violation.
    #[error("errors.internal")]
    Internal,
}

impl PipelineError {
    /// Stable string identifier returned in the JSON body's `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ServiceNotFound => "errors.service.not.found",
            Self::IpBlocked => "errors.ip.blocked",
            Self::RestrictionForbidden => "errors.restriction.forbidden",
            Self::RestrictionNotFound => "errors.restriction.not.found",
            Self::AuthRequired => "errors.auth.required",
            Self::BadToken => "error.bad.token",
            Self::ApiKeyInvalid => "errors.apikey.invalid",
            Self::ApiKeyRouting => "errors.apikey.routing",
            Self::QuotaExceeded { .. } => "errors.quota.exceeded",
            Self::UpstreamConnect => "errors.upstream.connect",
            Self::UpstreamTimeout => "errors.upstream.timeout",
            Self::UpstreamTokenInvalid => "errors.upstream.token.invalid",
            Self::Internal => "errors.internal",
        }
    }

    /// HTTP status mapped from the error table.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ServiceNotFound => StatusCode::NOT_FOUND,
            Self::IpBlocked => StatusCode::FORBIDDEN,
            Self::RestrictionForbidden => StatusCode::FORBIDDEN,
            Self::RestrictionNotFound => StatusCode::NOT_FOUND,
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::BadToken => StatusCode::BAD_REQUEST,
            Self::ApiKeyInvalid => StatusCode::UNAUTHORIZED,
            Self::ApiKeyRouting => StatusCode::NOT_FOUND,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamConnect => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::BAD_GATEWAY,
            Self::UpstreamTokenInvalid => StatusCode::BAD_GATEWAY,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the pipeline may retry this failure against another target.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamConnect | Self::UpstreamTimeout | Self::UpstreamTokenInvalid
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota_dimension: Option<&'static str>,
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let quota_dimension = match &self {
            Self::QuotaExceeded { dimension } => Some(*dimension),
            _ => None,
        };
        let body = ErrorBody {
            error: self.code(),
            quota_dimension,
        };
        (status, Json(body)).into_response()
    }
}
