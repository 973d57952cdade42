use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::rate_limit::{Quota, RateLimitStore};

pub const HEADER_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_RATE_LIMIT_REMAINING: HeaderName =
    HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Why the gatekeeper let a request through or stopped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    Ok,
    MethodNotAllowed,
    SuspiciousPattern,
    SuspiciousBot,
    RateLimited,
    ContentTypeRejected,
    Internal,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::SuspiciousPattern => "suspicious_pattern",
            Self::SuspiciousBot => "suspicious_bot",
            Self::RateLimited => "rate_limited",
            Self::ContentTypeRejected => "content_type_rejected",
            Self::Internal => "internal",
        }
    }
}

/// Terminal gatekeeper outcomes. Bodies stay short and generic.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateRejection {
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("bad request")]
    SuspiciousPattern,
    #[error("forbidden")]
    SuspiciousBot,
    #[error("too many requests")]
    RateLimited { quota: Quota, retry_after_secs: u64 },
    #[error("unsupported media type")]
    UnsupportedMediaType,
    #[error("internal server error")]
    Internal,
}

impl GateRejection {
    /// 429 for `identifier`, advertising that store's own window.
    pub fn rate_limited(store: &RateLimitStore, identifier: &str) -> Self {
        Self::RateLimited {
            quota: Quota {
                allowed: false,
                limit: store.limit(),
                remaining: 0,
                reset_at_ms: store.reset_at(identifier),
            },
            retry_after_secs: store.window().as_secs(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::SuspiciousPattern => StatusCode::BAD_REQUEST,
            Self::SuspiciousBot => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn reason(&self) -> DecisionReason {
        match self {
            Self::MethodNotAllowed => DecisionReason::MethodNotAllowed,
            Self::SuspiciousPattern => DecisionReason::SuspiciousPattern,
            Self::SuspiciousBot => DecisionReason::SuspiciousBot,
            Self::RateLimited { .. } => DecisionReason::RateLimited,
            Self::UnsupportedMediaType => DecisionReason::ContentTypeRejected,
            Self::Internal => DecisionReason::Internal,
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let mut response = (self.status(), self.to_string()).into_response();
        if let Self::RateLimited { quota, retry_after_secs } = &self {
            attach_rate_limit_headers(response.headers_mut(), quota);
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }
        response
    }
}

pub fn attach_rate_limit_headers(headers: &mut HeaderMap, quota: &Quota) {
    headers.insert(HEADER_RATE_LIMIT_LIMIT, HeaderValue::from(quota.limit));
    headers.insert(HEADER_RATE_LIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(HEADER_RATE_LIMIT_RESET, HeaderValue::from(quota.reset_at_ms));
}
