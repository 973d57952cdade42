use axum::{
    Extension, Json,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::error::attach_rate_limit_headers;
use crate::metrics::LEADS_SUBMITTED;
use crate::models::{ClientIp, ContactRequest, InquiryRequest, LeadReceipt};
use crate::rate_limit::{Quota, RateLimitStore};
use crate::state::AppState;
use crate::store::StoreError;

const MAX_NAME: usize = 100;
const MAX_EMAIL: usize = 254;
const MAX_PHONE: usize = 32;
const MAX_MESSAGE: usize = 5000;

#[derive(Debug, Error)]
pub enum LeadError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("too many submissions, try again later")]
    RateLimited { quota: Quota, retry_after_secs: u64 },
    #[error("could not save submission")]
    Store(#[from] StoreError),
}

impl IntoResponse for LeadError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(_) => {
                let body = Json(json!({ "error": self.to_string() }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            Self::RateLimited { quota, retry_after_secs } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": self.to_string() })),
                )
                    .into_response();
                attach_rate_limit_headers(response.headers_mut(), &quota);
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            Self::Store(ref e) => {
                tracing::error!(error = %e, "lead submission could not be stored");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": self.to_string() })))
                    .into_response()
            }
        }
    }
}

type LeadResponse = Result<(StatusCode, HeaderMap, Json<LeadReceipt>), LeadError>;

fn admit(store: &RateLimitStore, ip: &str) -> Result<(), LeadError> {
    if store.admit(ip) {
        return Ok(());
    }
    tracing::warn!(family = store.family(), ip, "lead form rate limit hit");
    Err(LeadError::RateLimited {
        quota: Quota {
            allowed: false,
            limit: store.limit(),
            remaining: 0,
            reset_at_ms: store.reset_at(ip),
        },
        retry_after_secs: store.window().as_secs(),
    })
}

fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && email.len() <= MAX_EMAIL
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
}

fn validate_contact(
    name: &str,
    email: &str,
    phone: Option<&str>,
    message: &str,
) -> Result<(), LeadError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME {
        return Err(LeadError::Validation("name is required (max 100 characters)"));
    }
    if !validate_email(email.trim()) {
        return Err(LeadError::Validation("a valid email address is required"));
    }
    if phone.is_some_and(|p| p.chars().count() > MAX_PHONE) {
        return Err(LeadError::Validation("phone number is too long"));
    }
    let message = message.trim();
    if message.is_empty() || message.chars().count() > MAX_MESSAGE {
        return Err(LeadError::Validation("message is required (max 5000 characters)"));
    }
    Ok(())
}

fn accepted(store: &RateLimitStore, ip: &str, id: String) -> LeadResponse {
    LEADS_SUBMITTED.with_label_values(&[store.family()]).inc();
    tracing::info!(family = store.family(), id = %id, "lead received");

    let mut headers = HeaderMap::new();
    attach_rate_limit_headers(&mut headers, &store.quota(ip));
    Ok((StatusCode::CREATED, headers, Json(LeadReceipt { id, status: "received" })))
}

pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    Json(payload): Json<ContactRequest>,
) -> LeadResponse {
    admit(&state.contact_limiter, &ip)?;
    validate_contact(&payload.name, &payload.email, payload.phone.as_deref(), &payload.message)?;

    let id = state.documents.add(
        "contacts",
        json!({
            "name": payload.name.trim(),
            "email": payload.email.trim(),
            "phone": payload.phone,
            "message": payload.message.trim(),
        }),
    )?;
    accepted(&state.contact_limiter, &ip, id)
}

pub async fn inquiry_handler(
    State(state): State<Arc<AppState>>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    Json(payload): Json<InquiryRequest>,
) -> LeadResponse {
    admit(&state.inquiry_limiter, &ip)?;
    if payload.property_id.trim().is_empty() {
        return Err(LeadError::Validation("propertyId is required"));
    }
    validate_contact(&payload.name, &payload.email, payload.phone.as_deref(), &payload.message)?;

    let id = state.documents.add(
        "inquiries",
        json!({
            "propertyId": payload.property_id.trim(),
            "name": payload.name.trim(),
            "email": payload.email.trim(),
            "phone": payload.phone,
            "message": payload.message.trim(),
        }),
    )?;
    accepted(&state.inquiry_limiter, &ip, id)
}
