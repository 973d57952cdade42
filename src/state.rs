use std::sync::Arc;
use crate::config::LimitSpec;
use crate::rate_limit::RateLimitStore;
use crate::store::DocumentStore;

// app's shared state

pub struct AppState {
    pub api_limiter: Arc<RateLimitStore>,     // page-level gate for /api/*
    pub contact_limiter: Arc<RateLimitStore>, // contact form submissions
    pub inquiry_limiter: Arc<RateLimitStore>, // property inquiry submissions
    pub documents: Arc<dyn DocumentStore>,
    pub csp_report_uri: String,
}

impl AppState {
    pub fn new(
        api: LimitSpec,
        contact: LimitSpec,
        inquiry: LimitSpec,
        documents: Arc<dyn DocumentStore>,
        csp_report_uri: String,
    ) -> Self {
        Self {
            api_limiter: Arc::new(RateLimitStore::new("api", api)),
            contact_limiter: Arc::new(RateLimitStore::new("contact", contact)),
            inquiry_limiter: Arc::new(RateLimitStore::new("inquiry", inquiry)),
            documents,
            csp_report_uri,
        }
    }

    pub fn limiters(&self) -> Vec<Arc<RateLimitStore>> {
        vec![
            Arc::clone(&self.api_limiter),
            Arc::clone(&self.contact_limiter),
            Arc::clone(&self.inquiry_limiter),
        ]
    }
}
