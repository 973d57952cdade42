use lazy_static::lazy_static;
use prometheus::{
    Counter, Histogram, IntCounterVec, IntGaugeVec, register_counter, register_histogram,
    register_int_counter_vec, register_int_gauge_vec,
};

lazy_static! {
    pub static ref GATE_REQUESTS_TOTAL: Counter = register_counter!(
        "gatekeeper_requests_total",
        "Total requests seen by the gatekeeper"
    )
    .unwrap();
    pub static ref GATE_REJECTIONS: IntCounterVec = register_int_counter_vec!(
        "gatekeeper_rejections_total",
        "Requests rejected by the gatekeeper, by reason",
        &["reason"]
    )
    .unwrap();
    pub static ref RATE_LIMIT_RECORDS: IntGaugeVec = register_int_gauge_vec!(
        "gatekeeper_rate_limit_records",
        "Live rate limit records after the last sweep",
        &["family"]
    )
    .unwrap();
    pub static ref GATE_LATENCY: Histogram = register_histogram!(
        "gatekeeper_request_latency_seconds",
        "End-to-end latency of requests passing the gatekeeper"
    )
    .unwrap();
    pub static ref LEADS_SUBMITTED: IntCounterVec = register_int_counter_vec!(
        "leads_submitted_total",
        "Accepted lead form submissions, by form family",
        &["family"]
    )
    .unwrap();
}
