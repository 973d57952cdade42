use axum::{Json, http::StatusCode};
use serde_json::Value;

fn field<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(|v| v.as_str()).unwrap_or("-")
}

// Reporting sink for CSP violations. Only JSON bodies reach it: browsers that
// post `application/csp-report` are turned away with 415 by the gatekeeper's
// content-type allow-list before this runs.
pub async fn csp_report_handler(Json(report): Json<Value>) -> StatusCode {
    let body = report.get("csp-report").unwrap_or(&report);
    let blocked_uri = field(body, "blocked-uri");
    let directive = field(body, "violated-directive");
    let document_uri = field(body, "document-uri");

    tracing::warn!(blocked_uri, directive, document_uri, "csp violation reported");
    StatusCode::NO_CONTENT
}
