//! The per-request gate every inbound request passes before any handler.
//!
//! Check order is fixed and short-circuits on the first failure:
//! method, URL attack signatures, then for `/api/` paths the bot filter and
//! the API rate limit, then content type for mutating methods. A request
//! that gets through is forwarded with a fresh nonce, and its response is
//! decorated with the security headers, cache policy and CSP.
//!
//! The API rate limit is checked with a read-only peek at its place in the
//! order and only committed once the content-type check has passed, so a
//! 415 never spends quota.

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, Request, Uri,
        header::{CACHE_CONTROL, CONTENT_SECURITY_POLICY, CONTENT_TYPE, USER_AGENT},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{
    DecisionReason, GateRejection, HEADER_RATE_LIMIT_LIMIT, attach_rate_limit_headers,
};
use crate::filter::{
    attack_pattern, is_allowed_content_type, is_allowed_method, is_disallowed_bot,
    is_mutating_method,
};
use crate::metrics::{GATE_LATENCY, GATE_REJECTIONS, GATE_REQUESTS_TOTAL};
use crate::models::ClientIp;
use crate::rate_limit::Quota;
use crate::security_headers::{
    build_cache_control, build_csp, build_static_headers, generate_nonce,
};
use crate::state::AppState;

pub const HEADER_NONCE: HeaderName = HeaderName::from_static("x-nonce");

/// Loopback literal used when no IP-bearing header is present.
pub const FALLBACK_IP: &str = "127.0.0.1";

// priority order
const IP_HEADERS: [&str; 4] = ["cf-connecting-ip", "x-real-ip", "x-forwarded-for", "x-client-ip"];

/// What a request that passed the gate carries forward.
#[derive(Debug)]
pub struct GatekeeperDecision {
    pub reason: DecisionReason,
    pub nonce: String,
    pub headers: HeaderMap,
    pub quota: Option<Quota>,
}

pub fn is_api_path(path: &str) -> bool {
    path.starts_with("/api/")
}

pub fn extract_client_ip(headers: &HeaderMap) -> String {
    IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .filter_map(|raw| raw.split(',').next().map(str::trim))
        .find(|ip| !ip.is_empty())
        .unwrap_or(FALLBACK_IP)
        .to_string()
}

/// Runs every check in order. Returns the API quota when one was spent.
pub fn screen(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    ip: &str,
) -> Result<Option<Quota>, GateRejection> {
    if !is_allowed_method(method.as_str()) {
        return Err(GateRejection::MethodNotAllowed);
    }

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    if let Some(pattern) = attack_pattern(path_and_query) {
        tracing::warn!(pattern, path = path_and_query, ip, "attack signature matched");
        return Err(GateRejection::SuspiciousPattern);
    }

    let api = is_api_path(uri.path());
    if api {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if is_disallowed_bot(user_agent) {
            return Err(GateRejection::SuspiciousBot);
        }

        if !state.api_limiter.peek(ip).allowed {
            return Err(GateRejection::rate_limited(&state.api_limiter, ip));
        }
    }

    if is_mutating_method(method.as_str()) {
        // unreadable header bytes count as a present, unknown type
        let content_type = headers
            .get(CONTENT_TYPE)
            .map(|v| v.to_str().unwrap_or(""));
        if !is_allowed_content_type(content_type) {
            return Err(GateRejection::UnsupportedMediaType);
        }
    }

    if !api {
        return Ok(None);
    }

    // lost a race with another request since the peek
    if !state.api_limiter.admit(ip) {
        return Err(GateRejection::rate_limited(&state.api_limiter, ip));
    }
    Ok(Some(state.api_limiter.quota(ip)))
}

/// Headers every forwarded response gets, whatever the handler did.
pub fn compose_headers(
    path: &str,
    nonce: &str,
    report_uri: &str,
) -> Result<HeaderMap, GateRejection> {
    let mut headers = HeaderMap::new();
    for (name, value) in build_static_headers() {
        headers.insert(name, HeaderValue::from_static(value));
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(build_cache_control(path)));

    let csp = HeaderValue::from_str(&build_csp(nonce, report_uri)).map_err(|e| {
        tracing::error!(path, error = %e, "CSP header is not a valid header value");
        GateRejection::Internal
    })?;
    headers.insert(CONTENT_SECURITY_POLICY, csp);
    Ok(headers)
}

pub fn evaluate(
    state: &AppState,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    ip: &str,
) -> Result<GatekeeperDecision, GateRejection> {
    let quota = screen(state, method, uri, headers, ip)?;

    let nonce = generate_nonce().map_err(|e| {
        tracing::error!(path = uri.path(), ip, error = %e, "nonce generation failed");
        GateRejection::Internal
    })?;
    let headers = compose_headers(uri.path(), &nonce, &state.csp_report_uri)?;

    Ok(GatekeeperDecision {
        reason: DecisionReason::Ok,
        nonce,
        headers,
        quota,
    })
}

pub async fn gatekeeper_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    GATE_REQUESTS_TOTAL.inc();
    let start_time = Instant::now();

    let ip = extract_client_ip(request.headers());
    let decision = match evaluate(&state, request.method(), request.uri(), request.headers(), &ip) {
        Ok(decision) => decision,
        Err(rejection) => {
            let reason = rejection.reason().as_str();
            GATE_REJECTIONS.with_label_values(&[reason]).inc();
            tracing::warn!(reason, path = request.uri().path(), ip = %ip, "request rejected");
            return rejection.into_response();
        }
    };

    tracing::debug!(
        reason = decision.reason.as_str(),
        path = request.uri().path(),
        ip = %ip,
        "request admitted"
    );

    // base64 alphabet is always a valid header value
    if let Ok(value) = HeaderValue::from_str(&decision.nonce) {
        request.headers_mut().insert(HEADER_NONCE, value);
    }
    request.extensions_mut().insert(ClientIp(ip));

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    for (name, value) in decision.headers.iter() {
        headers.insert(name.clone(), value.clone());
    }
    // a handler with its own limiter family reports that family instead
    if let Some(quota) = decision.quota {
        if !headers.contains_key(HEADER_RATE_LIMIT_LIMIT) {
            attach_rate_limit_headers(headers, &quota);
        }
    }

    GATE_LATENCY.observe(start_time.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitSpec;
    use crate::error::{HEADER_RATE_LIMIT_REMAINING, HEADER_RATE_LIMIT_RESET};
    use crate::routes::build_router;
    use crate::store::MemoryDocumentStore;
    use axum::Router;
    use axum::http::{StatusCode, header::RETRY_AFTER};
    use tower::ServiceExt;

    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 Chrome/120.0";

    fn test_state(api_limit: u32) -> Arc<AppState> {
        Arc::new(AppState::new(
            LimitSpec::new(api_limit, 3600).unwrap(),
            LimitSpec::new(5, 900).unwrap(),
            LimitSpec::new(5, 900).unwrap(),
            Arc::new(MemoryDocumentStore::new()),
            "/api/csp-report".to_string(),
        ))
    }

    fn get(uri: &str, ip: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("GET")
            .header("user-agent", BROWSER)
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    async fn call(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    #[test]
    fn client_ip_priority() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), FALLBACK_IP);

        headers.insert("x-client-ip", HeaderValue::from_static("10.0.0.4"));
        assert_eq!(extract_client_ip(&headers), "10.0.0.4");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 10.0.0.3 , 172.16.0.1"));
        assert_eq!(extract_client_ip(&headers), "10.0.0.3");

        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_client_ip(&headers), "10.0.0.2");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(extract_client_ip(&headers), "10.0.0.1");

        headers.insert("cf-connecting-ip", HeaderValue::from_static("  "));
        assert_eq!(extract_client_ip(&headers), "10.0.0.2");
    }

    #[test]
    fn rejection_order_is_strict() {
        let state = test_state(1);
        let ip = "198.51.100.1";
        let uri: Uri = "/api/contact/../x".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));

        // bad method wins over everything
        assert_eq!(
            screen(&state, &Method::PATCH, &uri, &headers, ip),
            Err(GateRejection::MethodNotAllowed)
        );
        // then the pattern
        assert_eq!(
            screen(&state, &Method::POST, &uri, &headers, ip),
            Err(GateRejection::SuspiciousPattern)
        );
        // then the bot
        let uri: Uri = "/api/contact".parse().unwrap();
        assert_eq!(
            screen(&state, &Method::POST, &uri, &headers, ip),
            Err(GateRejection::SuspiciousBot)
        );
        // then the rate limit, before content type
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER));
        assert!(state.api_limiter.admit(ip));
        assert!(matches!(
            screen(&state, &Method::POST, &uri, &headers, ip),
            Err(GateRejection::RateLimited { .. })
        ));
        assert_eq!(
            screen(&state, &Method::POST, &uri, &headers, "198.51.100.2"),
            Err(GateRejection::UnsupportedMediaType)
        );
    }

    #[tokio::test]
    async fn forwarded_response_gets_full_header_set() {
        let app = build_router(test_state(100));
        let response = call(&app, get("/properties/42", "192.0.2.10")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
        assert_eq!(headers["cross-origin-opener-policy"], "same-origin");
        assert_eq!(headers["server"], "");
        assert_eq!(headers[CACHE_CONTROL], "public, max-age=0, must-revalidate");
        // not an API path: no quota headers
        assert!(!headers.contains_key(HEADER_RATE_LIMIT_LIMIT));

        let csp = headers[CONTENT_SECURITY_POLICY].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();

        // the nonce the page rendered with is the one in the CSP
        let start = body.find("nonce=\"").unwrap() + "nonce=\"".len();
        let nonce = &body[start..start + 16];
        assert_eq!(csp.matches(&format!("'nonce-{nonce}'")).count(), 2);
    }

    #[tokio::test]
    async fn every_request_gets_a_new_nonce() {
        let app = build_router(test_state(100));
        let a = call(&app, get("/", "192.0.2.11")).await;
        let b = call(&app, get("/", "192.0.2.11")).await;
        assert_ne!(a.headers()[CONTENT_SECURITY_POLICY], b.headers()[CONTENT_SECURITY_POLICY]);
    }

    #[tokio::test]
    async fn favicon_is_immutable_even_when_limited() {
        let state = test_state(1);
        let ip = "192.0.2.12";
        state.api_limiter.admit(ip);
        let app = build_router(state);

        let response = call(&app, get("/favicon.ico", ip)).await;
        assert_eq!(response.headers()[CACHE_CONTROL], "public, max-age=31536000, immutable");
    }

    #[tokio::test]
    async fn traversal_is_rejected_with_400() {
        let app = build_router(test_state(100));
        let response = call(&app, get("/api/contact/../../etc/passwd", "192.0.2.13")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scripted_clients_are_forbidden_on_api_paths_only() {
        let app = build_router(test_state(100));
        let scripted = |uri: &str| {
            Request::builder()
                .uri(uri)
                .header("user-agent", "python-requests/2.31")
                .body(Body::empty())
                .unwrap()
        };
        let response = call(&app, scripted("/api/csp-report")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = call(&app, scripted("/properties")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let googlebot = Request::builder()
            .uri("/api/csp-report")
            .method("POST")
            .header("user-agent", "Mozilla/5.0 (compatible; Googlebot/2.1)")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = call(&app, googlebot).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn unknown_methods_get_405() {
        let app = build_router(test_state(100));
        let request = Request::builder()
            .uri("/")
            .method("TRACE")
            .body(Body::empty())
            .unwrap();
        assert_eq!(call(&app, request).await.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn api_gate_limits_and_reports_quota() {
        let app = build_router(test_state(2));
        let ip = "192.0.2.14";

        let first = call(&app, get("/api/health-check", ip)).await;
        assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(first.headers()[HEADER_RATE_LIMIT_LIMIT], "2");
        assert_eq!(first.headers()[HEADER_RATE_LIMIT_REMAINING], "1");
        assert!(first.headers().contains_key(HEADER_RATE_LIMIT_RESET));
        // API paths are never cached
        assert_eq!(first.headers()[CACHE_CONTROL], crate::security_headers::CACHE_NO_STORE);

        let second = call(&app, get("/api/health-check", ip)).await;
        assert_eq!(second.headers()[HEADER_RATE_LIMIT_REMAINING], "0");

        let third = call(&app, get("/api/health-check", ip)).await;
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(third.headers()[RETRY_AFTER], "3600");
        assert_eq!(third.headers()[HEADER_RATE_LIMIT_LIMIT], "2");
        assert_eq!(third.headers()[HEADER_RATE_LIMIT_REMAINING], "0");

        // another client is unaffected
        let other = call(&app, get("/api/health-check", "192.0.2.15")).await;
        assert_ne!(other.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unsupported_media_type_spends_no_quota() {
        let state = test_state(100);
        let app = build_router(Arc::clone(&state));
        let ip = "192.0.2.16";

        let request = Request::builder()
            .uri("/api/contact")
            .method("POST")
            .header("user-agent", BROWSER)
            .header("x-forwarded-for", ip)
            .header("content-type", "application/xml")
            .body(Body::from("<lead/>"))
            .unwrap();
        let response = call(&app, request).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        assert_eq!(state.api_limiter.remaining(ip), 100);
        assert_eq!(state.contact_limiter.remaining(ip), 5);
    }
}
