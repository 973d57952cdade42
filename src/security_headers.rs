//! Per-request security headers: CSP with a fresh nonce, fixed hardening
//! headers, and path-based cache policy.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
use rand::rngs::OsRng;

// 12 bytes encode to exactly 16 base64 chars with no padding.
// 96 bits is plenty for one response lifetime; widen here if that changes.
const NONCE_BYTES: usize = 12;

pub const CACHE_NO_STORE: &str = "no-store, no-cache, must-revalidate, proxy-revalidate";
pub const CACHE_IMMUTABLE: &str = "public, max-age=31536000, immutable";
pub const CACHE_REVALIDATE: &str = "public, max-age=0, must-revalidate";

const NO_STORE_PREFIXES: &[&str] = &["/admin", "/dashboard", "/profile", "/api"];
const STATIC_MARKERS: &[&str] = &["_next/static", "favicon.ico", "robots.txt", "sitemap.xml"];

const PERMISSIONS_POLICY: &str = "accelerometer=(), ambient-light-sensor=(), autoplay=(), \
battery=(), camera=(), display-capture=(), gyroscope=(), magnetometer=(), microphone=(), \
midi=(), payment=(), usb=(), interest-cohort=(), geolocation=(self)";

pub fn generate_nonce() -> Result<String, rand::Error> {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(STANDARD.encode(bytes))
}

pub fn build_csp(nonce: &str, report_uri: &str) -> String {
    let nonce = format!("'nonce-{nonce}'");
    let directives = [
        "default-src 'self'".to_string(),
        format!(
            "script-src 'self' {nonce} 'strict-dynamic' https://www.googletagmanager.com \
             https://www.google-analytics.com https://apis.google.com https://www.gstatic.com"
        ),
        format!("style-src 'self' {nonce} https://fonts.googleapis.com"),
        "img-src 'self' data: blob: https://firebasestorage.googleapis.com \
         https://lh3.googleusercontent.com https://www.google-analytics.com \
         https://maps.googleapis.com https://maps.gstatic.com"
            .to_string(),
        "font-src 'self' https://fonts.gstatic.com".to_string(),
        "connect-src 'self' https://*.googleapis.com https://*.firebaseio.com \
         wss://*.firebaseio.com https://www.google-analytics.com"
            .to_string(),
        "frame-src 'self' https://www.google.com https://*.firebaseapp.com".to_string(),
        "frame-ancestors 'self'".to_string(),
        "object-src 'none'".to_string(),
        "base-uri 'self'".to_string(),
        "form-action 'self'".to_string(),
        "manifest-src 'self'".to_string(),
        "worker-src 'self' blob:".to_string(),
        "child-src 'self' blob:".to_string(),
        "media-src 'self' https://firebasestorage.googleapis.com".to_string(),
        "prefetch-src 'self'".to_string(),
        "navigate-to 'self'".to_string(),
        "upgrade-insecure-requests".to_string(),
        "block-all-mixed-content".to_string(),
        format!("report-uri {report_uri}"),
    ];

    directives
        .iter()
        .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("; ")
}

/// no-store beats static, static beats the revalidate default.
pub fn build_cache_control(pathname: &str) -> &'static str {
    if NO_STORE_PREFIXES.iter().any(|p| pathname.starts_with(p)) {
        CACHE_NO_STORE
    } else if STATIC_MARKERS.iter().any(|m| pathname.contains(m)) {
        CACHE_IMMUTABLE
    } else {
        CACHE_REVALIDATE
    }
}

pub fn build_static_headers() -> [(&'static str, &'static str); 9] {
    [
        ("x-frame-options", "SAMEORIGIN"),
        ("x-content-type-options", "nosniff"),
        ("referrer-policy", "strict-origin-when-cross-origin"),
        ("strict-transport-security", "max-age=31536000; includeSubDomains; preload"),
        ("permissions-policy", PERMISSIONS_POLICY),
        ("cross-origin-embedder-policy", "require-corp"),
        ("cross-origin-opener-policy", "same-origin"),
        ("cross-origin-resource-policy", "same-origin"),
        ("server", ""),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_sixteen_base64_chars_and_fresh() {
        let a = generate_nonce().unwrap();
        let b = generate_nonce().unwrap();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/'));
        assert_ne!(a, b);
    }

    #[test]
    fn csp_carries_the_nonce_once_per_directive() {
        let nonce = generate_nonce().unwrap();
        let csp = build_csp(&nonce, "/api/csp-report");
        let needle = format!("'nonce-{nonce}'");
        assert_eq!(csp.matches(&needle).count(), 2);

        let script = csp.split("; ").find(|d| d.starts_with("script-src")).unwrap();
        let style = csp.split("; ").find(|d| d.starts_with("style-src")).unwrap();
        assert_eq!(script.matches(&needle).count(), 1);
        assert_eq!(style.matches(&needle).count(), 1);
    }

    #[test]
    fn csp_has_flags_and_report_uri_and_no_stray_whitespace() {
        let csp = build_csp("abc", "/api/csp-report");
        assert!(csp.contains("upgrade-insecure-requests"));
        assert!(csp.contains("block-all-mixed-content"));
        assert!(csp.ends_with("report-uri /api/csp-report"));
        assert!(csp.contains("object-src 'none'"));
        assert!(!csp.contains("  "));
        for directive in ["frame-ancestors", "manifest-src", "navigate-to", "prefetch-src"] {
            assert!(csp.contains(directive), "missing {directive}");
        }
    }

    #[test]
    fn cache_policy_precedence() {
        assert_eq!(build_cache_control("/favicon.ico"), CACHE_IMMUTABLE);
        assert_eq!(build_cache_control("/_next/static/chunks/app.js"), CACHE_IMMUTABLE);
        assert_eq!(build_cache_control("/sitemap.xml"), CACHE_IMMUTABLE);
        assert_eq!(build_cache_control("/admin/upload"), CACHE_NO_STORE);
        assert_eq!(build_cache_control("/dashboard"), CACHE_NO_STORE);
        assert_eq!(build_cache_control("/api/contact"), CACHE_NO_STORE);
        // no-store is checked before the static list
        assert_eq!(build_cache_control("/api/robots.txt"), CACHE_NO_STORE);
        assert_eq!(build_cache_control("/properties/42"), CACHE_REVALIDATE);
    }

    #[test]
    fn static_headers_are_complete() {
        let headers = build_static_headers();
        let get = |name: &str| headers.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);
        assert_eq!(get("x-frame-options"), Some("SAMEORIGIN"));
        assert_eq!(get("server"), Some(""));
        assert!(get("permissions-policy").unwrap().contains("geolocation=(self)"));
        assert!(get("strict-transport-security").unwrap().contains("preload"));
    }
}
