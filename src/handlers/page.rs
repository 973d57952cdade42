use axum::{
    http::{HeaderMap, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};

use crate::gatekeeper::{HEADER_NONCE, is_api_path};

// Minimal document shell. Real pages are rendered elsewhere; this only tags
// its inline script and style with the nonce the gatekeeper forwarded.
pub async fn page_handler(uri: Uri, headers: HeaderMap) -> Response {
    if is_api_path(uri.path()) {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }

    let Some(nonce) = headers.get(HEADER_NONCE).and_then(|v| v.to_str().ok()) else {
        tracing::error!(path = uri.path(), "page requested without a forwarded nonce");
        return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
    };

    Html(format!(
        "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
         <title>Listings</title>\
         <style nonce=\"{nonce}\">body{{margin:0;font-family:system-ui,sans-serif}}</style>\
         </head><body><div id=\"root\"></div>\
         <script nonce=\"{nonce}\">document.documentElement.dataset.ready=\"1\";</script>\
         </body></html>"
    ))
    .into_response()
}
