//! Per-request counter keyed on the matched route template to keep label
//! cardinality bounded.

use axum::{extract::MatchedPath, extract::Request, middleware::Next, response::Response};

use crate::services::metrics::{ERRORS_TOTAL, HTTP_REQUESTS_TOTAL};

pub async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, status.as_str()])
        .inc();
    if status.is_server_error() {
        ERRORS_TOTAL.with_label_values(&["http_5xx"]).inc();
    }

    response
}
