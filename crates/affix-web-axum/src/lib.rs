use affix_core::Headers;
use affix_responder::WebhookProcessor;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use bytes::Bytes;

#[derive(Clone)]
pub struct AppState {
    pub processor: WebhookProcessor,
}

/// Axum-specific header converter
pub fn to_generic_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                v.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect()
}

/// Axum-specific response converter
pub fn from_webhook_response(response: affix_core::WebhookResponse) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status.as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, response.content_type)],
        response.body,
    )
        .into_response()
}

/// Handler for the inbound SMS webhook: POST {webhook_path}
pub async fn sms_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let generic_headers = to_generic_headers(&headers);
    let response = state.processor.process_webhook(generic_headers, &body).await;
    from_webhook_response(response)
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(sms_webhook))
        .route("/healthz", get(healthz))
        .with_state(state)
}
