use std::sync::Arc;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use shared::protocol::{
    HEADER_CALLBACK, HEADER_PSK, HEADER_TIMEOUT, METHOD_SUBSCRIBE, STATUS_QUERY_METHOD,
    TIMEOUT_PREFIX,
};
use crate::subscriber_manager::SubscriberHandle;

#[derive(Clone)]
pub struct AppState {
    pub subscribers: SubscriberHandle,
    pub status_rx: watch::Receiver<String>,
    pub psk: Arc<String>,
    /// Rendered device description
    pub descriptor: Arc<String>,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    pub method: String,
}

pub fn router(state: AppState, descriptor_path: &str) -> Router {
    Router::new()
        .route(descriptor_path, get(get_descriptor).fallback(dispatch))
        .fallback(dispatch)
        .with_state(state)
}

async fn get_descriptor(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/xml")],
        state.descriptor.as_str().to_owned(),
    )
        .into_response()
}

/// Everything that is not the descriptor: status queries, SUBSCRIBE, 404s
async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method == Method::POST {
        status_query(&state, &headers, &body)
    } else if method.as_str() == METHOD_SUBSCRIBE {
        subscribe(&state, &headers).await
    } else if method == Method::GET || method == Method::HEAD {
        (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/html")],
            "Not found",
        )
            .into_response()
    } else {
        StatusCode::NOT_IMPLEMENTED.into_response()
    }
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    headers
        .get(HEADER_PSK)
        .is_some_and(|psk| psk_matches(psk.as_bytes(), state.psk.as_bytes()))
}

/// Compares every byte regardless of where the first mismatch is. Only the
/// length can leak through timing.
fn psk_matches(given: &[u8], expected: &[u8]) -> bool {
    given.len() == expected.len()
        && given
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn status_query(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Response {
    if !authorized(state, headers) {
        tracing::warn!("Rejected status query with missing or wrong PSK");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let query: StatusQuery = match serde_json::from_slice(body) {
        Ok(query) => query,
        Err(e) => {
            tracing::debug!("Malformed status query: {}", e);
            return (StatusCode::BAD_REQUEST, "malformed JSON body").into_response();
        }
    };
    if query.method != STATUS_QUERY_METHOD {
        return (StatusCode::BAD_REQUEST, "unknown method").into_response();
    }

    let status = state.status_rx.borrow().clone();
    ([(header::CONTENT_TYPE, "text/html")], status).into_response()
}

async fn subscribe(state: &AppState, headers: &HeaderMap) -> Response {
    if !authorized(state, headers) {
        tracing::warn!("Rejected SUBSCRIBE with missing or wrong PSK");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let callback = match headers.get(HEADER_CALLBACK).and_then(|v| v.to_str().ok()).and_then(parse_callback) {
        Some(callback) => callback,
        None => return (StatusCode::BAD_REQUEST, "missing or malformed CALLBACK").into_response(),
    };
    let timeout_secs = match headers.get(HEADER_TIMEOUT).and_then(|v| v.to_str().ok()).and_then(parse_timeout) {
        Some(secs) => secs,
        None => return (StatusCode::BAD_REQUEST, "missing or malformed TIMEOUT").into_response(),
    };
    let expires_at = match expiry(Utc::now(), timeout_secs) {
        Some(at) => at,
        None => return (StatusCode::BAD_REQUEST, "TIMEOUT out of range").into_response(),
    };

    match state.subscribers.subscribe(callback.clone(), expires_at).await {
        Ok(added) => {
            tracing::info!(
                "{} subscriber {} for {}s",
                if added { "Added" } else { "Renewed" },
                callback,
                timeout_secs
            );
            let mut response = StatusCode::OK.into_response();
            if let Ok(value) = HeaderValue::from_str(&format!("{}{}", TIMEOUT_PREFIX, timeout_secs)) {
                response.headers_mut().insert(HEADER_TIMEOUT, value);
            }
            response
        }
        Err(e) => {
            tracing::error!("Failed to store subscriber {}: {}", callback, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `<http://host/path>` -> `http://host/path`
pub fn parse_callback(value: &str) -> Option<String> {
    let url = value.trim().strip_prefix('<')?.strip_suffix('>')?;
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// `Second-120` -> 120
pub fn parse_timeout(value: &str) -> Option<u64> {
    value.trim().strip_prefix(TIMEOUT_PREFIX)?.parse().ok()
}

fn expiry(now: DateTime<Utc>, timeout_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(timeout_secs).ok()?;
    now.checked_add_signed(chrono::Duration::try_seconds(secs)?)
}
