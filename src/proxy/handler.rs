//! Proxy handler
//!
//! Fallback route for every request not addressed to the admin API.

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, warn};

use super::{derive_key, CacheStatus};
use crate::api::AppState;
use crate::cache::Population;
use crate::error::{CacheError, Result};

/// Largest request body buffered for forwarding.
pub const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

/// Handler for every proxied request.
///
/// Plain GET requests are answered from the cache when possible. Everything
/// else, ranged GETs included, and every GET miss is forwarded to the origin.
/// Forwarding and cache population run in their own task so a client
/// disconnect does not cancel them.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let cacheable = is_cacheable(&parts.method, &parts.headers);
    let key = derive_key(&parts.uri);

    if cacheable {
        match state.cache.get(&key).await {
            Ok(Some(value)) => {
                debug!(key = %key, "Cache hit");
                return cached_response(value);
            }
            Ok(None) => debug!(key = %key, "Cache miss"),
            Err(err) => warn!(key = %key, error = %err, "Cache lookup failed, forwarding to origin"),
        }
    }

    let body = match body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(body) => body,
        Err(err) => {
            return CacheError::MalformedInput(format!("unreadable request body: {}", err))
                .into_response()
        }
    };

    let task = tokio::spawn(forward_and_populate(
        state,
        parts.method,
        parts.uri,
        parts.headers,
        body,
        cacheable.then_some(key),
    ));

    match task.await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            warn!(error = %err, "Forwarding failed");
            err.into_response()
        }
        Err(err) => {
            CacheError::UpstreamUnavailable(format!("forwarding task failed: {}", err))
                .into_response()
        }
    }
}

/// Forwards the request and, for a cacheable `200 OK` response, stores its
/// body under `key`.
///
/// Every other status is relayed untouched and never cached, since a hit is
/// always replayed as a full `200`. A population failure never fails the
/// response.
async fn forward_and_populate(
    state: AppState,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    key: Option<String>,
) -> Result<Response> {
    let upstream = state.forwarder.forward(method, &uri, &headers, body).await?;

    let key = match key {
        Some(key) if upstream.status == StatusCode::OK => key,
        _ => return Ok(upstream.into_response(None)),
    };

    match state
        .cache
        .populate(&key, upstream.body.clone(), state.default_ttl)
        .await
    {
        Ok(Population::Stored) => debug!(key = %key, "Cached origin response"),
        Ok(Population::MemoryOnly) => {
            debug!(key = %key, "Cached origin response in memory only")
        }
        Err(CacheError::AlreadyExists(_)) => {
            debug!(key = %key, "Entry populated concurrently, serving fetched body")
        }
        Err(err) => warn!(key = %key, error = %err, "Failed to cache origin response"),
    }

    Ok(upstream.into_response(Some(CacheStatus::Miss)))
}

/// Only whole-resource GETs share a key; a ranged request's body is partial.
fn is_cacheable(method: &Method, headers: &HeaderMap) -> bool {
    *method == Method::GET && !headers.contains_key(header::RANGE)
}

fn cached_response(value: Bytes) -> Response {
    let mut response = (StatusCode::OK, Body::from(value)).into_response();
    CacheStatus::Hit.apply(response.headers_mut());
    response
}
