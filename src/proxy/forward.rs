//! Upstream forwarding.
//!
//! Sends a request to the configured origin with only the scheme and
//! authority rewritten, and buffers the whole response body.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri};
use axum::response::Response;
use bytes::Bytes;
use reqwest::{redirect, Client, Url};
use tracing::debug;

use super::CacheStatus;
use crate::error::{CacheError, Result};

/// Headers scoped to a single connection, never forwarded in either direction.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// A fully buffered origin response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Converts into a client response, tagging it with `cache_status` when given.
    pub fn into_response(self, cache_status: Option<CacheStatus>) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(status) = cache_status {
            status.apply(response.headers_mut());
        }
        response
    }
}

// == Forwarder ==
/// HTTP client bound to a single origin.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    origin: Url,
}

impl Forwarder {
    /// Creates a forwarder for `origin` whose requests give up after `timeout`.
    ///
    /// Redirects are returned to the client rather than followed.
    pub fn new(origin: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| CacheError::UpstreamUnavailable(format!("failed to build client: {}", e)))?;

        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Maps an inbound request target onto the origin.
    pub fn target_url(&self, uri: &Uri) -> Url {
        let mut url = self.origin.clone();
        url.set_path(uri.path());
        url.set_query(uri.query());
        url
    }

    // == Forward ==
    /// Forwards a request and buffers the response.
    ///
    /// Any status the origin answers with is returned as-is.
    ///
    /// # Errors
    /// `UpstreamUnavailable` on connection failure, timeout, or a body that
    /// cannot be read.
    pub async fn forward(
        &self,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamResponse> {
        let url = self.target_url(uri);
        debug!(method = %method, url = %url, "Forwarding to origin");

        let response = self
            .client
            .request(method, url)
            .headers(outbound_headers(headers))
            .body(body)
            .send()
            .await
            .map_err(|e| CacheError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        let headers = inbound_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| CacheError::UpstreamUnavailable(format!("failed to read body: {}", e)))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Client headers sent to the origin.
///
/// `Host` is left for the client to derive from the origin URL, and
/// `Accept-Encoding` is dropped so cached bodies are never content-encoded.
fn outbound_headers(headers: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name)
            || *name == header::HOST
            || *name == header::ACCEPT_ENCODING
            || *name == header::CONTENT_LENGTH
        {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}

/// Origin headers relayed to the client. The body is re-framed locally.
fn inbound_headers(headers: &HeaderMap) -> HeaderMap {
    let mut inbound = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || *name == header::CONTENT_LENGTH {
            continue;
        }
        inbound.append(name.clone(), value.clone());
    }
    inbound
}
