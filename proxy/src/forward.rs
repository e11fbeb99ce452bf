/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::response::Response;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use tracing::{debug, instrument};

use crate::error::{ProxyError, ProxyResult};

/// Largest request body forwarded upstream.
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Headers safe to pass on: hop-by-hop headers and those named in
/// `Connection` are dropped, so is `Host`.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let connection_tokens = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect::<Vec<String>>();

    let mut forwarded = HeaderMap::new();

    for (name, value) in headers {
        let name_str = name.as_str();

        if name == header::HOST
            || HOP_BY_HOP_HEADERS.contains(&name_str)
            || connection_tokens.iter().any(|token| token == name_str)
        {
            continue;
        }

        forwarded.append(name.clone(), value.clone());
    }

    forwarded
}

/// Sends `request` to `upstream` and streams the answer back. A missing
/// upstream file counts as a gateway failure.
#[instrument(skip(client, request), fields(method = %request.method()))]
pub async fn forward(
    client: &reqwest::Client,
    upstream: &str,
    host: &str,
    request: Request,
) -> ProxyResult<Response> {
    let (parts, body) = request.into_parts();

    let mut url = upstream.to_string();
    if let Some(query) = parts.uri.query() {
        url.push('?');
        url.push_str(query);
    }

    let mut headers = forwardable_headers(&parts.headers);
    if let Ok(value) = HeaderValue::from_str(host) {
        headers.insert(X_FORWARDED_HOST, value);
    }

    let body = to_bytes(body, MAX_BODY_SIZE).await?;

    let upstream_response = client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream_response.status();
    debug!(status = %status, "Upstream responded");

    if status == StatusCode::NOT_FOUND {
        return Err(ProxyError::UpstreamStatus(status));
    }

    let mut response = Response::builder().status(status);
    if let Some(response_headers) = response.headers_mut() {
        *response_headers = forwardable_headers(upstream_response.headers());
    }

    let response = response.body(Body::from_stream(upstream_response.bytes_stream()))?;
    Ok(response)
}
