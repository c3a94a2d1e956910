//! Wire middleware: gzip request decompression and HMAC signing.

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use pulsegrid_core::{codec, signing};

use crate::AppState;

// Bodies are metric envelopes; anything close to this is abusive.
const BODY_LIMIT: usize = 16 * 1024 * 1024;

const HASH_HEADER: HeaderName = HeaderName::from_static("hashsha256");

/// Decompress request bodies that declare `Content-Encoding: gzip`.
/// A body that fails to decompress is rejected as a bad request.
pub async fn decompress_request(request: Request, next: Next) -> Response {
    let is_gzip = request
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
    if !is_gzip {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let Ok(compressed) = to_bytes(body, BODY_LIMIT).await else {
        return (StatusCode::BAD_REQUEST, "cannot read request body").into_response();
    };
    let Ok(plain) = codec::decode_payload(&compressed) else {
        return (StatusCode::BAD_REQUEST, "failed to decompress request body").into_response();
    };

    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.remove(header::CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(plain))).await
}

/// Enforce the HMAC contract over uncompressed payloads.
///
/// Without a configured key, unsigned traffic passes through and signed
/// traffic is rejected. With a key, every request that carries a body
/// must present a matching `HashSHA256` signature, and responses are
/// signed with the same key on the way out.
pub async fn verify_signature(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(&HASH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let Some(key) = state.signing_key.as_deref() else {
        if provided.is_some() {
            return (StatusCode::BAD_REQUEST, "signature sent but no key configured")
                .into_response();
        }
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let Ok(payload) = to_bytes(body, BODY_LIMIT).await else {
        return (StatusCode::BAD_REQUEST, "cannot read request body").into_response();
    };

    if !payload.is_empty() {
        let Some(provided) = provided else {
            return (StatusCode::BAD_REQUEST, "missing HMAC signature").into_response();
        };
        if !signing::verify(key.as_bytes(), &payload, &provided) {
            return (StatusCode::BAD_REQUEST, "invalid HMAC signature").into_response();
        }
    }

    let response = next
        .run(Request::from_parts(parts, Body::from(payload)))
        .await;
    sign_response(key, response).await
}

async fn sign_response(key: &str, response: Response) -> Response {
    let (mut parts, body) = response.into_parts();
    let Ok(payload) = to_bytes(body, BODY_LIMIT).await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "cannot buffer response").into_response();
    };

    let signature = signing::sign(key.as_bytes(), &payload);
    if let Ok(value) = HeaderValue::from_str(&signature) {
        parts.headers.insert(HASH_HEADER, value);
    }
    Response::from_parts(parts, Body::from(payload))
}
