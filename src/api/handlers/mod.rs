//! HTTP handlers and the small helpers they share.

pub mod health;
pub mod validate;

use axum::{
    extract::ConnectInfo,
    http::{Extensions, HeaderMap},
};
use std::net::SocketAddr;

/// Best-effort client address for attempt counting.
///
/// Takes the first `x-forwarded-for` entry, then `x-real-ip`.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Attempt counter key for a request, derived from the transport only.
///
/// Proxy headers first, then the peer address of the connection.
pub(crate) fn client_address(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    extract_client_ip(headers).or_else(|| {
        extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    })
}
