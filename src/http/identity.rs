//! Identity resolution: mapping a request to its rate key.
//!
//! A non-empty credential header always wins over the client address. The
//! address comes from `X-Forwarded-For` (first entry), then `X-Real-IP`, then
//! the peer address of the connection. Proxy headers are trusted as-is, so
//! this is only sound behind a reverse proxy that overwrites them.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, Request};

use crate::config::IdentityConfig;
use crate::error::Result;
use crate::ratelimit::RateKey;

const FORWARDED_FOR: &str = "x-forwarded-for";
const REAL_IP: &str = "x-real-ip";

/// Address used when no header or peer address is available.
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Derives rate keys from incoming requests.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    token_header: HeaderName,
}

impl IdentityResolver {
    pub fn new(token_header: HeaderName) -> Self {
        Self { token_header }
    }

    pub fn from_config(config: &IdentityConfig) -> Result<Self> {
        Ok(Self::new(config.header_name()?))
    }

    /// Resolve the rate key for a request.
    ///
    /// The peer address is read from the [`ConnectInfo`] extension that axum
    /// installs when served with connect info.
    pub fn resolve<B>(&self, request: &Request<B>) -> RateKey {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        self.resolve_parts(request.headers(), peer)
    }

    /// Resolve a rate key from headers and an optional peer address.
    pub fn resolve_parts(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> RateKey {
        if let Some(token) = header_str(headers, &self.token_header) {
            return RateKey::token(token);
        }

        RateKey::ip(client_address(headers, peer))
    }
}

/// A header's value, if present, valid text and not blank.
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    // X-Forwarded-For: client, proxy1, proxy2; the leftmost entry is the client
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty());
    if let Some(addr) = forwarded {
        return addr.to_string();
    }

    if let Some(addr) = header_str(headers, &HeaderName::from_static(REAL_IP)) {
        return addr.to_string();
    }

    match peer {
        Some(addr) => addr.ip().to_string(),
        None => UNKNOWN_ADDRESS.to_string(),
    }
}
