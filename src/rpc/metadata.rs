//! Request metadata lookups shared by the interceptor and the gateway.

use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderValue};

pub const AUTHORIZATION: &str = "authorization";
pub const GATEWAY_AUTHORIZATION: &str = "gateway-authorization";
pub const ACCEPT_LANGUAGE: &str = "accept-language";
pub const GATEWAY_ACCEPT_LANGUAGE: &str = "gateway-accept-language";
/// Resolved locale, written back by the interceptor.
pub const X_ACCEPT_LANGUAGE: &str = "x-accept-language";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REQUEST_ID: &str = "x-request-id";
/// Response header carrying the numeric status code.
pub const RPC_STATUS: &str = "rpc-status";

fn first<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// Bearer token, direct or forwarded by the gateway.
pub fn auth_token(headers: &HeaderMap) -> Option<&str> {
    first(headers, &[AUTHORIZATION, GATEWAY_AUTHORIZATION])
}

/// Primary language tag the caller asked for, lowercased.
pub fn locale(headers: &HeaderMap) -> Option<String> {
    let raw = first(
        headers,
        &[X_ACCEPT_LANGUAGE, ACCEPT_LANGUAGE, GATEWAY_ACCEPT_LANGUAGE],
    )?;
    let tag = raw.split([';', ',']).next().unwrap_or(raw).trim();
    (!tag.is_empty()).then(|| tag.to_lowercase())
}

/// Store the resolved locale so downstream code reads a single header.
pub fn cache_locale(headers: &mut HeaderMap, locale: &str) {
    if let Ok(value) = HeaderValue::from_str(locale) {
        headers.insert(X_ACCEPT_LANGUAGE, value);
    }
}

/// First `x-forwarded-for` hop, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn locale_takes_primary_tag() {
        let h = headers(&[("accept-language", "zh-TW,zh;q=0.9,en;q=0.8")]);
        assert_eq!(locale(&h).as_deref(), Some("zh-tw"));

        let h = headers(&[("gateway-accept-language", "EN;q=1")]);
        assert_eq!(locale(&h).as_deref(), Some("en"));

        assert_eq!(locale(&HeaderMap::new()), None);
    }

    #[test]
    fn cached_locale_wins() {
        let mut h = headers(&[("accept-language", "fr")]);
        cache_locale(&mut h, "de");
        assert_eq!(locale(&h).as_deref(), Some("de"));
    }

    #[test]
    fn token_prefers_direct_header() {
        let h = headers(&[("gateway-authorization", "Bearer g"), ("authorization", "Bearer d")]);
        assert_eq!(auth_token(&h), Some("Bearer d"));
        let h = headers(&[("gateway-authorization", "Bearer g")]);
        assert_eq!(auth_token(&h), Some("Bearer g"));
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let h = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(client_ip(&h, Some(peer)).as_deref(), Some("203.0.113.7"));
        assert_eq!(client_ip(&HeaderMap::new(), Some(peer)).as_deref(), Some("10.0.0.9"));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
