//! Header filtering for both legs of the relay.

use http::header::HeaderMap;

/// Headers removed from the inbound request before it is forwarded.
///
/// `content-length` is re-set from the buffered body; `transfer-encoding` goes
/// with it because the forwarded body is always length-delimited.
pub const STRIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "accept-encoding",
    "transfer-encoding",
];

/// Connection-level headers dropped from the backend response.
const STRIPPED_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
];

/// Clone inbound headers minus [`STRIPPED_REQUEST_HEADERS`].
///
/// Order and repeated values of everything else (cookies included) are kept.
pub fn forward_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in STRIPPED_REQUEST_HEADERS {
        headers.remove(*name);
    }
    headers
}

/// Clone backend response headers minus connection-level framing headers.
pub fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream.iter() {
        if STRIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}
