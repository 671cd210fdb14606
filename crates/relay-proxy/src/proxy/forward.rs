//! Relay of one inbound request to the backend origin.
//!
//! The inbound body is buffered so `content-length` can be set on the forwarded
//! request; the backend's response body is streamed back verbatim.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Uri};
use axum::response::Response;
use bytes::Bytes;
use hyper::ext::ReasonPhrase;
use tracing::Instrument;
use url::{Position, Url};

use super::error::ProxyError;
use super::headers::{forward_headers, relay_headers};

/// A request received under the mount point, split into the pieces needed to
/// rebuild it against the backend.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    /// Raw (still percent-encoded) path segments after the mount prefix.
    pub segments: Vec<String>,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: Method, uri: &Uri, mount_path: &str, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            segments: path_segments(uri.path(), mount_path),
            query: uri.query().map(str::to_string),
            headers,
            body,
        }
    }
}

/// Split `path` into the segments that follow `mount_path`.
///
/// Empty segments are kept so `a//b` and a trailing slash survive the relay.
pub fn path_segments(path: &str, mount_path: &str) -> Vec<String> {
    let rest = path.strip_prefix(mount_path).unwrap_or(path);
    match rest.strip_prefix('/') {
        None | Some("") => Vec::new(),
        Some(rest) => rest.split('/').map(str::to_string).collect(),
    }
}

/// Build the backend URL: origin (plus any base path), the joined segments, and
/// the query string copied as-is.
///
/// Dot segments, encoded or not, are resolved by the URL parser; a result that
/// climbs out of the base path is rejected.
pub fn target_url(origin: &Url, segments: &[String], query: Option<&str>) -> Result<Url, ProxyError> {
    let base_path = origin.path().trim_end_matches('/');
    let mut raw = format!(
        "{}{}/{}",
        &origin[..Position::BeforePath],
        base_path,
        segments.join("/")
    );
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        raw.push('?');
        raw.push_str(query);
    }

    let url = match Url::parse(&raw) {
        Ok(url) => url,
        Err(source) => return Err(ProxyError::InvalidTarget { url: raw, source }),
    };

    let path = url.path();
    let within_base = base_path.is_empty()
        || path == base_path
        || path
            .strip_prefix(base_path)
            .is_some_and(|rest| rest.starts_with('/'));
    if !within_base {
        return Err(ProxyError::OutsideBasePath { url: raw });
    }
    Ok(url)
}

/// GET and HEAD are forwarded without a body.
fn sends_body(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD)
}

/// Forwards requests to a single backend origin. Cheap to clone.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    origin: Url,
}

impl Forwarder {
    /// Build a forwarder whose client never follows redirects.
    ///
    /// `idle_timeout` bounds connecting and each wait for backend bytes, not
    /// the whole exchange, so a long but steady response body is never cut.
    pub fn new(origin: Url, idle_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(idle_timeout)
            .read_timeout(idle_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Send `inbound` to the backend and relay whatever it answers.
    ///
    /// Only transport failures are errors; any status the backend returns,
    /// 3xx included, comes back as `Ok`.
    pub async fn forward(
        &self,
        inbound: InboundRequest,
        correlation_id: &str,
    ) -> Result<Response, ProxyError> {
        let target = target_url(&self.origin, &inbound.segments, inbound.query.as_deref())?;
        tracing::Span::current().record("target", target.as_str());

        let span = relay_tracing::backend_call_span!(correlation_id, target);
        let start = Instant::now();

        async {
            let mut headers = forward_headers(&inbound.headers);
            let mut req_builder = self.client.request(inbound.method.clone(), target);

            if sends_body(&inbound.method) {
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(inbound.body.len()));
                req_builder = req_builder.headers(headers).body(inbound.body);
            } else {
                req_builder = req_builder.headers(headers);
            }

            let result = req_builder.send().await;

            let latency = start.elapsed().as_millis() as u64;
            tracing::Span::current().record("latency_ms", latency);

            let upstream = match result {
                Ok(resp) => resp,
                Err(e) => return Err(ProxyError::from(e)),
            };
            let status = upstream.status();
            tracing::Span::current().record("status", status.as_u16());
            tracing::info!(status = status.as_u16(), latency_ms = latency, "Forward complete");

            Ok(relay_response(upstream))
        }
        .instrument(span)
        .await
    }
}

/// Turn the backend response into the outbound response, streaming the body.
fn relay_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let headers = relay_headers(upstream.headers());
    // Only present when the backend sent a non-canonical reason phrase
    let reason = upstream.extensions().get::<ReasonPhrase>().cloned();

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    if let Some(reason) = reason {
        response.extensions_mut().insert(reason);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_segments_after_mount() {
        assert_eq!(path_segments("/api/backend/api/me", "/api/backend"), segs(&["api", "me"]));
        assert_eq!(
            path_segments("/api/backend/saml2/authenticate/entra", "/api/backend"),
            segs(&["saml2", "authenticate", "entra"])
        );
    }

    #[test]
    fn test_segments_empty_at_mount_root() {
        assert!(path_segments("/api/backend", "/api/backend").is_empty());
        assert!(path_segments("/api/backend/", "/api/backend").is_empty());
    }

    #[test]
    fn test_segments_keep_empty_and_encoded_parts() {
        assert_eq!(path_segments("/api/backend/a//b/", "/api/backend"), segs(&["a", "", "b", ""]));
        assert_eq!(path_segments("/api/backend/a%2Fb", "/api/backend"), segs(&["a%2Fb"]));
    }

    #[test]
    fn test_target_url_joins_segments() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let url = target_url(&origin, &segs(&["api", "me"]), None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/me");
    }

    #[test]
    fn test_target_url_root_when_empty() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let url = target_url(&origin, &[], None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_target_url_keeps_query_verbatim() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let query = "b=2&a=1&a=3&empty=&x=%20y";
        let url = target_url(&origin, &segs(&["search"]), Some(query)).unwrap();
        assert_eq!(url.query(), Some(query));
        assert_eq!(url.as_str(), "http://localhost:8080/search?b=2&a=1&a=3&empty=&x=%20y");
    }

    #[test]
    fn test_target_url_empty_query_dropped() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let url = target_url(&origin, &segs(&["api", "me"]), Some("")).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_target_url_keeps_base_path_prefix() {
        let origin = Url::parse("https://auth.example/backend/").unwrap();
        let url = target_url(&origin, &segs(&["api", "me"]), Some("a=1")).unwrap();
        assert_eq!(url.as_str(), "https://auth.example/backend/api/me?a=1");
    }

    #[test]
    fn test_target_url_cannot_leave_base_path() {
        let origin = Url::parse("http://backend:8080/prefix/").unwrap();
        let escapes: [&[&str]; 3] = [
            &["%2e%2e", "admin"],
            &["..", "admin"],
            &["a", "%2E%2E", "..", "admin"],
        ];
        for escape in escapes {
            let result = target_url(&origin, &segs(escape), None);
            assert!(
                matches!(result, Err(ProxyError::OutsideBasePath { .. })),
                "{escape:?} escaped to {result:?}"
            );
        }
        // A sibling path sharing the prefix text is still outside.
        let origin = Url::parse("http://backend:8080/pre").unwrap();
        assert!(target_url(&origin, &segs(&["..", "prefix"]), None).is_err());
    }

    #[test]
    fn test_target_url_dot_segments_inside_base_are_fine() {
        let origin = Url::parse("http://backend:8080/prefix/").unwrap();
        let url = target_url(&origin, &segs(&["a", "..", "api", "me"]), None).unwrap();
        assert_eq!(url.path(), "/prefix/api/me");
        let url = target_url(&origin, &segs(&["a", ".."]), None).unwrap();
        assert_eq!(url.path(), "/prefix/");
    }

    #[test]
    fn test_target_url_keeps_percent_encoding() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let url = target_url(&origin, &segs(&["files", "a%2Fb%20c"]), None).unwrap();
        assert_eq!(url.path(), "/files/a%2Fb%20c");
    }

    #[test]
    fn test_inbound_request_from_uri() {
        let uri: Uri = "/api/backend/api/auth/login?next=%2F".parse().unwrap();
        let inbound = InboundRequest::new(
            Method::POST,
            &uri,
            "/api/backend",
            HeaderMap::new(),
            Bytes::from_static(b"{}"),
        );
        assert_eq!(inbound.segments, segs(&["api", "auth", "login"]));
        assert_eq!(inbound.query.as_deref(), Some("next=%2F"));
    }

    #[test]
    fn test_only_get_and_head_skip_body() {
        assert!(!sends_body(&Method::GET));
        assert!(!sends_body(&Method::HEAD));
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS] {
            assert!(sends_body(&method), "{method} should carry a body");
        }
    }
}
