use std::borrow::Cow;
use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use time::{Duration, OffsetDateTime};

use actix_web::dev::ServiceRequest;
use actix_web::http::header::{self, HeaderMap};
use actix_web::http::{Method, StatusCode, Uri, Version};

/// Observes the response sent for a single request.
///
/// The middleware drives a capture while the response flows to the client: the
/// head is reported through [`write_header`](Capture::write_header) and every body
/// chunk through [`write`](Capture::write). Implementations only record; they never
/// alter what reaches the client.
pub trait Capture {
    /// Reports a response status. Only the first status reported is kept.
    fn write_header(&mut self, status: StatusCode, headers: &HeaderMap);

    /// Reports a body chunk. Implies `200 OK` when no status was reported yet.
    fn write(&mut self, chunk: &[u8]);

    /// Returns `true` once a status has been recorded by either path.
    fn has_status(&self) -> bool;
}

/// Copy of the request fields taken before the wrapped service runs.
///
/// Later changes to the live request (a rewritten URI for example) do not show up
/// in the snapshot.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    /// Peer address including the port. Example: 192.168.0.1:3333
    pub remote_addr: Option<String>,
    /// Method. Example: GET
    pub method: Method,
    /// Version of the HTTP protocol. Example: HTTP/1.1
    pub version: Version,
    /// Request URI as received. Example: /index.html?page=2
    pub uri: Uri,
    /// Referer header. Example: https://actix.rs
    pub referer: Option<String>,
    /// User agent header. Example: Mozilla/5.0
    pub user_agent: Option<String>,
}

impl RequestSnapshot {
    pub fn new(req: &ServiceRequest) -> Self {
        RequestSnapshot {
            remote_addr: req.peer_addr().map(|addr| addr.to_string()),
            method: req.method().clone(),
            version: req.version(),
            uri: req.uri().clone(),
            referer: header_value(req.headers(), header::REFERER),
            user_agent: header_value(req.headers(), header::USER_AGENT),
        }
    }

    /// Protocol string of the request. Example: HTTP/1.0
    pub fn protocol(&self) -> &'static str {
        match self.version {
            actix_http::Version::HTTP_09 => "HTTP/0.9",
            actix_http::Version::HTTP_10 => "HTTP/1.0",
            actix_http::Version::HTTP_11 => "HTTP/1.1",
            actix_http::Version::HTTP_2 => "HTTP/2.0",
            actix_http::Version::HTTP_3 => "HTTP/3.0",
            _ => "unknown",
        }
    }

    /// Decoded user name from the user info part of the request URI, if any.
    pub fn user(&self) -> Option<Cow<'_, str>> {
        let authority = self.uri.authority()?.as_str();
        let (userinfo, _) = authority.rsplit_once('@')?;
        let name = userinfo.split(':').next()?;
        Some(percent_decode_str(name).decode_utf8_lossy())
    }

    /// Path and query of the request URI. Example: /foo/bar?query=tall
    pub fn request_uri(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/")
    }
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// Records the status, size and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseCapture {
    status: Option<StatusCode>,
    size: usize,
    headers: HeaderMap,
}

impl ResponseCapture {
    pub fn new() -> Self {
        ResponseCapture {
            status: None,
            size: 0,
            headers: HeaderMap::new(),
        }
    }

    /// The recorded status code, or 0 when none was recorded.
    pub fn status(&self) -> u16 {
        self.status.map_or(0, |status| status.as_u16())
    }

    /// Number of body bytes sent.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Headers sent along with the recorded status.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl Default for ResponseCapture {
    fn default() -> Self {
        ResponseCapture::new()
    }
}

impl Capture for ResponseCapture {
    fn write_header(&mut self, status: StatusCode, headers: &HeaderMap) {
        if self.status.is_none() {
            self.status = Some(status);
            self.headers = headers.clone();
        }
    }

    fn write(&mut self, chunk: &[u8]) {
        self.size += chunk.len();
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
    }

    fn has_status(&self) -> bool {
        self.status.is_some()
    }
}

/// A single access log entry, assembled once the request is complete.
pub struct LogRecord<'a, S, C> {
    /// The time the request was received.
    pub time: OffsetDateTime,
    pub snapshot: &'a S,
    pub capture: &'a C,
    /// Time spent processing the request.
    pub duration: Duration,
    /// Text added through the request's [`ExtraWriter`](crate::ExtraWriter).
    pub extra: String,
    /// Key-value pairs added through the request's [`Values`](crate::Values).
    pub values: BTreeMap<String, String>,
}
