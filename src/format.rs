use std::io;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use actix_web::dev::ServiceRequest;

use crate::record::{Capture, LogRecord, RequestSnapshot, ResponseCapture};

const SIMPLE_TIME: &[BorrowedFormatItem<'static>] = format_description!(
    "[month]/[day]/[year] [hour]:[minute]:[second].[subsecond digits:6]"
);

const APACHE_TIME: &[BorrowedFormatItem<'static>] = format_description!(
    "[day]/[month repr:short]/[year]:[hour]:[minute]:[second] +0000"
);

/// An access log format.
///
/// A format decides what is copied from the request before the wrapped service
/// runs, what is observed on the response, and how both end up in a log line.
/// The built-in formats are [`Simple`], [`ApacheCommon`] and [`ApacheCombined`];
/// implement this trait to provide your own.
///
/// # Examples
/// ```rust
/// use std::io;
///
/// use actix_web::dev::ServiceRequest;
/// use actix_web_middleware_weblogs::{Format, LogRecord, ResponseCapture, WebLogs};
///
/// struct StatusOnly;
///
/// impl Format for StatusOnly {
///     type Snapshot = String;
///     type Capture = ResponseCapture;
///
///     fn snapshot(&self, req: &ServiceRequest) -> String {
///         req.path().to_owned()
///     }
///
///     fn capture(&self) -> ResponseCapture {
///         ResponseCapture::new()
///     }
///
///     fn render(
///         &self,
///         out: &mut dyn io::Write,
///         record: &LogRecord<'_, String, ResponseCapture>,
///     ) -> io::Result<()> {
///         write!(out, "{} {}", record.snapshot, record.capture.status())
///     }
/// }
///
/// let logger = WebLogs::new(StatusOnly);
/// ```
pub trait Format: 'static {
    /// Request fields kept for the log line.
    type Snapshot: 'static;
    /// Response observer.
    type Capture: Capture + 'static;

    /// Copies what the log line needs from the request. Called before the wrapped
    /// service sees the request.
    fn snapshot(&self, req: &ServiceRequest) -> Self::Snapshot;

    /// Creates a fresh response observer for one request.
    fn capture(&self) -> Self::Capture;

    /// Writes one log line, without the trailing newline.
    fn render(
        &self,
        out: &mut dyn io::Write,
        record: &LogRecord<'_, Self::Snapshot, Self::Capture>,
    ) -> io::Result<()>;
}

/// Columns: date, remote address, method, URI, status, milliseconds elapsed,
/// followed by any text added through the request's
/// [`ExtraWriter`](crate::ExtraWriter).
///
/// ```text
/// 03/23/2013 13:14:15.123456 192.168.5.1 GET /foo/bar?query=tall 321 387
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Simple;

/// Apache common log format.
///
/// ```text
/// 192.168.5.1 - fred [23/Mar/2013:13:14:15 +0000] "GET /foo/bar?query=tall HTTP/1.0" 321 7
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ApacheCommon;

/// Apache combined log format: the common format followed by the quoted referer
/// and user agent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApacheCombined;

impl Format for Simple {
    type Snapshot = RequestSnapshot;
    type Capture = ResponseCapture;

    fn snapshot(&self, req: &ServiceRequest) -> RequestSnapshot {
        RequestSnapshot::new(req)
    }

    fn capture(&self) -> ResponseCapture {
        ResponseCapture::new()
    }

    fn render(
        &self,
        out: &mut dyn io::Write,
        record: &LogRecord<'_, RequestSnapshot, ResponseCapture>,
    ) -> io::Result<()> {
        let snapshot = record.snapshot;
        write!(
            out,
            "{} {} {} {} {} {}",
            format_time(record.time, SIMPLE_TIME)?,
            remote_host(snapshot),
            snapshot.method,
            snapshot.request_uri(),
            record.capture.status(),
            record.duration.whole_milliseconds(),
        )?;

        let extra = record.extra.trim_end();
        if !extra.is_empty() {
            if !extra.starts_with(char::is_whitespace) {
                out.write_all(b" ")?;
            }
            out.write_all(extra.as_bytes())?;
        }
        Ok(())
    }
}

impl Format for ApacheCommon {
    type Snapshot = RequestSnapshot;
    type Capture = ResponseCapture;

    fn snapshot(&self, req: &ServiceRequest) -> RequestSnapshot {
        RequestSnapshot::new(req)
    }

    fn capture(&self) -> ResponseCapture {
        ResponseCapture::new()
    }

    fn render(
        &self,
        out: &mut dyn io::Write,
        record: &LogRecord<'_, RequestSnapshot, ResponseCapture>,
    ) -> io::Result<()> {
        render_common(out, record)
    }
}

impl Format for ApacheCombined {
    type Snapshot = RequestSnapshot;
    type Capture = ResponseCapture;

    fn snapshot(&self, req: &ServiceRequest) -> RequestSnapshot {
        RequestSnapshot::new(req)
    }

    fn capture(&self) -> ResponseCapture {
        ResponseCapture::new()
    }

    fn render(
        &self,
        out: &mut dyn io::Write,
        record: &LogRecord<'_, RequestSnapshot, ResponseCapture>,
    ) -> io::Result<()> {
        render_common(out, record)?;
        write!(
            out,
            " \"{}\" \"{}\"",
            record.snapshot.referer.as_deref().unwrap_or_default(),
            record.snapshot.user_agent.as_deref().unwrap_or_default(),
        )
    }
}

fn render_common(
    out: &mut dyn io::Write,
    record: &LogRecord<'_, RequestSnapshot, ResponseCapture>,
) -> io::Result<()> {
    let snapshot = record.snapshot;
    write!(
        out,
        "{} - {} [{}] \"{} {} {}\" {} {}",
        remote_host(snapshot),
        apache_user(snapshot.user().as_deref()),
        format_time(record.time.to_offset(UtcOffset::UTC), APACHE_TIME)?,
        snapshot.method,
        snapshot.request_uri(),
        snapshot.protocol(),
        record.capture.status(),
        record.capture.size(),
    )
}

fn format_time(time: OffsetDateTime, format: &[BorrowedFormatItem<'_>]) -> io::Result<String> {
    time.format(format).map_err(io::Error::other)
}

fn remote_host(snapshot: &RequestSnapshot) -> &str {
    snapshot.remote_addr.as_deref().map_or("-", strip_port)
}

/// Strips the port number off a remote address.
///
/// `10.0.1.3:25972` becomes `10.0.1.3` and `[::1]:4050` becomes `[::1]`. Addresses
/// without a port are returned unchanged.
pub fn strip_port(remote_addr: &str) -> &str {
    if remote_addr.ends_with(']') {
        return remote_addr;
    }
    match remote_addr.rfind(':') {
        Some(index) => &remote_addr[..index],
        None => remote_addr,
    }
}

/// Formats a user name the apache way: missing or empty becomes `-`.
pub fn apache_user(user: Option<&str>) -> &str {
    match user {
        Some(name) if !name.is_empty() => name,
        _ => "-",
    }
}
