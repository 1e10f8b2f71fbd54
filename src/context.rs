use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt, io,
    mem,
    rc::Rc,
};

use actix_utils::future::{Ready, ready};
use actix_web::dev::{Payload, ServiceRequest};
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};

/// Per-request log annotations.
///
/// [`WebLogs`](crate::WebLogs) stores a fresh context in the extensions of every
/// request it wraps. Handlers and inner middleware use it to append free text to
/// the request's log line or to attach key-value pairs for custom formats.
///
/// On a request that was not wrapped the context is detached: writes are
/// discarded and no values are available.
///
/// # Examples
/// ```rust
/// use std::io::Write;
///
/// use actix_web::HttpResponse;
/// use actix_web_middleware_weblogs::LogContext;
///
/// async fn index(log: LogContext) -> HttpResponse {
///     let _ = write!(log.writer(), " user=fred");
///     if let Some(values) = log.values() {
///         values.insert("user", "fred");
///     }
///     HttpResponse::Ok().body("Hello!")
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LogContext(Option<Rc<Slot>>);

#[derive(Debug, Default)]
struct Slot {
    extra: RefCell<Vec<u8>>,
    values: RefCell<BTreeMap<String, String>>,
}

impl LogContext {
    /// Creates a fresh context and binds it to `req`.
    pub(crate) fn attach(req: &ServiceRequest) -> Self {
        let context = LogContext(Some(Rc::default()));
        req.extensions_mut().insert(context.clone());
        context
    }

    /// Returns the context bound to `req`, or a detached one.
    pub fn get<M: HttpMessage>(req: &M) -> Self {
        req.extensions()
            .get::<LogContext>()
            .cloned()
            .unwrap_or_default()
    }

    /// Returns `true` when the request is wrapped by [`WebLogs`](crate::WebLogs).
    pub fn is_attached(&self) -> bool {
        self.0.is_some()
    }

    /// Writer appending to the request's log line.
    pub fn writer(&self) -> ExtraWriter {
        ExtraWriter(self.0.clone())
    }

    /// Live key-value pairs of the request's log record, `None` when detached.
    pub fn values(&self) -> Option<Values> {
        self.0.clone().map(Values)
    }

    pub(crate) fn take_extra(&self) -> String {
        match &self.0 {
            Some(slot) => {
                let extra = mem::take(&mut *slot.extra.borrow_mut());
                String::from_utf8_lossy(&extra).into_owned()
            }
            None => String::new(),
        }
    }

    pub(crate) fn take_values(&self) -> BTreeMap<String, String> {
        match &self.0 {
            Some(slot) => mem::take(&mut *slot.values.borrow_mut()),
            None => BTreeMap::new(),
        }
    }
}

impl FromRequest for LogContext {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(LogContext::get(req)))
    }
}

/// Returns a writer appending to the log line of `req`.
///
/// If `req` is not wrapped by [`WebLogs`](crate::WebLogs), writing to the returned
/// writer does nothing.
pub fn writer<M: HttpMessage>(req: &M) -> ExtraWriter {
    LogContext::get(req).writer()
}

/// Returns the key-value pairs to be logged for `req`.
///
/// If `req` is not wrapped by [`WebLogs`](crate::WebLogs), returns `None`.
pub fn values<M: HttpMessage>(req: &M) -> Option<Values> {
    LogContext::get(req).values()
}

/// Appends text to a request's log line.
#[derive(Debug, Clone)]
pub struct ExtraWriter(Option<Rc<Slot>>);

impl io::Write for ExtraWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(slot) = &self.0 {
            slot.extra.borrow_mut().extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Write for ExtraWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(slot) = &self.0 {
            slot.extra.borrow_mut().extend_from_slice(s.as_bytes());
        }
        Ok(())
    }
}

/// Handle on the key-value pairs of a request's log record.
///
/// Changes are visible to the format when the record is assembled. Values are
/// stored as their `Display` text.
#[derive(Debug, Clone)]
pub struct Values(Rc<Slot>);

impl Values {
    /// Sets `key` to `value`, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: impl ToString) -> Option<String> {
        self.0
            .values
            .borrow_mut()
            .insert(key.into(), value.to_string())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.0.values.borrow().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.0.values.borrow_mut().remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values.borrow().is_empty()
    }
}
