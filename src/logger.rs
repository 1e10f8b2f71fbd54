use std::{
    borrow::Cow,
    error::Error as StdError,
    future::Future,
    io,
    marker::PhantomData,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll},
};

use bytes::Bytes;
use pin_project_lite::pin_project;
use time::OffsetDateTime;

use actix_service::{Service, Transform};
use actix_utils::future::{Ready, ready};
use actix_web::body::{BodySize, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::{Error, Result, error};

use crate::context::LogContext;
use crate::error::{BodyPanicked, Fault, install_panic_hook};
use crate::format::{Format, Simple};
use crate::record::{Capture, LogRecord};
use crate::sink::{Output, Sink};

/// Body sent to the client when the wrapped service panics before responding.
const INTERNAL_SERVER_ERROR: &str = "500 Internal Server Error\n";

type Clock = Rc<dyn Fn() -> OffsetDateTime>;

/// Middleware writing one access log line per request.
///
/// Every request gets a line, including requests whose handler panics. A panic
/// before any response exists is turned into a `500 Internal Server Error` for the
/// client, and the panic message and a backtrace are written right after the
/// request's line.
///
/// # Default Format
/// The [`default`](WebLogs::default) logger writes [`Simple`] lines to standard
/// error, stamping requests with the system clock.
///
/// # Examples
/// ```rust
/// use actix_web::App;
/// use actix_web_middleware_weblogs::{ApacheCombined, WebLogs};
///
/// let app = App::new()
///     .wrap(WebLogs::new(ApacheCombined));
/// ```
pub struct WebLogs<F: Format = Simple> {
    format: Rc<F>,
    sink: Sink,
    clock: Clock,
}

impl<F: Format> WebLogs<F> {
    /// Create `WebLogs` middleware writing lines in `format`.
    pub fn new(format: F) -> Self {
        install_panic_hook();

        WebLogs {
            format: Rc::new(format),
            sink: Sink::Writer(Output::stderr()),
            clock: Rc::new(OffsetDateTime::now_utc),
        }
    }

    /// Write lines to `output`.
    pub fn output(mut self, output: Output) -> Self {
        self.sink = Sink::Writer(output);
        self
    }

    /// Write lines to `writer`. Shorthand for `.output(Output::new(writer))`.
    pub fn writer<W: io::Write + Send + 'static>(self, writer: W) -> Self {
        self.output(Output::new(writer))
    }

    /// Send lines to the `log` facade instead of a writer.
    ///
    /// Each line becomes an `Info` record on `target`, carrying the request's
    /// [`Values`](crate::Values) as key-value pairs. Panic reports become `Error`
    /// records on the same target.
    ///
    /// # Examples
    /// Using `.log_target("access")` with a plain text logger:
    /// ```diff
    /// - 03/23/2013 13:14:15.123456 192.168.5.1 GET /foo/bar?query=tall 321 387
    /// + [2013-03-23T13:14:15Z INFO  access] 03/23/2013 13:14:15.123456 192.168.5.1 GET /foo/bar?query=tall 321 387
    /// ```
    pub fn log_target(mut self, target: impl Into<Cow<'static, str>>) -> Self {
        self.sink = Sink::Log(target.into());
        self
    }

    /// Use `clock` to stamp requests. It is called once when a request arrives and
    /// once when its line is written.
    pub fn clock<C: Fn() -> OffsetDateTime + 'static>(mut self, clock: C) -> Self {
        self.clock = Rc::new(clock);
        self
    }
}

impl Default for WebLogs<Simple> {
    fn default() -> Self {
        WebLogs::new(Simple)
    }
}

impl<F: Format> Clone for WebLogs<F> {
    fn clone(&self) -> Self {
        WebLogs {
            format: Rc::clone(&self.format),
            sink: self.sink.clone(),
            clock: Rc::clone(&self.clock),
        }
    }
}

impl<S, B, F> Transform<S, ServiceRequest> for WebLogs<F>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
    F: Format,
{
    type Response = ServiceResponse<StreamLog<B, F>>;
    type Error = Error;
    type Transform = WebLogsMiddleware<S, F>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(WebLogsMiddleware {
            service,
            inner: Rc::new(self.clone()),
        }))
    }
}

/// Bookkeeping for one request. Writes the request's line when dropped.
pub(crate) struct InFlight<F: Format> {
    inner: Rc<WebLogs<F>>,
    start: OffsetDateTime,
    snapshot: F::Snapshot,
    capture: F::Capture,
    context: LogContext,
    fault: Option<Fault>,
}

impl<F: Format> InFlight<F> {
    fn start(inner: Rc<WebLogs<F>>, req: &ServiceRequest) -> Self {
        let start = (inner.clock)();
        let snapshot = inner.format.snapshot(req);
        let capture = inner.format.capture();
        let context = LogContext::attach(req);

        InFlight {
            inner,
            start,
            snapshot,
            capture,
            context,
            fault: None,
        }
    }

    /// Records the response the transport will render for `err`.
    fn capture_error(&mut self, err: &Error) {
        let res = err.error_response();
        self.capture.write_header(res.status(), res.headers());
        if let Ok(body) = res.into_body().try_into_bytes() {
            self.capture.write(&body);
        }
    }
}

impl<F: Format> Drop for InFlight<F> {
    fn drop(&mut self) {
        let end = (self.inner.clock)();
        let record = LogRecord {
            time: self.start,
            snapshot: &self.snapshot,
            capture: &self.capture,
            duration: end - self.start,
            extra: self.context.take_extra(),
            values: self.context.take_values(),
        };

        self.inner
            .sink
            .emit(&*self.inner.format, &record, self.fault.as_ref());
    }
}

pin_project! {
    pub struct StreamLog<B, F>
    where
        F: Format,
    {
        #[pin]
        body: B,
        in_flight: InFlight<F>,
    }
}

impl<B: MessageBody, F: Format> MessageBody for StreamLog<B, F> {
    type Error = Box<dyn StdError>;

    #[inline]
    fn size(&self) -> BodySize {
        self.body.size()
    }

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes, Self::Error>>> {
        let this = self.project();
        let body = this.body;

        match panic::catch_unwind(AssertUnwindSafe(|| body.poll_next(cx))) {
            Ok(Poll::Ready(Some(Ok(chunk)))) => {
                this.in_flight.capture.write(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Ok(Poll::Ready(Some(Err(err)))) => Poll::Ready(Some(Err(err.into()))),
            Ok(Poll::Ready(None)) => Poll::Ready(None),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => {
                let fault = Fault::new(payload);
                let err = BodyPanicked(fault.message().to_owned());
                this.in_flight.fault = Some(fault);
                Poll::Ready(Some(Err(Box::new(err))))
            }
        }
    }
}

/// Logger middleware service.
pub struct WebLogsMiddleware<S, F: Format> {
    inner: Rc<WebLogs<F>>,
    service: S,
}

impl<S, B, F> Service<ServiceRequest> for WebLogsMiddleware<S, F>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
    F: Format,
{
    type Response = ServiceResponse<StreamLog<B, F>>;
    type Error = Error;
    type Future = WebLogsResponse<S, B, F>;

    actix_service::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let mut in_flight = InFlight::start(Rc::clone(&self.inner), &req);

        let fut = match panic::catch_unwind(AssertUnwindSafe(|| self.service.call(req))) {
            Ok(fut) => Some(fut),
            Err(payload) => {
                in_flight.fault = Some(Fault::new(payload));
                None
            }
        };

        WebLogsResponse {
            fut,
            in_flight: Some(in_flight),
            _phantom: PhantomData,
        }
    }
}

pin_project! {
    pub struct WebLogsResponse<S, B, F>
    where
        B: MessageBody,
        S: Service<ServiceRequest>,
        F: Format,
    {
        #[pin]
        fut: Option<S::Future>,
        in_flight: Option<InFlight<F>>,
        _phantom: PhantomData<B>,
    }
}

impl<S, B, F> Future for WebLogsResponse<S, B, F>
where
    B: MessageBody,
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    F: Format,
{
    type Output = Result<ServiceResponse<StreamLog<B, F>>, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let mut fault = None;
        let outcome = match this.fut.as_pin_mut() {
            Some(fut) => match panic::catch_unwind(AssertUnwindSafe(|| fut.poll(cx))) {
                Ok(Poll::Pending) => return Poll::Pending,
                Ok(Poll::Ready(res)) => Some(res),
                Err(payload) => {
                    fault = Some(Fault::new(payload));
                    None
                }
            },
            None => None,
        };

        let mut in_flight = this
            .in_flight
            .take()
            .expect("WebLogsResponse polled after completion");
        if fault.is_some() {
            in_flight.fault = fault;
        }

        match outcome {
            Some(Ok(res)) => {
                in_flight.capture.write_header(res.status(), res.headers());
                Poll::Ready(Ok(res.map_body(move |_, body| StreamLog { body, in_flight })))
            }
            Some(Err(err)) => {
                log::debug!("Error in response: {:?}", err);
                in_flight.capture_error(&err);
                Poll::Ready(Err(err))
            }
            None => {
                // no response was produced; answer with a 500 instead
                let err = error::ErrorInternalServerError(INTERNAL_SERVER_ERROR);
                if !in_flight.capture.has_status() {
                    in_flight.capture_error(&err);
                }
                Poll::Ready(Err(err))
            }
        }
    }
}
