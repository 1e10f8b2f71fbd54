//! Actix-web middleware for Apache-style access logs.
//! This middleware inspired by the `actix-web`'s `Logger` middleware.
//!
//! Every request handled by the wrapped service produces exactly one line, written
//! after the response body has been sent. Handler panics are caught: the client
//! gets a `500 Internal Server Error` and the panic message and backtrace follow
//! the request's line.
//!
//! # Examples:
//! ## By default middleware writes `Simple` lines to standard error.
//! ```bash
//! cargo add actix-web-middleware-weblogs
//! ```
//! ```rust,no_run
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_weblogs::WebLogs;
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     HttpServer::new(|| {
//!         App::new()
//!             .wrap(WebLogs::default())
//!             .route("/", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?
//!     .run()
//!     .await
//! }
//! ```
//! ## Apache formats and a shared log file
//! All workers must share one [`Output`] so their lines never interleave:
//! ```rust,no_run
//! use std::fs::File;
//!
//! use actix_web::{web, App, HttpServer};
//! use actix_web_middleware_weblogs::{ApacheCombined, Output, WebLogs};
//!
//! #[actix_web::main]
//! async fn main() -> std::io::Result<()> {
//!     let output = Output::new(File::create("access.log")?);
//!
//!     HttpServer::new(move || {
//!         App::new()
//!             .wrap(WebLogs::new(ApacheCombined).output(output.clone()))
//!             .route("/", web::get().to(|| async { "Hello world!" }))
//!     })
//!     .bind("127.0.0.1:8080")?
//!     .run()
//!     .await
//! }
//! ```
//! # Formats
//!
//! - [`Simple`] - `03/23/2013 13:14:15.123456 192.168.5.1 GET /foo?x=1 200 387`
//! - [`ApacheCommon`] - `192.168.5.1 - fred [23/Mar/2013:13:14:15 +0000] "GET /foo HTTP/1.0" 200 387`
//! - [`ApacheCombined`] - Common plus the quoted `Referer` and `User-Agent` headers
//!
//! Any type implementing [`Format`] can be used instead, together with its own
//! request snapshot and response capture types.
//!
//! # Annotating a request's line
//!
//! Handlers can append text to the line and attach key-value pairs through the
//! request's [`LogContext`]:
//!
//! ```rust
//! use std::io::Write;
//!
//! use actix_web::{HttpRequest, HttpResponse};
//! use actix_web_middleware_weblogs::{values, writer};
//!
//! async fn index(req: HttpRequest) -> HttpResponse {
//!     let _ = write!(writer(&req), " cache=hit");
//!     if let Some(values) = values(&req) {
//!         values.insert("user_id", 42);
//!     }
//!     HttpResponse::Ok().finish()
//! }
//! ```
//!
//! # Configuration
//!
//! - [`WebLogs::output`] / [`WebLogs::writer`] - where lines go (standard error by default)
//! - [`WebLogs::log_target`] - send lines to the `log` facade instead
//! - [`WebLogs::clock`] - replace the system clock, for tests

mod context;
mod error;
mod format;
mod logger;
mod record;
mod sink;
mod wrapper;

pub use crate::context::{ExtraWriter, LogContext, Values, values, writer};
pub use crate::error::BodyPanicked;
pub use crate::format::{ApacheCombined, ApacheCommon, Format, Simple, apache_user, strip_port};
pub use crate::logger::{StreamLog, WebLogs, WebLogsMiddleware, WebLogsResponse};
pub use crate::record::{Capture, LogRecord, RequestSnapshot, ResponseCapture};
pub use crate::sink::Output;
pub use crate::wrapper::rust_log;
