use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt, io,
    io::Write,
    panic::Location,
    sync::{Arc, Mutex, PoisonError},
};

use crate::error::Fault;
use crate::format::Format;
use crate::record::LogRecord;

/// Shared destination for access log lines.
///
/// Every line, and the panic report that may follow it, is written while holding
/// the output's lock, so lines from concurrent requests never interleave. Clones
/// share the same writer and lock; create one output outside the
/// `HttpServer::new` factory and clone it into each worker to share a file.
#[derive(Clone)]
pub struct Output(Arc<Mutex<Box<dyn Write + Send>>>);

impl Output {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Output(Arc::new(Mutex::new(Box::new(writer))))
    }

    /// Output to the process standard error.
    pub fn stderr() -> Self {
        Output::new(io::stderr())
    }

    fn write_record<F: Format>(
        &self,
        format: &F,
        record: &LogRecord<'_, F::Snapshot, F::Capture>,
        fault: Option<&Fault>,
    ) {
        let mut out = self.0.lock().unwrap_or_else(PoisonError::into_inner);

        let mut line = render_line(format, record);
        line.push(b'\n');
        if let Some(fault) = fault {
            let _ = writeln!(line, "{}", fault);
        }

        if let Err(err) = out.write_all(&line).and_then(|()| out.flush()) {
            log::debug!("Failed to write access log line: {}", err);
        }
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output").finish_non_exhaustive()
    }
}

/// Renders `record`, falling back to a placeholder line when the format fails so
/// the request still gets its line and any panic report that follows.
fn render_line<F: Format>(format: &F, record: &LogRecord<'_, F::Snapshot, F::Capture>) -> Vec<u8> {
    let mut line = Vec::with_capacity(256);
    if let Err(err) = format.render(&mut line, record) {
        log::debug!("Failed to render access log line: {}", err);
        line.clear();
        let _ = write!(line, "failed to render access log line: {}", err);
    }
    line
}

#[derive(Debug, Clone)]
pub(crate) enum Sink {
    Writer(Output),
    Log(Cow<'static, str>),
}

impl Sink {
    pub(crate) fn emit<F: Format>(
        &self,
        format: &F,
        record: &LogRecord<'_, F::Snapshot, F::Capture>,
        fault: Option<&Fault>,
    ) {
        match self {
            Sink::Writer(output) => output.write_record(format, record, fault),
            Sink::Log(target) => {
                let line = render_line(format, record);
                let line = String::from_utf8_lossy(&line);

                crate::wrapper::rust_log::log(
                    log::Level::Info,
                    target.as_ref(),
                    module_path!(),
                    Location::caller(),
                    format_args!("{}", line),
                    &record.values,
                );

                if let Some(fault) = fault {
                    crate::wrapper::rust_log::log(
                        log::Level::Error,
                        target.as_ref(),
                        module_path!(),
                        Location::caller(),
                        format_args!("{}", fault),
                        &BTreeMap::new(),
                    );
                }
            }
        }
    }
}
