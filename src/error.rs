use std::{
    any::Any,
    backtrace::Backtrace,
    cell::RefCell,
    fmt,
    panic,
    sync::Once,
};

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chains a panic hook that records a backtrace of the panicking thread while its
/// stack is still intact. The previous hook still runs afterwards.
pub(crate) fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture();
            let _ = PANIC_BACKTRACE.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(backtrace);
                }
            });
            previous(info);
        }));
    });
}

/// Takes the backtrace recorded by the last panic on this thread.
fn take_panic_backtrace() -> Option<Backtrace> {
    PANIC_BACKTRACE
        .try_with(|slot| slot.try_borrow_mut().ok()?.take())
        .ok()
        .flatten()
}

/// A panic caught while serving a request.
pub(crate) struct Fault {
    message: String,
    backtrace: Backtrace,
}

impl Fault {
    pub(crate) fn new(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "Box<dyn Any>".to_owned(),
            },
        };

        // without the hook only the catch site is left on the stack
        let backtrace = take_panic_backtrace().unwrap_or_else(Backtrace::force_capture);

        Fault { message, backtrace }
    }

    pub(crate) fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Panic: {}\n{}", self.message, self.backtrace)
    }
}

/// Ends a response body whose stream panicked.
#[derive(Debug, thiserror::Error)]
#[error("response body panicked: {0}")]
pub struct BodyPanicked(pub(crate) String);
