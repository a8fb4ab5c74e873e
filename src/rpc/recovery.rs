//! Panic capture for handler invocations.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use futures_util::FutureExt;

/// What a caught panic left behind.
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub message: String,
    /// `file:line`, when the hook was installed.
    pub location: Option<String>,
    pub backtrace: Option<String>,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<(String, String)>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Record the location and backtrace of every panic on the panicking thread.
///
/// The previous hook still runs. Installing twice is a no-op.
pub fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}", l.file(), l.line()))
                .unwrap_or_default();
            let backtrace = Backtrace::force_capture().to_string();
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some((location, backtrace)));
            previous(info);
        }));
    });
}

/// Run `f` to completion, turning a panic in either the call or the
/// returned future into a [`PanicReport`].
pub async fn catch<F, Fut, T>(f: F) -> Result<T, PanicReport>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let fut = match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(fut) => fut,
        Err(payload) => return Err(report(payload)),
    };
    AssertUnwindSafe(fut).catch_unwind().await.map_err(report)
}

fn report(payload: Box<dyn Any + Send>) -> PanicReport {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    };
    let captured = LAST_PANIC.with(|slot| slot.borrow_mut().take());
    let (location, backtrace) = match captured {
        Some((location, backtrace)) => (Some(location), Some(backtrace)),
        None => (None, None),
    };
    PanicReport {
        message,
        location,
        backtrace,
    }
}
