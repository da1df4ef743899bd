//! Query bench records.
//!
//! [`Query::cursor`](crate::Query::cursor) and [`Query::exec`](crate::Query::exec) emit one
//! JSON object per call through [`dev6!`](crate::dev6). Every record is logged as a single
//! line on the `docbridge::dev6` target. While a thread holds a [`Capture`], its records are
//! also kept as structured values so tests can inspect fields instead of matching text.

use serde_json::Value;
use std::cell::RefCell;
use std::time::Instant;

#[doc(hidden)]
pub use serde_json as __json;

thread_local! {
    static CAPTURED: RefCell<Option<Vec<Value>>> = const { RefCell::new(None) };
}

/// Stops capturing on the current thread when dropped.
#[must_use = "capturing stops when the guard drops"]
pub struct Capture(());

impl Drop for Capture {
    fn drop(&mut self) {
        CAPTURED.with(|c| *c.borrow_mut() = None);
    }
}

/// Starts capturing records emitted on the current thread.
pub fn enable_thread_sink() -> Capture {
    CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
    Capture(())
}

/// Logs a record and keeps it when the current thread is capturing.
pub fn record(value: Value) {
    log::trace!(target: crate::logger::DEV6_TARGET, "{value}");
    CAPTURED.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(value);
        }
    });
}

/// Takes the captured records. Empty when the thread is not capturing.
pub fn drain() -> Vec<Value> {
    CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Captured records whose `op` field equals `op`, without draining.
pub fn records_for(op: &str) -> Vec<Value> {
    CAPTURED.with(|c| {
        c.borrow()
            .iter()
            .flatten()
            .filter(|v| v["op"] == op)
            .cloned()
            .collect()
    })
}

/// Microseconds since `start`, saturating.
pub fn elapsed_us(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX)
}

/// Emits a bench record built with `serde_json::json!` syntax.
#[macro_export]
macro_rules! dev6 {
    ($($json:tt)+) => {
        $crate::utils::devlog::record($crate::utils::devlog::__json::json!($($json)+))
    };
}
