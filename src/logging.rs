//! Process-wide async logger (spec component C7).
//!
//! Grounded on the teacher's `ColorizedFormatter` (`logging.rs` in
//! `redhat-performance-rusty-comms`), which colors a whole rendered line by
//! level and writes it straight to the configured `tracing-subscriber`
//! writer. This module keeps that rendering but interposes the bounded
//! queue + condvar + single drain thread spec.md section 4.6 requires,
//! instead of writing directly from the event callback. The result is a
//! `tracing_subscriber::Layer` that doubles as the bespoke async logger: the
//! same `tracing::info!`/`warn!`/`error!` call sites used for diagnostics
//! throughout the crate feed this component, rather than maintaining two
//! parallel logging paths.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, OnceLock};
use std::thread::JoinHandle;

use colored::Colorize;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Default capacity of the bounded line queue. The drain thread is fast
/// enough (one `println!` per line) that this is only ever a backstop
/// against a burst of log lines outrunning stdout.
const QUEUE_CAPACITY: usize = 4096;

struct Inner {
    queue: Mutex<VecDeque<String>>,
    not_empty: Condvar,
    stopped: Mutex<bool>,
}

/// The process-wide async logger singleton.
///
/// Constructed on first use via [`AsyncLogger::global`], joined at shutdown
/// via [`AsyncLogger::shutdown`].
pub struct AsyncLogger {
    inner: &'static Inner,
    drain_thread: Mutex<Option<JoinHandle<()>>>,
}

static LOGGER: OnceLock<AsyncLogger> = OnceLock::new();

impl AsyncLogger {
    fn new() -> Self {
        let inner: &'static Inner = Box::leak(Box::new(Inner {
            queue: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
            not_empty: Condvar::new(),
            stopped: Mutex::new(false),
        }));

        let drain_thread = std::thread::Builder::new()
            .name("async-logger".into())
            .spawn(move || Self::drain_loop(inner))
            .expect("failed to spawn async logger drain thread");

        Self {
            inner,
            drain_thread: Mutex::new(Some(drain_thread)),
        }
    }

    /// Returns the process-wide singleton, constructing it (and its drain
    /// thread) on first call.
    pub fn global() -> &'static AsyncLogger {
        LOGGER.get_or_init(AsyncLogger::new)
    }

    /// Builds the `tracing_subscriber::Layer` that feeds this logger.
    /// Call once, during startup, composed into the registry alongside any
    /// other diagnostic layers (file logging, etc).
    pub fn layer() -> AsyncLoggerLayer {
        AsyncLoggerLayer {
            logger: AsyncLogger::global(),
        }
    }

    fn submit(&self, line: String) {
        let mut queue = self.inner.queue.lock().unwrap();
        if queue.len() >= QUEUE_CAPACITY {
            // Drop the oldest line rather than block the caller (which, for
            // the receive thread, must never block per spec.md section 4.2).
            queue.pop_front();
        }
        queue.push_back(line);
        self.inner.not_empty.notify_one();
    }

    fn drain_loop(inner: &'static Inner) {
        loop {
            let mut queue = inner.queue.lock().unwrap();
            while queue.is_empty() {
                if *inner.stopped.lock().unwrap() {
                    return;
                }
                queue = inner.not_empty.wait(queue).unwrap();
            }
            // Drain everything currently queued before re-checking the
            // stop flag so shutdown fully flushes in-flight lines.
            let lines: Vec<String> = queue.drain(..).collect();
            drop(queue);
            for line in lines {
                println!("{line}");
            }
        }
    }

    /// Flips the stop flag, wakes the drain thread, and joins it after the
    /// queue has been fully flushed.
    pub fn shutdown(&self) {
        *self.inner.stopped.lock().unwrap() = true;
        self.inner.not_empty.notify_one();
        if let Some(handle) = self.drain_thread.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Shuts down the global async logger, if it was ever constructed.
pub fn shutdown() {
    if let Some(logger) = LOGGER.get() {
        logger.shutdown();
    }
}

/// A `tracing_subscriber::Layer` that renders each event into a single
/// colorized, millisecond-timestamped line and hands it to the async
/// logger's queue instead of writing it inline.
pub struct AsyncLoggerLayer {
    logger: &'static AsyncLogger,
}

impl<S> Layer<S> for AsyncLoggerLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // Only INFO/WARN/ERROR are user-facing per spec.md section 4.6;
        // DEBUG/TRACE are left to the detailed diagnostic layer.
        let level = *event.metadata().level();
        if level == Level::DEBUG || level == Level::TRACE {
            return;
        }

        let mut message = String::new();
        let mut visitor = MessageVisitor(&mut message);
        event.record(&mut visitor);

        let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
        let rendered = format!("[{timestamp}] {message}");
        let colored = match level {
            Level::ERROR => rendered.red().to_string(),
            Level::WARN => rendered.yellow().to_string(),
            _ => rendered.white().to_string(),
        };

        self.logger.submit(colored);
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl tracing::field::Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            use std::fmt::Write;
            let _ = write!(self.0, "{value:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_and_drain_round_trips_a_line() {
        let logger = AsyncLogger::new();
        logger.submit("hello".to_string());
        // Give the drain thread a moment to pop the line; this test only
        // asserts that submit/shutdown do not deadlock or panic.
        std::thread::sleep(std::time::Duration::from_millis(50));
        logger.shutdown();
    }

    #[test]
    fn bounded_queue_drops_oldest_under_overflow() {
        let logger = AsyncLogger::new();
        for i in 0..(QUEUE_CAPACITY * 2) {
            logger.submit(format!("line {i}"));
        }
        logger.shutdown();
    }
}
