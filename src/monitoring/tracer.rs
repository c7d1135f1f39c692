/*!
 * Structured Tracing
 * Subscriber setup and per-operation spans using the tracing crate
 */

use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Operations slower than this are reported at `warn`
const SLOW_OPERATION: Duration = Duration::from_millis(250);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - UVFS_TRACE_JSON: Enable JSON output (default: false)
/// - UVFS_LOG_FILE: Write the request log to this file instead of stderr
///
/// Installing a second subscriber is a no-op.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("UVFS_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let log_file = std::env::var("UVFS_LOG_FILE").ok().and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| eprintln!("uvfs: cannot open log file {}: {}", path, e))
            .ok()
    });
    let to_file = log_file.is_some();
    let writer = match log_file {
        Some(file) => BoxMakeWriter::new(Mutex::new(file)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(!to_file)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_file(true)
                    .compact(),
            )
            .try_init()
    };
    if installed.is_ok() {
        info!(json = use_json, to_file, "structured tracing initialized");
    }
}

/// Unique trace id for correlating one operation's log lines
#[must_use]
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one filesystem operation
///
/// Logs completion on drop; slow operations (usually a remote fetch behind
/// a deferred node) are logged at `warn`.
pub struct FsOpSpan {
    span: Span,
    start: Instant,
    op: &'static str,
    trace_id: String,
}

impl FsOpSpan {
    pub fn new(op: &'static str, path: &str) -> Self {
        let trace_id = generate_trace_id();
        let span = span!(
            Level::DEBUG,
            "fs_op",
            trace_id = %trace_id,
            op = op,
            path = path,
            duration_ms = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            op,
            trace_id,
        }
    }

    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Enter the span for the duration of the operation
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn record_error(&self, error: &dyn std::fmt::Display) {
        self.span.record("error", tracing::field::display(error));
    }
}

impl Drop for FsOpSpan {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_ms", elapsed.as_millis() as u64);
        if elapsed > SLOW_OPERATION {
            warn!(
                trace_id = %self.trace_id,
                op = self.op,
                duration_ms = elapsed.as_millis() as u64,
                slow = true,
                "slow filesystem operation"
            );
        } else {
            debug!(
                trace_id = %self.trace_id,
                op = self.op,
                duration_us = elapsed.as_micros() as u64,
                "filesystem operation completed"
            );
        }
    }
}
