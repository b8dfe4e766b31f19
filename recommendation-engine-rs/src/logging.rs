//! # Structured Logging
//!
//! Installs the global `tracing` subscriber for processes embedding the
//! engine. Engine code only emits events; it never installs a subscriber
//! on its own.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use recommender_types::{LoggingConfig, SearchContext};
use tracing::Span;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::error::{EngineError, Result};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Flushes the non-blocking file writer; must live as long as the process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initializes the structured logging system. Calling it again is a no-op.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},warn", config.level)));

    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .with_span_list(true)
    });

    let text_layer = (!config.json_format).then(|| fmt::layer().with_target(true).with_thread_ids(true));

    let file_layer = match (config.file_output, config.log_dir.as_deref()) {
        (true, Some(log_dir)) => {
            let appender = RollingFileAppender::new(
                Rotation::DAILY,
                log_dir,
                format!("{}.log", config.service_name),
            );
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
        }
        _ => None,
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| EngineError::Logging(format!("Failed to set global subscriber: {}", e)))?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}

pub fn is_initialized() -> bool {
    LOGGING_INITIALIZED.load(Ordering::SeqCst)
}

/// Span carrying the request's correlation fields
pub fn request_span(operation: &'static str, context: &SearchContext) -> Span {
    tracing::info_span!(
        "request",
        operation,
        session_id = %context.session_id,
        language = %context.language,
    )
}
