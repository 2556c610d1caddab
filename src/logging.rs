//! # Structured Logging
//!
//! Environment-aware structured logging that outputs to both console and a
//! JSON log file, for following requests through the broker and the venue
//! store.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::detect_environment;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Directory log files are written to
pub const LOG_DIR: &str = "log";

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs the subscriber.
/// `RUST_LOG` overrides the environment's default level.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = detect_environment();
        let log_level = get_log_level(&environment);

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");
        let log_dir = PathBuf::from(LOG_DIR);

        let console = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(env_filter(&log_level));

        // Console-only when the log directory cannot be created
        let file = match fs::create_dir_all(&log_dir) {
            Ok(()) => {
                let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
                let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                // The writer must outlive every span for the rest of the process
                std::mem::forget(guard);
                Some(
                    fmt::layer()
                        .with_writer(file_writer)
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true)
                        .with_ansi(false)
                        .json()
                        .with_filter(env_filter(&log_level)),
                )
            }
            Err(e) => {
                eprintln!("failed to create log directory {}: {e}", log_dir.display());
                None
            }
        };

        let file_enabled = file.is_some();
        if tracing_subscriber::registry()
            .with(console)
            .with(file)
            .try_init()
            .is_err()
        {
            tracing::debug!("A global subscriber was already installed; keeping it");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_dir.join(&log_filename).display(),
            file_enabled = file_enabled,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Default filter directive for an environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for service lifecycle operations
pub fn log_service_operation(component: &str, operation: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        component = %component,
        operation = %operation,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🛰️ SERVICE_OPERATION"
    );
}

pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
