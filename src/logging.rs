//! # Structured Logging Module
//!
//! Environment-aware structured logging for session, work item and storage
//! operations. Console output is human readable by default and switches to
//! JSON when `LOG_FORMAT=json`.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::constants::ENVIRONMENT_VARIABLES;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json_output = std::env::var("LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let console_layer = if json_output {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // Keep whatever subscriber the host application installed
        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json_output,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    ENVIRONMENT_VARIABLES
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .unwrap_or_else(|| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        "test" | "development" => "debug".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for session operations
pub fn log_session_operation(
    operation: &str,
    session_id: Option<i64>,
    version: Option<i64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        session_id = session_id,
        version = version,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 SESSION_OPERATION"
    );
}

/// Log structured data for work item operations
pub fn log_work_item_operation(
    operation: &str,
    session_id: Option<i64>,
    process_instance_id: Option<i64>,
    work_item_id: Option<i64>,
    task_type: Option<&str>,
    status: &str,
) {
    tracing::info!(
        operation = %operation,
        session_id = session_id,
        process_instance_id = process_instance_id,
        work_item_id = work_item_id,
        task_type = task_type,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 WORK_ITEM_OPERATION"
    );
}

/// Log structured data for database operations
pub fn log_database_operation(
    operation: &str,
    table: Option<&str>,
    record_id: Option<i64>,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        table = table,
        record_id = record_id,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 DATABASE_OPERATION"
    );
}

/// Log error with full context
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
