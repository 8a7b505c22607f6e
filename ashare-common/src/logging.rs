//! Logging setup for the recap tools.
//!
//! Provides pretty or structured JSON output through `tracing-subscriber`.
//!
//! # Noise Filtering
//!
//! HTTP and HTML parsing libraries (hyper, reqwest, h2, rustls, html5ever,
//! selectors) are set to `warn` so scrape runs stay readable while business
//! logs keep the configured level.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Library modules clamped to `warn` unless `RUST_LOG` says otherwise.
pub const NOISY_MODULES: &[&str] = &[
    "hyper",
    "hyper_util",
    "reqwest",
    "h2",
    "rustls",
    "html5ever",
    "selectors",
];

/// Build the filter directive string for a base level.
fn build_directives(log_level: &str) -> String {
    NOISY_MODULES
        .iter()
        .fold(log_level.to_string(), |acc, module| format!("{acc},{module}=warn"))
}

fn build_filter(log_level: &str) -> EnvFilter {
    // Environment wins so a single run can be debugged without editing config
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::new(build_directives(log_level))
}

/// Install the global subscriber.
///
/// `log_format` is `"json"` for one JSON object per event (with the current
/// span, so `run_id` shows up on every line) or anything else for the
/// human-readable format. Only the first call takes effect.
pub fn init_logging(log_level: &str, log_format: &str) {
    let filter = build_filter(log_level);

    let subscriber = tracing_subscriber::registry().with(filter);

    if log_format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true);
        let _ = subscriber.with(fmt_layer).try_init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(true)
            .with_file(false)
            .with_line_number(false);
        let _ = subscriber.with(fmt_layer).try_init();
    }

    tracing::debug!(
        log_level = %log_level,
        log_format = %log_format,
        noise_filtered = NOISY_MODULES.len(),
        "Logging initialized"
    );
}

/// Generate a new run ID for correlating one pipeline execution.
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
