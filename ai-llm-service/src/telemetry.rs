use std::io::{self, IsTerminal};

use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Targets of the workspace crates whose events get the detailed format.
pub const WORKSPACE_TARGETS: &[&str] = &[
    "geogpt_rag",
    "ai_llm_service",
    "rag_store",
    "contextor",
    "deep_discovery",
    "services",
    "api",
];

/// RFC3339 UTC timer implemented via `chrono`.
/// Example output: `2025-09-12T10:20:30Z`
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        let s = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

/// Formatting layer for the service:
///
/// - RFC3339 UTC timestamps
/// - Compact single-line format with target and `file:line`
/// - Span close events (duration at the end of spans)
/// - ANSI colors only when stdout is a terminal
///
/// Compose it in the binary together with an [`EnvFilter`].
pub fn layer<S>() -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let use_ansi = io::stdout().is_terminal();

    fmt::layer()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(use_ansi)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .event_format(fmt::format().compact().with_source_location(true))
}

/// Creates an `EnvFilter` from `RUST_LOG`, or from `default` when unset or
/// invalid, then raises every workspace crate to `level`.
///
/// Example: `default = "warn"`, `level = Level::INFO` shows INFO for our
/// crates and WARN for dependencies (hyper, reqwest, tonic...).
pub fn env_filter_with_level(default: &str, level: Level) -> EnvFilter {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return from_env;
    }
    let mut filter = EnvFilter::try_new(default).unwrap_or_else(|_| EnvFilter::new("warn"));
    let lvl = level.as_str().to_lowercase();
    for target in WORKSPACE_TARGETS {
        if let Ok(d) = format!("{target}={lvl}").parse() {
            filter = filter.add_directive(d);
        }
    }
    filter
}
