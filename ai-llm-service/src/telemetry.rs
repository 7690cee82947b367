use std::io::{self, IsTerminal};

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter, fmt};

/// Target prefixes of the crates that make up the search stack.
pub const SEARCH_TARGETS: &[&str] = &[
    "ai_llm_service",
    "filter_agent",
    "product_store",
    "search_pipeline",
    "search_eval",
    "api",
    "shop_search",
];

/// RFC3339 UTC timer, e.g. `2025-09-12T10:20:30Z`.
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        w.write_str(&now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }
}

/// Compact formatting layer that renders only events whose target starts
/// with one of `prefixes`.
///
/// ANSI colors are enabled only when stdout is a terminal. Compose it in the
/// binary together with an [`EnvFilter`].
pub fn layer<S>(prefixes: &'static [&'static str]) -> impl Layer<S> + Send + Sync
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let only_ours =
        filter::filter_fn(move |meta| prefixes.iter().any(|p| meta.target().starts_with(p)));

    fmt::layer()
        .with_timer(ChronoRfc3339Utc)
        .with_level(true)
        .with_target(true)
        .with_ansi(io::stdout().is_terminal())
        .event_format(fmt::format().compact())
        .with_filter(only_ours)
}

/// `RUST_LOG` if set and valid, otherwise `default`.
pub fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}
