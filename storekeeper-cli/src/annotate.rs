//! Tracing setup, with GitHub Actions workflow annotations.
//!
//! Under `GITHUB_ACTIONS=true`, warning and error events are prefixed with
//! `::warning::` / `::error::` so they surface in the run summary.

use std::fmt::{self, Write as _};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Wraps an event formatter and prepends a workflow command by level.
pub struct Annotated<F> {
    inner: F,
}

impl<F> Annotated<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

pub fn annotation(level: &Level) -> Option<&'static str> {
    match *level {
        Level::ERROR => Some("::error::"),
        Level::WARN => Some("::warning::"),
        _ => None,
    }
}

impl<S, N, F> FormatEvent<S, N> for Annotated<F>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    F: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        if let Some(prefix) = annotation(event.metadata().level()) {
            writer.write_str(prefix)?;
        }
        self.inner.format_event(ctx, writer, event)
    }
}

fn running_in_github_actions() -> bool {
    std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true")
}

/// Install the global subscriber: `info` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = tracing_subscriber::fmt::format().with_target(false);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let _ = if running_in_github_actions() {
        builder.event_format(Annotated::new(format)).try_init()
    } else {
        builder.event_format(format).try_init()
    };
}
