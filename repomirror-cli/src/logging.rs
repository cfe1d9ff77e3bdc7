//! Logging setup.

use time::macros::format_description;
use time::UtcOffset;
use tracing::Span;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::EnvFilter;

/// Capture the local UTC offset.
///
/// Must run before any other thread exists; falls back to UTC when the offset
/// cannot be determined safely.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Default filter directive for the given verbosity flags.
fn default_level(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the flags.
pub fn init_logging(offset: UtcOffset, verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbose, quiet)));

    let timer = OffsetTime::new(
        offset,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    );

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Root span carrying the message prefix, so every log line shows it.
pub fn prefix_span(prefix: Option<&str>) -> Span {
    match prefix {
        Some(prefix) => tracing::info_span!("mirror", prefix = %prefix),
        None => Span::none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(false, false), "info");
        assert_eq!(default_level(true, false), "debug");
        assert_eq!(default_level(false, true), "warn");
    }
}
