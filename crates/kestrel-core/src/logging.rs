//! Tracing setup.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! application's call. With the `log-init` feature, [`init_from_env`] installs
//! a `tracing-subscriber` fmt subscriber filtered by `KESTREL_LOG` (same
//! syntax as `RUST_LOG`). Setting `KESTREL_LOG_FORMAT=json` switches to JSON
//! lines.

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "KESTREL_LOG";

/// Environment variable selecting the output format (`json` or `text`).
pub const LOG_FORMAT_ENV: &str = "KESTREL_LOG_FORMAT";

/// Filter used when `KESTREL_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "warn";

/// Install a global subscriber from the environment.
///
/// Returns `false` if a global subscriber was already installed.
#[cfg(feature = "log-init")]
pub fn init_from_env() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
