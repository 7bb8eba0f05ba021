//! `tracing-subscriber` setup for the binaries.
//!
//! Library code only emits events; nothing is printed until a binary calls
//! [`init`]. Filter with `RUST_LOG`, e.g.
//!
//! ```bash
//! RUST_LOG=bucketsim::simulation=debug cargo run -- --trajectories 10
//! RUST_LOG=bucketsim::portfolio=trace cargo run -- --trajectories 1 --months 3
//! ```

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default directive when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// `RUST_LOG` if set and valid, else `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install a compact stderr subscriber. `quiet` raises the default to `warn`.
/// Returns `false` when a global subscriber was already set, in which case
/// that one stays in charge.
pub fn init(quiet: bool) -> bool {
    let default = if quiet { "warn" } else { DEFAULT_FILTER };
    tracing_subscriber::registry()
        .with(env_filter(default))
        .with(fmt::layer().compact().with_target(true).with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_existing_subscriber() {
        // Other tests in this binary may have installed one first.
        init(true);
        assert!(!init(false));
        tracing::info!("logging initialised");
    }

    #[test]
    fn default_directives_parse() {
        for directive in [DEFAULT_FILTER, "warn"] {
            assert!(EnvFilter::try_new(directive).is_ok(), "{directive}");
        }
    }
}
