//! Logging initialization

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output, debug level for persistkit crates
    Development,
    /// JSON lines, info level
    Production,
    /// No output; tests install the capture layer instead
    Test,
}

impl Profile {
    fn default_directive(&self) -> &'static str {
        match self {
            Profile::Development => "persistkit=debug",
            Profile::Production => "persistkit=info",
            Profile::Test => "off",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Install the global tracing subscriber for `profile`
///
/// Safe to call repeatedly; only the first call has any effect. `RUST_LOG`
/// overrides the profile's default filter.
///
/// ```
/// use persistkit_core::logging_facility::{init, Profile};
///
/// init(Profile::Production);
/// ```
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let filter = || {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(profile.default_directive()))
        };
        match profile {
            Profile::Development => {
                let _ = tracing_subscriber::fmt().with_env_filter(filter()).try_init();
            }
            Profile::Production => {
                let _ = tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter())
                    .try_init();
            }
            Profile::Test => {
                // Capture is wired separately via init_test_capture()
                let _ = tracing_subscriber::registry().try_init();
            }
        }
    });
}
