//! Subscriber installation

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Readable lines, statement text included
    Development,
    /// JSON lines, operation boundaries only
    Production,
    /// Bare registry; tests install [`init_test_capture`](super::init_test_capture) instead
    Test,
}

impl Profile {
    fn filter(self) -> &'static str {
        match self {
            Profile::Development => "stowage=debug,stowage_core=debug,stowage_store=debug",
            Profile::Production => "stowage_core=info,stowage_store=info",
            Profile::Test => "off",
        }
    }
}

static INSTALLED: Once = Once::new();

/// Install the global subscriber for a profile
///
/// Only the first call has an effect. `RUST_LOG` replaces the profile filter.
pub fn init(profile: Profile) {
    INSTALLED.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(profile.filter()));
        match profile {
            Profile::Development => tracing_subscriber::fmt().with_env_filter(filter).init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init(),
            Profile::Test => tracing_subscriber::registry().init(),
        }
    });
}
