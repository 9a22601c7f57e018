use std::sync::Once;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Initialize console logging. Safe to call more than once; only the first
/// call installs the subscriber.
pub fn init() {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry().with(
            fmt::Layer::new()
                .with_target(true)
                .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
        );

        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    });
}
