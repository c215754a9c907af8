//! Tracing subscriber setup.
//!
//! Logs go to stderr so CLI output on stdout stays clean. The filter comes
//! from `[logging].level` unless `RUST_LOG` is set:
//!
//! ```bash
//! RUST_LOG=debug kb serve
//! RUST_LOG=knowledge_base::collections=trace kb ingest notes.md --collection docs
//! ```

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Initialize logging. Only the first call takes effect.
pub fn init(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(&config.level)
        };

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_filter(filter);

        // try_init: a test harness or embedding binary may already own the global subscriber
        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}
