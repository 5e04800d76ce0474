//! Tracing setup. Logs go to stderr so command output stays pipeable.
//!
//! Filtering follows `RUST_LOG`; the default keeps this crate at `info` and
//! silences dependency chatter. Nothing sensitive is ever logged: key
//! material, plaintext payloads, and tokens stay out of events by
//! construction.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,passkeeper=info"));

    // try_init: the test harness may install a subscriber more than once.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
