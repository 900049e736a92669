//! Logging setup shared by the daemon and the CLI.
//!
//! Modules pull the macros in through [`prelude`] so the call sites stay
//! the same whichever subscriber is installed.

use std::env;

use ::tracing::Level;
use time::macros::format_description;
use tracing_subscriber::{
    EnvFilter, filter::LevelFilter, fmt::time::LocalTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

/// Set by systemd on services whose stdout/stderr is connected to the
/// journal.
const JOURNAL_STREAM_VAR: &str = "JOURNAL_STREAM";

/// Install the global subscriber.
///
/// Honors `RUST_LOG`, falling back to `default_level`. Under systemd the
/// journald layer is used so fields arrive as structured journal entries;
/// otherwise lines go to stderr with a local timestamp.
pub fn init(default_level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level).into())
        .from_env_lossy();

    if env::var_os(JOURNAL_STREAM_VAR).is_some() {
        match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(journald)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("journald unavailable ({e}); logging to stderr");
            }
        }
    }

    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(timer)
                .with_target(false),
        )
        .init();
}
