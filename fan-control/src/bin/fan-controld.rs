//! Fan control daemon.
//!
//! Drives the fan's PWM line from the CPU temperature and logs its speed
//! from the tachometer, until SIGTERM or SIGINT.

use anyhow::Result;
use tracing::Level;

use fan_control::config::Config;
use fan_control::daemon;

#[tokio::main]
async fn main() -> Result<()> {
    fan_control::tracing::init(Level::INFO);

    let config = Config::from_env();
    daemon::run(config).await?;

    Ok(())
}
