//! Command-line interface for fan-control.
//!
//! One-shot diagnostics against the same configuration the daemon uses:
//! inspect the curve, read the sensor, or sample the tachometer.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::time::Instant;
use tracing::Level;

use fan_control::config::Config;
use fan_control::curve::Profile;
use fan_control::duty::compute_duty;
use fan_control::hw::{SysfsEdgeInput, ThermalZone};
use fan_control::hw_trait::{EdgeSource, TemperatureSource};
use fan_control::profile::resolve_profile;
use fan_control::tach::{PulseAccumulator, estimate_rpm};

const CURVE_STEP_C: f32 = 2.5;

#[tokio::main]
async fn main() -> Result<()> {
    fan_control::tracing::init(Level::WARN);

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        usage();
        std::process::exit(1);
    }

    let config = Config::from_env();
    let command = &args[1];

    match command.as_str() {
        "profile" => cmd_profile(&config),
        "duty" => cmd_duty(&config, args.get(2))?,
        "curve" => cmd_curve(&config),
        "temp" => cmd_temp(&config)?,
        "rpm" => cmd_rpm(&config, args.get(2)).await?,
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!();
            usage();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn usage() {
    eprintln!("Usage: fan-cli <command>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  profile          Show the profile the daemon would use");
    eprintln!("  duty <temp_c>    Show the duty for a temperature");
    eprintln!("  curve            Print the temperature-to-duty table");
    eprintln!("  temp             Read the CPU temperature");
    eprintln!("  rpm [seconds]    Sample the tachometer (default 1 s)");
    eprintln!();
    eprintln!("Configuration is read from FAN_CONTROL_* environment variables.");
}

fn cmd_profile(config: &Config) {
    let profile = resolve_profile(&config.profile_path);
    println!("Profile: {} ({})", profile, config.profile_path.display());
}

fn duty_for(config: &Config, profile: Profile, temp_c: f32) -> f32 {
    let t = &config.thresholds;
    compute_duty(temp_c, t.off_temp_c, t.min_temp_c, t.max_temp_c, profile)
}

fn cmd_duty(config: &Config, temp: Option<&String>) -> Result<()> {
    let Some(temp) = temp else {
        bail!("duty needs a temperature in °C");
    };
    let temp_c: f32 = temp
        .trim()
        .parse()
        .with_context(|| format!("not a temperature: '{temp}'"))?;

    let profile = resolve_profile(&config.profile_path);
    let duty = duty_for(config, profile, temp_c);
    println!("{temp_c:.1}°C -> {:.1}% ({profile})", duty * 100.0);
    Ok(())
}

fn cmd_curve(config: &Config) {
    let profile = resolve_profile(&config.profile_path);
    let t = &config.thresholds;

    println!(
        "Profile {profile}: off <= {}°C, ramp {}..{}°C",
        t.off_temp_c, t.min_temp_c, t.max_temp_c
    );
    println!("  temp °C    duty %");

    let start = t.off_temp_c.min(t.min_temp_c) - 5.0;
    let end = t.max_temp_c + 5.0;
    let steps = ((end - start) / CURVE_STEP_C).floor().max(0.0) as u32;
    for i in 0..=steps {
        let temp_c = start + i as f32 * CURVE_STEP_C;
        let duty = duty_for(config, profile, temp_c);
        println!("  {temp_c:7.1}  {:8.1}", duty * 100.0);
    }
}

fn cmd_temp(config: &Config) -> Result<()> {
    let mut zone = ThermalZone::new(config.thermal_zone_path.clone());
    let temp_c = zone
        .read_celsius()
        .with_context(|| format!("reading {}", zone.path().display()))?;
    println!("{temp_c:.1}°C");
    Ok(())
}

/// Sample window in seconds, default one.
fn parse_window(seconds: Option<&String>) -> Result<Duration> {
    let Some(s) = seconds else {
        return Ok(Duration::from_secs(1));
    };
    let secs: f32 = s
        .trim()
        .parse()
        .with_context(|| format!("not a number of seconds: '{s}'"))?;
    if !(secs.is_finite() && secs > 0.0) {
        bail!("sample window must be positive");
    }
    Duration::try_from_secs_f32(secs)
        .with_context(|| format!("sample window out of range: {secs} s"))
}

async fn cmd_rpm(config: &Config, seconds: Option<&String>) -> Result<()> {
    let window = parse_window(seconds)?;

    let mut input = SysfsEdgeInput::open(&config.sysfs_root, config.tach.gpio)
        .with_context(|| format!("opening tachometer GPIO {}", config.tach.gpio))?;
    let accumulator = Arc::new(PulseAccumulator::with_debounce(config.tach.debounce));
    let subscription = input
        .subscribe(config.tach.edge, accumulator.edge_callback())
        .context("subscribing to tachometer edges")?;

    accumulator.drain();
    let started = Instant::now();
    tokio::time::sleep(window).await;
    let pulses = accumulator.drain();
    let elapsed = started.elapsed();
    subscription.stop();

    let rpm = estimate_rpm(
        pulses,
        elapsed.as_secs_f32(),
        config.tach.pulses_per_revolution,
    );
    println!("{rpm:.0} RPM ({pulses} pulses in {:.2} s)", elapsed.as_secs_f32());
    Ok(())
}
