// SPDX-License-Identifier: GPL-3.0-only
use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;

use monitor_ddc::protocols::edid::{DecodedEdid, VideoInput};
use monitor_ddc::{Config, ControlId, FrameError, ReadResponse, SessionProvider, SessionRegistry};

#[macro_use]
extern crate tracing;

/// Read and change monitor settings over DDC/CI
#[derive(Parser, Debug)]
#[command(name = "monitor-ddc", version, about, long_about = None)]
struct Args {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ~/.config/monitor-ddc/config.kdl)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a control's current and maximum value
    Get {
        /// Bus number, device name or path (4, i2c-4, /dev/i2c-4)
        display: String,
        /// Control name or feature code (brightness, 0x10, 16)
        control: ControlId,
    },
    /// Change a control's value
    Set {
        display: String,
        control: ControlId,
        value: u16,
    },
    /// Decode the display's EDID
    Edid { display: String },
    /// List the controls this tool knows
    Controls,
    /// Show the effective timing configuration
    Config {
        /// Apply the overrides for this display
        display: Option<String>,
    },
}

fn setup_logs(verbosity: u8) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or(EnvFilter::new(format!(
        "warn,{}={}",
        env!("CARGO_CRATE_NAME"),
        level
    )));

    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    }
}

#[cfg(all(feature = "i2c-dev", target_os = "linux"))]
fn provider() -> anyhow::Result<monitor_ddc::session::i2c_dev::I2cDevProvider> {
    Ok(monitor_ddc::session::i2c_dev::I2cDevProvider::new())
}

#[cfg(not(all(feature = "i2c-dev", target_os = "linux")))]
fn provider() -> anyhow::Result<monitor_ddc::MockProvider> {
    bail!("this build has no display transport; rebuild with the `i2c-dev` feature on Linux")
}

#[derive(Serialize)]
struct ControlReading {
    display: String,
    control: &'static str,
    code: u8,
    current_value: u16,
    max_value: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logs(args.verbose);

    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    match args.command {
        Command::Controls => print_controls(args.json),
        Command::Config { display } => print_config(&config, display.as_deref(), args.json),
        Command::Get { display, control } => {
            let registry = SessionRegistry::new(provider()?, config);
            let result = get(&registry, &display, control, args.json).await;
            release(&registry, &display).await;
            result
        }
        Command::Set { display, control, value } => {
            let registry = SessionRegistry::new(provider()?, config);
            let result = set(&registry, &display, control, value).await;
            release(&registry, &display).await;
            result
        }
        Command::Edid { display } => {
            let registry = SessionRegistry::new(provider()?, config);
            let result = edid(&registry, &display, args.json).await;
            release(&registry, &display).await;
            result
        }
    }
}

async fn get<P: SessionProvider + 'static>(
    registry: &SessionRegistry<P>,
    display: &str,
    control: ControlId,
    json: bool,
) -> anyhow::Result<()> {
    let session = registry
        .get_or_open(display)
        .await
        .with_context(|| format!("Failed to open display {}", display))?;

    let value = match session.get_control(control).await? {
        ReadResponse::Valid(value) => value,
        ReadResponse::Invalid(FrameError::Unsupported) => {
            bail!("Display {} does not support {}", display, control)
        }
        ReadResponse::Invalid(reason) => {
            bail!("No valid reply from display {} for {}: {}", display, control, reason)
        }
    };

    if json {
        let reading = ControlReading {
            display: display.to_string(),
            control: control.name(),
            code: control.code(),
            current_value: value.current_value,
            max_value: value.max_value,
        };
        println!("{}", serde_json::to_string_pretty(&reading)?);
    } else {
        println!("{}: {} / {}", control, value.current_value, value.max_value);
    }
    Ok(())
}

async fn set<P: SessionProvider + 'static>(
    registry: &SessionRegistry<P>,
    display: &str,
    control: ControlId,
    value: u16,
) -> anyhow::Result<()> {
    if !control.spec().access.writable() {
        bail!("{} is read-only", control);
    }
    if let Some(max) = control.spec().typical_max {
        if value > max {
            warn!("{} is above the usual maximum of {} for {}", value, max, control);
        }
    }

    let session = registry
        .get_or_open(display)
        .await
        .with_context(|| format!("Failed to open display {}", display))?;
    session
        .set_control(control, value)
        .await
        .with_context(|| format!("Failed to set {} on display {}", control, display))?;
    let display_id = display;
    info!(display_id = %display_id, control = %control, value, "Set control");
    Ok(())
}

async fn edid<P: SessionProvider + 'static>(
    registry: &SessionRegistry<P>,
    display: &str,
    json: bool,
) -> anyhow::Result<()> {
    let session = registry
        .get_or_open(display)
        .await
        .with_context(|| format!("Failed to open display {}", display))?;
    let decoded = session
        .read_edid()
        .await
        .with_context(|| format!("Failed to read EDID from display {}", display))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decoded)?);
    } else {
        print_edid(&decoded);
    }
    Ok(())
}

fn print_edid(decoded: &DecodedEdid) {
    let record = &decoded.record;

    if !decoded.checksum_ok {
        println!("warning: checksum mismatch, data may be corrupt");
    }
    println!("Manufacturer:  {} (product {:04X})", record.manufacturer, record.product_code);
    if let Some(name) = record.display_name() {
        println!("Name:          {}", name);
    }
    match record.serial_text() {
        Some(serial) => println!("Serial:        {}", serial),
        None => println!("Serial:        {}", record.serial_number),
    }
    let made = if record.is_model_year() { "Model year" } else { "Made" };
    println!("{}:          {} week {}", made, record.manufacture_year, record.manufacture_week);
    println!("EDID version:  {}.{}", record.version, record.revision);

    let input = match record.basic.input {
        VideoInput::Digital { interface, bit_depth: Some(bits), .. } => {
            format!("digital, {:?}, {} bits per color", interface, bits)
        }
        VideoInput::Digital { interface, .. } => format!("digital, {:?}", interface),
        VideoInput::Analog { .. } => "analog".to_string(),
    };
    println!("Input:         {}", input);
    println!(
        "Size:          {} x {} cm",
        record.basic.max_horizontal_cm, record.basic.max_vertical_cm
    );
    if let Some(gamma) = record.basic.gamma() {
        println!("Gamma:         {:.2}", gamma);
    }
    if let Some(timing) = record.preferred_timing() {
        let hz = timing.refresh_rate().unwrap_or_default();
        println!(
            "Preferred:     {}x{} @ {:.2} Hz",
            timing.horizontal_active, timing.vertical_active, hz
        );
    }
    for timing in record.standard_timings.iter().flatten() {
        println!(
            "Standard:      {}x{} @ {} Hz",
            timing.horizontal_active,
            timing.vertical_active(),
            timing.refresh_rate
        );
    }
    if record.extension_count > 0 {
        println!("Extensions:    {}", record.extension_count);
    }
}

fn print_controls(json: bool) -> anyhow::Result<()> {
    let specs: Vec<_> = ControlId::ALL.iter().map(|c| c.spec()).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&specs)?);
        return Ok(());
    }
    for spec in specs {
        let max = spec.typical_max.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string());
        println!("0x{:02X}  {:<32} {:<10} {}", spec.code, spec.name, format!("{:?}", spec.access), max);
    }
    Ok(())
}

fn print_config(config: &Config, display: Option<&str>, json: bool) -> anyhow::Result<()> {
    let timing = match display {
        Some(id) => config.transaction_for(id),
        None => config.transaction.clone(),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&timing)?);
        return Ok(());
    }
    println!("reply-delay-ms    {}", timing.reply_delay_ms);
    println!("settle-delay-ms   {}", timing.settle_delay_ms);
    println!("reply-timeout-ms  {}", timing.reply_timeout_ms);
    println!("max-retries       {}", timing.max_retries);
    println!("reply-capacity    {}", timing.reply_capacity);
    Ok(())
}

async fn release<P: SessionProvider + 'static>(registry: &SessionRegistry<P>, display: &str) {
    if registry.get(display).await.is_some() {
        if let Err(e) = registry.close(display).await {
            let display_id = display;
            debug!(display_id = %display_id, error = %e, "Closing display failed");
        }
    }
}
