//! Pulsewear host simulator
//!
//! Runs the wrist pipeline against synthetic sensors on simulated time and
//! prints every payload the device would notify.
//!
//! # Usage
//!
//! ```bash
//! # Two minutes of batched binary frames
//! pulsewear simulate --seconds 120
//!
//! # Realtime JSON with the demo anomaly scorer
//! pulsewear simulate --mode realtime --format records --score
//!
//! # Lose the phone after 30 s, get it back at 90 s
//! pulsewear simulate --disconnect-after 30 --reconnect-after 90
//!
//! # Print the default configuration
//! pulsewear config > pulsewear.json
//! ```

mod config;
mod sim;

use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pulsewear_core::{DeliveryMode, PayloadFormat, PipelineConfig, ProfileWrite, Sex};

use crate::sim::SimOptions;

/// Pulsewear host simulator
#[derive(Parser, Debug)]
#[command(name = "pulsewear")]
#[command(author, version, about = "Wearable health monitor pipeline simulator", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline on synthetic sensors
    Simulate {
        /// Simulated duration in seconds
        #[arg(short, long, default_value = "120")]
        seconds: u64,

        /// Delivery mode: realtime or batch (overrides the config file)
        #[arg(short, long)]
        mode: Option<String>,

        /// Payload format: binary, records or summary (overrides the config file)
        #[arg(short, long)]
        format: Option<String>,

        /// Pulse rate of the synthetic PPG
        #[arg(long, default_value = "72")]
        bpm: f32,

        /// Walking cadence in steps per minute
        #[arg(long, default_value = "100")]
        cadence: f32,

        /// Drop the link after this many seconds
        #[arg(long)]
        disconnect_after: Option<u64>,

        /// Restore the link after this many seconds
        #[arg(long)]
        reconnect_after: Option<u64>,

        /// Body weight in kilograms
        #[arg(long)]
        weight: Option<f32>,

        /// Height in metres
        #[arg(long)]
        height: Option<f32>,

        /// Age in years
        #[arg(long)]
        age: Option<u8>,

        /// Biological sex: male or female
        #[arg(long)]
        sex: Option<String>,

        /// Unix time to sync the device clock to
        #[arg(long)]
        epoch: Option<u32>,

        /// Score samples with the demo anomaly model
        #[arg(long)]
        score: bool,

        /// Suppress payload output
        #[arg(short, long)]
        quiet: bool,

        /// Pipeline configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the default pipeline configuration
    Config,
}

fn parse_mode(s: &str) -> anyhow::Result<DeliveryMode> {
    match s.to_lowercase().as_str() {
        "realtime" => Ok(DeliveryMode::Realtime),
        "batch" => Ok(DeliveryMode::Batch),
        other => bail!("unknown delivery mode '{other}' (expected realtime or batch)"),
    }
}

fn parse_format(s: &str) -> anyhow::Result<PayloadFormat> {
    match s.to_lowercase().as_str() {
        "binary" => Ok(PayloadFormat::Binary),
        "records" => Ok(PayloadFormat::JsonRecords),
        "summary" => Ok(PayloadFormat::JsonSummary),
        other => bail!("unknown payload format '{other}' (expected binary, records or summary)"),
    }
}

fn parse_sex(s: &str) -> anyhow::Result<Sex> {
    match s.to_lowercase().as_str() {
        "male" | "m" => Ok(Sex::Male),
        "female" | "f" => Ok(Sex::Female),
        other => bail!("unknown sex '{other}' (expected male or female)"),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Payloads own stdout
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Config => {
            println!("{}", config::default_config_json()?);
        }
        Commands::Simulate {
            seconds,
            mode,
            format,
            bpm,
            cadence,
            disconnect_after,
            reconnect_after,
            weight,
            height,
            age,
            sex,
            epoch,
            score,
            quiet,
            config: config_path,
        } => {
            info!("Pulsewear simulator v{}", env!("CARGO_PKG_VERSION"));

            let mut pipeline = match &config_path {
                Some(path) => {
                    info!(path = %path.display(), "loading configuration");
                    config::load_config(path)?
                }
                None => PipelineConfig::default(),
            };
            if let Some(mode) = mode {
                pipeline.delivery.mode = parse_mode(&mode)?;
            }
            if let Some(format) = format {
                pipeline.delivery.format = parse_format(&format)?;
            }

            let mut writes = Vec::new();
            writes.extend(weight.map(ProfileWrite::WeightKg));
            writes.extend(height.map(ProfileWrite::HeightM));
            writes.extend(age.map(ProfileWrite::AgeYears));
            if let Some(sex) = sex {
                writes.push(ProfileWrite::Sex(parse_sex(&sex)?));
            }
            writes.extend(epoch.map(|epoch_s| ProfileWrite::TimeSync { epoch_s }));

            let opts = SimOptions {
                seconds,
                bpm,
                cadence_spm: cadence,
                disconnect_after_s: disconnect_after,
                reconnect_after_s: reconnect_after,
                writes,
                score,
                echo: !quiet,
                ..SimOptions::default()
            };

            let outcome = sim::run(&pipeline, &opts)?;
            eprintln!("{}", serde_json::to_string_pretty(&outcome.summary)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("Realtime").unwrap(), DeliveryMode::Realtime);
        assert_eq!(parse_mode("batch").unwrap(), DeliveryMode::Batch);
        assert!(parse_mode("burst").is_err());
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("records").unwrap(), PayloadFormat::JsonRecords);
        assert_eq!(parse_format("SUMMARY").unwrap(), PayloadFormat::JsonSummary);
        assert!(parse_format("xml").is_err());
    }

    #[test]
    fn test_parse_sex() {
        assert_eq!(parse_sex("f").unwrap(), Sex::Female);
        assert_eq!(parse_sex("male").unwrap(), Sex::Male);
        assert!(parse_sex("x").is_err());
    }

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::try_parse_from([
            "pulsewear",
            "simulate",
            "--seconds",
            "30",
            "--mode",
            "realtime",
            "--disconnect-after",
            "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate {
                seconds,
                mode,
                disconnect_after,
                ..
            } => {
                assert_eq!(seconds, 30);
                assert_eq!(mode.as_deref(), Some("realtime"));
                assert_eq!(disconnect_after, Some(10));
            }
            Commands::Config => panic!("wrong subcommand"),
        }
    }
}
