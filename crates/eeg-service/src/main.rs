//! EEG Service - relative band power features and classification
//!
//! Command-line stand-in for the HTTP gateway: predictions against a
//! directory-backed bucket, feature dumps and synthetic recordings.
//!
//! # Usage
//!
//! ```bash
//! # Predict the configured demo recording
//! BUCKET_NAME=./bucket MODEL_PATH=model.json eeg-service predict --demo
//!
//! # Predict an uploaded key, or pass the raw request body
//! eeg-service --config service.json predict --key uploads/subject.set
//! eeg-service predict --request '{"s3_key": "uploads/subject.set"}'
//!
//! # Print the feature tensor of a local file
//! eeg-service features recording.set
//!
//! # Write a synthetic 19-channel recording with an alpha rhythm on channel 0
//! eeg-service simulate bucket/sample_data/sample_eeg.set --pattern-channel 0
//!
//! # Theta on channel 4 over a slow drift on every channel
//! eeg-service simulate theta.set --pattern-channel 4 --pattern theta --background "sweat drift"
//!
//! # List the named signal patterns
//! eeg-service patterns
//! ```

mod config;
mod error;
mod service;
mod storage;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::ServiceConfig;
use eeg_core::format::{write_set, EeglabWriteOptions};
use eeg_processing::FeaturePipeline;
use eeg_simulation::{ChannelPattern, EegSimConfig, EegSimulator, SignalPattern};
use error::ErrorResponse;
use service::{PredictRequest, PredictionService};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// EEG relative band power classifier
#[derive(Parser, Debug)]
#[command(name = "eeg-service")]
#[command(author, version, about = "EEG relative band power classifier service", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Service configuration JSON (environment variables otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a recording from the bucket
    Predict {
        /// Object key of an uploaded recording
        #[arg(long, conflicts_with_all = ["demo", "request"])]
        key: Option<String>,

        /// Use the demo recording
        #[arg(long, conflicts_with = "request")]
        demo: bool,

        /// Demo key override
        #[arg(long, requires = "demo")]
        demo_key: Option<String>,

        /// Raw JSON request body
        #[arg(long)]
        request: Option<String>,
    },

    /// Print the feature tensor of a local recording as JSON
    Features {
        path: PathBuf,
    },

    /// Write a synthetic EEGLAB recording
    Simulate {
        output: PathBuf,

        #[arg(long, default_value = "10.0")]
        duration: f64,

        #[arg(long, default_value = "256.0")]
        sampling_rate: f64,

        #[arg(long, default_value = "19")]
        channels: usize,

        /// Channel that carries `--pattern`
        #[arg(long, visible_alias = "alpha-channel")]
        pattern_channel: Option<usize>,

        /// Named pattern for `--pattern-channel`
        #[arg(long, default_value = "alpha")]
        pattern: String,

        /// Named pattern added to every channel; may be repeated
        #[arg(long)]
        background: Vec<String>,

        /// Store samples in a companion .fdt file
        #[arg(long)]
        companion: bool,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// List the named signal patterns accepted by `simulate`
    Patterns,

    /// Report service health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("EEG service v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path),
        None => ServiceConfig::from_env(),
    }
    .context("failed to load service configuration")?;

    match cli.command {
        Commands::Predict { key, demo, demo_key, request } => {
            let request = match (request, key) {
                (Some(body), _) => PredictRequest::from_body(&body),
                (None, Some(key)) => PredictRequest::for_key(key),
                (None, None) => PredictRequest { demo, demo_key, s3_key: None },
            };
            run_predict(&config, request).await?;
        }
        Commands::Features { path } => {
            run_features(&config, path)?;
        }
        Commands::Simulate {
            output,
            duration,
            sampling_rate,
            channels,
            pattern_channel,
            pattern,
            background,
            companion,
            seed,
        } => {
            let channel_patterns = match pattern_channel {
                Some(channel) => vec![ChannelPattern { channel, pattern: named_pattern(&pattern)? }],
                None => Vec::new(),
            };
            let background = background
                .iter()
                .map(|name| named_pattern(name))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let sim = EegSimConfig {
                sampling_rate,
                channel_count: channels,
                background,
                channel_patterns,
                seed,
                ..Default::default()
            };
            run_simulate(sim, duration, output, companion)?;
        }
        Commands::Patterns => {
            for (name, pattern) in SignalPattern::presets() {
                println!("{:<16} {:>6.1} Hz  {}", name, pattern.frequency(), pattern.description());
            }
        }
        Commands::Health => {
            let service = PredictionService::from_config(&config)?;
            println!("{}", serde_json::to_string(&service.health())?);
        }
    }

    Ok(())
}

/// Serve one prediction and print the response body
async fn run_predict(config: &ServiceConfig, request: PredictRequest) -> anyhow::Result<()> {
    let service = PredictionService::from_config(config).context("service startup failed")?;

    match service.predict(&request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&e))?);
            anyhow::bail!("prediction failed ({})", e.kind())
        }
    }
}

fn run_features(config: &ServiceConfig, path: PathBuf) -> anyhow::Result<()> {
    let pipeline = FeaturePipeline::new(config.pipeline.clone())?;
    let run = pipeline.run_with_metrics(&path)?;

    for m in &run.metrics {
        info!(stage = ?m.stage, time_us = m.processing_time_us, "stage timing");
    }

    let output = serde_json::json!({
        "path": path.display().to_string(),
        "windows": run.window_count,
        "bands": pipeline.config().bands.iter().map(|b| b.name.clone()).collect::<Vec<_>>(),
        "features": run.tensor.to_nested(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn named_pattern(name: &str) -> anyhow::Result<SignalPattern> {
    SignalPattern::preset(name).with_context(|| {
        let known: Vec<&str> = SignalPattern::presets().into_iter().map(|(n, _)| n).collect();
        format!("unknown pattern '{}', expected one of: {}", name, known.join(", "))
    })
}

fn run_simulate(config: EegSimConfig, duration: f64, output: PathBuf, companion: bool) -> anyhow::Result<()> {
    for cp in &config.channel_patterns {
        info!(channel = cp.channel, hz = cp.pattern.frequency(), "{}", cp.pattern.description());
    }
    let recording = EegSimulator::new(config)?.generate(duration)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let options = EeglabWriteOptions { companion, ..Default::default() };
    write_set(&output, &recording, &options)
        .with_context(|| format!("failed to write {}", output.display()))?;

    info!(
        path = %output.display(),
        channels = recording.channel_count(),
        samples = recording.samples_per_channel(),
        "wrote synthetic recording"
    );
    Ok(())
}
