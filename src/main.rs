use std::fs;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use platewatch::config::{InferenceConfig, PipelineConfig};
use platewatch::{InferenceService, TrainingPipeline};

const TRACING_TARGET_CLI: &str = "platewatch::cli";

#[derive(Parser)]
#[command(name = "platewatch")]
#[command(about = "Train and run a license plate detector")]
#[command(version)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest, validate and engineer the dataset, then train a model
    Train(Box<PipelineConfig>),

    /// Detect plates in a single image
    Predict {
        /// Image to run detection on
        #[arg(long, value_name = "IMAGE")]
        input: PathBuf,

        /// Where to write the annotated image
        #[arg(long, value_name = "IMAGE", conflicts_with = "as_base64")]
        output: Option<PathBuf>,

        /// Print the annotated image as base64 to stdout
        #[arg(long = "base64")]
        as_base64: bool,

        #[clap(flatten)]
        inference: InferenceConfig,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(error) = run(cli.command) {
        tracing::error!(target: TRACING_TARGET_CLI, error = %error, "command failed");
        eprintln!("Error: {error:#}");
        process::exit(1);
    }
}

fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Train(config) => {
            let mut pipeline = TrainingPipeline::new(*config);
            let artifact = pipeline
                .run_pipeline()
                .context("training pipeline failed")?;
            println!("Trained model: {}", artifact.trained_model_path().display());
        }
        Command::Predict {
            input,
            output,
            as_base64,
            inference,
        } => {
            let service = InferenceService::new(inference)?;
            let image = fs::read(&input)
                .with_context(|| format!("cannot read {}", input.display()))?;

            if as_base64 {
                let encoded = STANDARD.encode(&image);
                println!("{}", service.predict_base64(&encoded)?);
            } else {
                let rendered = service.predict_bytes(&image)?;
                let output = output.unwrap_or_else(|| input.with_extension("pred.jpg"));
                fs::write(&output, rendered)
                    .with_context(|| format!("cannot write {}", output.display()))?;
                println!("Prediction written to {}", output.display());
            }
        }
    }
    Ok(())
}

/// Initializes tracing with environment-based filtering.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
