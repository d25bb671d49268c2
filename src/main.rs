use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reelsmith::config::{Config, TtsProvider};
use reelsmith::render::check_ffmpeg;
use reelsmith::{print_summary, Job, Pipeline, ReelError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "reelsmith")]
#[command(version, about = "Short-form vertical video generation")]
#[command(
    long_about = "Turn a narration script into a 9:16 video with synthesized voices, word-synced subtitles and keyword-anchored image overlays."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one video from a script file
    Run {
        /// Script file; `Name: text` lines switch speaker
        #[arg(short, long)]
        script: PathBuf,

        /// Config file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory that receives one `job_<id>` folder per run
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Hide progress spinners
        #[arg(long)]
        no_progress: bool,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

/// Exit status for a failed run: the pipeline's own code when there is one.
fn exit_code_for(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ReelError>())
        .map(|e| e.exit_code() as u8)
        .unwrap_or(1)
}

async fn run(
    script_path: &Path,
    config_path: Option<&Path>,
    output_dir: &Path,
    show_progress: bool,
) -> Result<()> {
    let script = std::fs::read_to_string(script_path)
        .map_err(|e| ReelError::InvalidInput(format!("cannot read {}: {e}", script_path.display())))
        .context("Failed to read script")?;

    let config = Config::load(config_path).context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    check_ffmpeg().context("FFmpeg is required to render videos")?;

    info!("Script:     {}", script_path.display());
    info!("Output dir: {}", output_dir.display());
    info!("Resolution: {}", config.resolution());
    info!("Voice:      {}", config.tts.provider);
    if config.tts.provider == TtsProvider::Stub {
        warn!("Using the stub synthesizer, narration will be silent");
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCancelling...");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl+C handler")?;

    let pipeline = Pipeline::from_config(&config, show_progress)?;
    let mut job = Job::new(output_dir);
    info!("Job:        {}", job.id);

    let result = pipeline.run(&mut job, &script, &cancel).await?;
    print_summary(&result);

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let outcome = match &cli.command {
        Command::Run {
            script,
            config,
            output_dir,
            no_progress,
        } => run(script, config.as_deref(), output_dir, !no_progress).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}
