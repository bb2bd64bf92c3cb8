//! CLI for Widefill - batch widescreen image generation from a prompt CSV.

use clap::{CommandFactory, Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use widefill::{
    read_prompts, AspectRatio, BatchOptions, BatchSummary, CanvasOptions, FluxFillProvider,
    OpenAiImageProvider, Pipeline, RecordOutcome,
};

#[derive(Parser)]
#[command(name = "widefill")]
#[command(about = "Generate images from CSV prompts using GPT-Image-1 and Flux Fill Pro")]
#[command(version)]
struct Cli {
    /// Path to CSV file containing prompts
    #[arg(default_value = "input.csv")]
    csv_file: PathBuf,

    /// Aspect ratio for generated images
    #[arg(long, value_enum, default_value = "16:9")]
    aspect_ratio: AspectRatioArg,

    /// Maximum number of images to generate (default: process all lines)
    #[arg(long)]
    limit: Option<usize>,

    /// Directory for generated images
    #[arg(short, long, default_value = "generated_images")]
    output_dir: PathBuf,

    /// Length of the extended side in pixels
    #[arg(long, default_value_t = widefill::canvas::DEFAULT_TARGET_LONG_SIDE)]
    canvas_size: u32,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "16:9")]
    Landscape,
    #[value(name = "9:16")]
    Portrait,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Landscape => AspectRatio::Landscape,
            AspectRatioArg::Portrait => AspectRatio::Portrait,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if !cli.csv_file.is_file() {
        println!("Error: CSV file '{}' not found", cli.csv_file.display());
        Cli::command().print_help()?;
        std::process::exit(1);
    }

    let ratio: AspectRatio = cli.aspect_ratio.into();
    let canvas = CanvasOptions {
        target_long_side: cli.canvas_size,
        ..CanvasOptions::default()
    };

    let generator = OpenAiImageProvider::builder()
        .api_key(secret("OPENAI_API_KEY"))
        .build()?;
    let inpainter = FluxFillProvider::builder()
        .api_token(secret("REPLICATE_API_TOKEN"))
        .build()?;

    print_banner(&cli, ratio, &canvas);

    let records = read_prompts(&cli.csv_file)?;
    let options = BatchOptions {
        output_dir: cli.output_dir.clone(),
        aspect_ratio: ratio,
        limit: cli.limit,
        canvas,
    };

    let summary = Pipeline::new(&generator, &inpainter, options)
        .run(records)
        .await?;

    print_summary(&summary);
    Ok(())
}

/// Reads a credential; a missing one is reported by each failing record.
fn secret(name: &str) -> String {
    let value = std::env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        tracing::warn!("{name} is not set; requests that need it will fail");
    }
    value
}

fn init_logging(verbose: bool) {
    let default = if verbose { "widefill=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_banner(cli: &Cli, ratio: AspectRatio, canvas: &CanvasOptions) {
    println!(
        "Starting {} image generation from {}",
        ratio,
        cli.csv_file.display()
    );
    if let Some(limit) = cli.limit {
        println!("Limiting to {} image(s)", limit);
    }

    let (bw, bh) = ratio.base_size();
    let (fw, fh) = ratio.extended_size(canvas.target_long_side);
    println!(
        "Process: GPT-Image-1 ({bw}x{bh}) → Canvas Extension → Flux Fill Pro → {ratio} Output ({fw}x{fh})\n"
    );
}

fn print_summary(summary: &BatchSummary) {
    for outcome in &summary.outcomes {
        if let RecordOutcome::Failed { line, stage, error } = outcome {
            println!("✗ line {line} failed during {stage}: {error}");
        }
    }
    println!("\nImage generation complete!");
    println!(
        "Saved: {}  Skipped: {}  Failed: {}",
        summary.saved(),
        summary.skipped(),
        summary.failed()
    );
}
