use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use two_view_reconstruction::io::{load_features, object_from_json, read_intrinsic};
use two_view_reconstruction::scene::{CheiralityPolicy, IntrinsicMode};
use two_view_reconstruction::{PipelineConfig, PipelineError, TwoViewPipeline};

#[derive(Parser)]
#[command(version, about, author)]
struct TvrsCli {
    /// features of the first image (json)
    #[arg(short = 'i', long)]
    left: PathBuf,

    /// features of the second image (json)
    #[arg(short = 'j', long)]
    right: PathBuf,

    /// calibration file, 3x3 row-major K
    #[arg(short = 'k', long)]
    intrinsic: PathBuf,

    /// output directory
    #[arg(short = 'o', long, default_value = ".")]
    output: PathBuf,

    /// suffix of every output file name
    #[arg(short = 'p', long, default_value = "")]
    prefix: String,

    /// pipeline configuration (json), flags below override it
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    intrinsic_mode: Option<IntrinsicMode>,

    #[arg(long, value_enum)]
    cheirality: Option<CheiralityPolicy>,

    /// AC-RANSAC trial budget
    #[arg(long)]
    max_iterations: Option<usize>,

    /// nearest neighbour distance ratio
    #[arg(long)]
    distance_ratio: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,
}

fn run(cli: &TvrsCli) -> Result<(), PipelineError> {
    let mut config: PipelineConfig = match &cli.config {
        Some(path) => object_from_json(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(mode) = cli.intrinsic_mode {
        config.intrinsic_mode = mode;
    }
    if let Some(policy) = cli.cheirality {
        config.cheirality = policy;
    }
    if let Some(n) = cli.max_iterations {
        config.ransac.max_iterations = n;
    }
    if let Some(ratio) = cli.distance_ratio {
        config.matcher.distance_ratio = ratio;
    }
    if let Some(seed) = cli.seed {
        config.ransac.seed = seed;
    }

    let k = read_intrinsic(&cli.intrinsic)?;
    let left = load_features(&cli.left)?;
    let right = load_features(&cli.right)?;

    let now = Instant::now();
    let output = TwoViewPipeline::new(config).run(&left, &right, &k)?;
    log::info!("reconstruction took {:.3} sec", now.elapsed().as_secs_f64());

    for path in output.write(&cli.output, &cli.prefix)? {
        log::debug!("wrote {}", path.display());
    }
    log::info!(
        "{} landmarks written to {}",
        output.result.landmarks.len(),
        cli.output.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = TvrsCli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
