use clap::{Parser, Subcommand};
use nalgebra as na;
use std::path::Path;
use two_view_reconstruction::io::{object_to_json, write_intrinsic};
use two_view_reconstruction::synthetic::{SyntheticConfig, default_relative_pose, generate_two_view};
use two_view_reconstruction::types::{Pose, RvecTvec};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic two view dataset
    Generate {
        /// Output directory
        #[arg(short, long)]
        output: String,

        /// Number of 3D points
        #[arg(short, long, default_value = "200")]
        num_points: usize,

        /// Fraction of wrong correspondences
        #[arg(long, default_value = "0.2")]
        outlier_ratio: f64,

        /// Uniform pixel noise amplitude
        #[arg(long, default_value = "0.5")]
        noise: f64,

        /// Focal length in pixels
        #[arg(long, default_value = "500")]
        focal: f64,

        /// Image width
        #[arg(long, default_value = "640")]
        width: u32,

        /// Image height
        #[arg(long, default_value = "480")]
        height: u32,

        /// Baseline direction of the second camera, the first one is at the origin
        #[arg(long, num_args = 3, default_values_t = [1.0, 0.1, 0.05], allow_negative_numbers = true)]
        center: Vec<f64>,

        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

#[derive(serde::Serialize)]
struct GroundTruth {
    pose: RvecTvec,
    points: Vec<[f64; 3]>,
    num_inliers: usize,
    num_outliers: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Commands::Generate {
            output,
            num_points,
            outlier_ratio,
            noise,
            focal,
            width,
            height,
            center,
            seed,
        } => {
            let config = SyntheticConfig {
                width,
                height,
                focal,
                num_points,
                outlier_ratio,
                noise_px: noise,
                seed,
                ..Default::default()
            };
            let pose = match center.as_slice() {
                [x, y, z] => Pose::from_center(
                    default_relative_pose().rotation,
                    &na::Vector3::new(*x, *y, *z),
                ),
                _ => default_relative_pose(),
            };
            generate_dataset(Path::new(&output), &config, &pose)?;
        }
    }

    Ok(())
}

fn generate_dataset(
    output_dir: &Path,
    config: &SyntheticConfig,
    pose: &Pose,
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(output_dir)?;
    let data = generate_two_view(config, pose)?;

    object_to_json(&output_dir.join("features_0.json"), &data.left)?;
    object_to_json(&output_dir.join("features_1.json"), &data.right)?;
    write_intrinsic(&output_dir.join("K.txt"), &data.k)?;
    object_to_json(
        &output_dir.join("ground_truth.json"),
        &GroundTruth {
            pose: RvecTvec::from(&data.pose),
            points: data.points.iter().map(|p| (*p).into()).collect(),
            num_inliers: data.true_matches.len(),
            num_outliers: data.outlier_matches.len(),
        },
    )?;

    log::info!(
        "generated {} correspondences ({} outliers) in {}",
        data.points.len(),
        data.outlier_matches.len(),
        output_dir.display()
    );
    Ok(())
}
