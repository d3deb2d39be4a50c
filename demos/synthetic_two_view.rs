use two_view_reconstruction::synthetic::{SyntheticConfig, default_relative_pose, generate_two_view};
use two_view_reconstruction::types::rotation_angle;
use two_view_reconstruction::{PipelineConfig, TwoViewPipeline};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = SyntheticConfig {
        outlier_ratio: 0.25,
        noise_px: 0.5,
        ..Default::default()
    };
    let truth = default_relative_pose();
    let data = generate_two_view(&config, &truth).unwrap();
    let output = TwoViewPipeline::new(PipelineConfig::default())
        .run(&data.left, &data.right, &data.k)
        .unwrap();

    let estimated = output.result.relative.inverse();
    let angle = rotation_angle(&estimated.rotation, &truth.rotation);
    let t_est = estimated.translation.normalize();
    let t_true = truth.translation.normalize();
    println!("rotation error: {:.5} deg", angle.to_degrees());
    println!(
        "translation direction error: {:.5} deg",
        t_est.dot(&t_true).clamp(-1.0, 1.0).acos().to_degrees()
    );
    println!(
        "{} landmarks, final rmse {:.4} px",
        output.result.landmarks.len(),
        output.adjustment.final_rmse
    );
}
