use std::time::Instant;

use clap::Parser;
use sparse_reconstruction::cloud::FrameMode;
use sparse_reconstruction::io::{write_point_cloud, write_report};
use sparse_reconstruction::matcher::MatchFilter;
use sparse_reconstruction::{Intrinsics, ReconstructionConfig, Reconstructor};

#[derive(Parser)]
#[command(version, about, author)]
struct SreconCli {
    /// path to image folder
    path: String,

    #[arg(long, default_value_t = 495.21153939)]
    fx: f64,

    #[arg(long, default_value_t = 504.81851369)]
    fy: f64,

    #[arg(long, default_value_t = 335.75450282)]
    cx: f64,

    #[arg(long, default_value_t = 179.00894773)]
    cy: f64,

    /// reconstruction config json, defaults are used for missing fields
    #[arg(long)]
    config: Option<String>,

    #[arg(short, long, default_value = "point_cloud.json")]
    output: String,

    #[arg(long)]
    report: Option<String>,

    #[arg(long)]
    max_features: Option<usize>,

    /// use mutual nearest neighbor instead of the ratio test
    #[arg(long)]
    mutual: bool,

    /// express all pairs in the frame of the first image
    #[arg(long)]
    chained: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = SreconCli::parse();

    let mut config = match &cli.config {
        Some(path) => match ReconstructionConfig::from_json_file(path) {
            Ok(c) => c,
            Err(e) => {
                log::error!("cannot read config {}: {}", path, e);
                std::process::exit(2);
            }
        },
        None => ReconstructionConfig::default(),
    };
    if let Some(n) = cli.max_features {
        config.extractor.max_features = n;
    }
    if cli.mutual {
        config.matcher.filter = MatchFilter::MutualNearest;
    }
    if cli.chained {
        config.frame_mode = FrameMode::Chained;
    }

    let intrinsics = Intrinsics::new(cli.fx, cli.fy, cli.cx, cli.cy);
    let frame_mode = config.frame_mode;
    let reconstructor = Reconstructor::new(intrinsics, config);

    let now = Instant::now();
    let reconstruction = match reconstructor.reconstruct_folder(&cli.path) {
        Ok(r) => r,
        Err(e) => {
            log::error!("reconstruction failed: {}", e);
            std::process::exit(1);
        }
    };
    let duration_sec = now.elapsed().as_secs_f64();
    println!(
        "reconstructed {} points from {} images in {:.3} sec",
        reconstruction.cloud.len(),
        reconstruction.image_count,
        duration_sec
    );

    if let Err(e) = write_point_cloud(&cli.output, &reconstruction.cloud, frame_mode) {
        log::error!("cannot write {}: {}", cli.output, e);
        std::process::exit(1);
    }
    if let Some(report) = &cli.report {
        if let Err(e) = write_report(report, &intrinsics, frame_mode, &reconstruction) {
            log::error!("cannot write {}: {}", report, e);
            std::process::exit(1);
        }
    }
}
