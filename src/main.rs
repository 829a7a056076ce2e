use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use segment_outline::cache::decode_rgb;
use segment_outline::config::ServiceConfig;
use segment_outline::invoker::PromptPoint;
use segment_outline::predictor::RegionGrowPredictor;
use segment_outline::render::{draw_polygon_overlay, render_mask_png};
use segment_outline::server::create_router;
use segment_outline::{SegmentationRequest, Segmenter};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "segment-outline")]
#[command(about = "Point-prompted image segmentation with polygon outlines", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the segmentation API and the static front-end
    Serve {
        /// Interface to listen on
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,

        /// Directory holding the front-end files
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Segment a single image file and print the polygons as JSON
    Segment {
        /// Image to segment
        image: PathBuf,

        /// Normalized point inside the object, as `x,y`
        #[arg(long, required = true, value_parser = parse_point)]
        include: Vec<(f64, f64)>,

        /// Normalized point outside the object, as `x,y`
        #[arg(long, value_parser = parse_point)]
        exclude: Vec<(f64, f64)>,

        /// Mask binarization threshold
        #[arg(long, default_value_t = 0.0)]
        threshold: f32,

        /// Drop polygons smaller than this fraction of the image area
        #[arg(long, default_value_t = 0.0)]
        area_ratio: f64,

        /// Where to write the mask PNG
        #[arg(long, short, default_value = "mask.png")]
        output: PathBuf,

        /// Also write the polygons drawn over the source image
        #[arg(long)]
        overlay: Option<PathBuf>,
    },
}

fn parse_point(text: &str) -> Result<(f64, f64), String> {
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{text}`"))?;
    let x = x.trim().parse::<f64>().map_err(|e| format!("bad x: {e}"))?;
    let y = y.trim().parse::<f64>().map_err(|e| format!("bad y: {e}"))?;
    Ok((x, y))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServiceConfig> {
    match path {
        Some(path) => ServiceConfig::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(ServiceConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            static_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(static_dir) = static_dir {
                config.server.static_dir = static_dir;
            }
            config.validate()?;
            serve(config).await
        }
        Commands::Segment {
            image,
            include,
            exclude,
            threshold,
            area_ratio,
            output,
            overlay,
        } => {
            let bytes =
                std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;
            let points = include
                .iter()
                .map(|&(x, y)| PromptPoint::include(x, y))
                .chain(exclude.iter().map(|&(x, y)| PromptPoint::exclude(x, y)))
                .collect();
            let request = SegmentationRequest {
                points,
                image: bytes,
                threshold,
                area_ratio,
                multimask: false,
            };

            let segmenter = Segmenter::new(RegionGrowPredictor::new(config.predictor));
            let Some(segmentation) = segmenter.segment(&request)? else {
                bail!("no points given");
            };

            std::fs::write(&output, render_mask_png(&segmentation.mask)?)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(path = %output.display(), "mask written");

            if let Some(overlay) = overlay {
                let source = decode_rgb(&request.image)?;
                draw_polygon_overlay(&source, &segmentation.polygons)
                    .save(&overlay)
                    .with_context(|| format!("writing {}", overlay.display()))?;
                info!(path = %overlay.display(), "overlay written");
            }

            println!("{}", serde_json::to_string_pretty(&segmentation.polygons)?);
            Ok(())
        }
    }
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let addr = config.server.socket_addr()?;
    let segmenter = Arc::new(Segmenter::new(RegionGrowPredictor::new(
        config.predictor.clone(),
    )));
    let router = create_router(segmenter, &config.server);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        static_dir = %config.server.static_dir.display(),
        "segmentation service listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
    }
}
