use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use katahaba::detect::Detection;
use katahaba::{
    config, storage, ControllerEvent, EffectController, EffectParams, IndicatorGeometry, Mask,
    Pipeline, Point, Rect, StaticFaceDetector, StaticSegmenter,
};
use log::{debug, info, warn};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "katahaba")]
#[command(version, about = "Selfie face and shoulder slimming")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the slimming effect to a photo and save the result
    Apply {
        /// Input photo, already upright
        #[arg(short, long)]
        input: PathBuf,
        /// Face candidate as x,y,width,height[,score] in pixels. Repeat for
        /// several candidates; the highest scoring one is used. Without any
        /// the photo is saved unchanged
        #[arg(short, long)]
        face: Vec<String>,
        /// Person segmentation mask (grayscale, any resolution)
        #[arg(short, long)]
        mask: Option<PathBuf>,
        /// Effect intensity in [0, 1]
        #[arg(long)]
        intensity: Option<f32>,
        /// Effect radius as a fraction of face width
        #[arg(long)]
        radius: Option<f32>,
        /// Effect centre offset as dx,dy in pixels
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<String>,
        /// Also widen the shoulders
        #[arg(long)]
        shoulders: bool,
        /// Output path (defaults to a new file in the photo directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print a JSON summary
        #[arg(long)]
        report: bool,
        /// Preview size as width,height; the report then also gives the
        /// indicator in preview coordinates
        #[arg(long, requires = "report")]
        view: Option<String>,
    },
    /// Open config file in editor
    Config,
}

#[derive(Serialize)]
struct Report {
    output: PathBuf,
    applied: bool,
    width: u32,
    height: u32,
    center: Option<[f32; 2]>,
    effect_radius: Option<f32>,
    indicator_outer_diameter: Option<f32>,
    indicator_inner_diameter: Option<f32>,
    view_indicator: Option<ViewIndicator>,
}

impl Report {
    fn new(
        output: PathBuf,
        applied: bool,
        extent: (u32, u32),
        indicator: Option<IndicatorGeometry>,
        view: Option<Point>,
    ) -> Self {
        let view_indicator = match (indicator, view) {
            (Some(i), Some(view)) => Some(i.fit_to_view(extent, (view.x, view.y)).into()),
            _ => None,
        };
        Self {
            output,
            applied,
            width: extent.0,
            height: extent.1,
            center: indicator.map(|i| [i.center.x, i.center.y]),
            effect_radius: indicator.map(|i| i.outer_diameter / 2.0),
            indicator_outer_diameter: indicator.map(|i| i.outer_diameter),
            indicator_inner_diameter: indicator.map(|i| i.inner_diameter),
            view_indicator,
        }
    }
}

#[derive(Serialize)]
struct ViewIndicator {
    center: [f32; 2],
    outer_diameter: f32,
    inner_diameter: f32,
}

impl From<IndicatorGeometry> for ViewIndicator {
    fn from(i: IndicatorGeometry) -> Self {
        Self {
            center: [i.center.x, i.center.y],
            outer_diameter: i.outer_diameter,
            inner_diameter: i.inner_diameter,
        }
    }
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            input,
            face,
            mask,
            intensity,
            radius,
            offset,
            shoulders,
            output,
            report,
            view,
        } => {
            let cfg = config::load_config(cli.config.as_deref())?;
            let candidates = face
                .iter()
                .map(|raw| parse_detection(raw))
                .collect::<Result<Vec<_>>>()?;
            let view = view.as_deref().map(parse_view).transpose()?;
            let offset = offset.as_deref().map(parse_point).transpose()?;

            let mut params = cfg.effect_params();
            if let Some(i) = intensity {
                params.intensity = i;
            }
            if let Some(r) = radius {
                params.face_effect_radius = r;
            }
            if let Some(o) = offset {
                params.center_offset = o;
            }

            let mut settings = cfg.warp_settings();
            settings.shoulders_enabled |= shoulders;

            let segmenter = match mask {
                Some(path) => StaticSegmenter::new(Mask::open(&path)?),
                None => StaticSegmenter::whole_frame(),
            };
            let pipeline = Pipeline::new(
                Arc::new(StaticFaceDetector::from_detections(&candidates)),
                Arc::new(segmenter),
                settings,
            );

            let report = report.then_some(ReportOptions { view });
            apply(&cfg, pipeline, params, &input, output, report)
        }
        Commands::Config => open_config(cli.config.as_deref()),
    }
}

struct ReportOptions {
    view: Option<Point>,
}

fn apply(
    cfg: &config::Config,
    pipeline: Pipeline,
    params: EffectParams,
    input: &Path,
    output: Option<PathBuf>,
    report: Option<ReportOptions>,
) -> Result<()> {
    let img = image::open(input).with_context(|| format!("opening {}", input.display()))?;
    let extent = (img.width(), img.height());
    info!("Loaded {} ({}x{})", input.display(), extent.0, extent.1);

    let (mut controller, events) = EffectController::new(pipeline, params);
    controller.capture(img);

    let applied = loop {
        match events.recv().context("effect controller stopped")? {
            ControllerEvent::ResultReady { applied, .. } => break applied,
            ControllerEvent::StateChanged(state) => debug!("state: {:?}", state),
            ControllerEvent::IndicatorChanged(indicator) => debug!("indicator: {:?}", indicator),
        }
    };
    controller.join();

    let processed = controller
        .processed()
        .context("no processed image was published")?;
    let path = match output {
        Some(path) => {
            storage::save_photo(&processed, &path, extent).context("Failed to save photo")?;
            path
        }
        None => storage::save_to_dir(&processed, cfg.photo_dir(), &cfg.format, extent)
            .context("Failed to save photo")?,
    };

    if applied {
        info!("✓ Saved slimmed photo to {}", path.display());
    } else {
        warn!("Effect not applied; saved the original photo to {}", path.display());
    }

    if let Some(options) = report {
        let summary = Report::new(path, applied, extent, controller.indicator(), options.view);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    Ok(())
}

fn parse_floats(raw: &str, expected: usize, what: &str) -> Result<Vec<f32>> {
    let values = raw
        .split(',')
        .map(|s| s.trim().parse::<f32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("parsing {} '{}'", what, raw))?;
    if values.len() != expected {
        anyhow::bail!("{} needs {} comma separated numbers, got '{}'", what, expected, raw);
    }
    Ok(values)
}

/// `x,y,w,h` with an optional trailing score (defaults to 1).
fn parse_detection(raw: &str) -> Result<Detection> {
    let expected = if raw.split(',').count() == 5 { 5 } else { 4 };
    let v = parse_floats(raw, expected, "face box")?;
    Ok(Detection {
        rect: Rect::new(v[0], v[1], v[2], v[3]),
        score: v.get(4).copied().unwrap_or(1.0),
    })
}

fn parse_point(raw: &str) -> Result<Point> {
    let v = parse_floats(raw, 2, "offset")?;
    Ok(Point::new(v[0], v[1]))
}

fn parse_view(raw: &str) -> Result<Point> {
    let v = parse_floats(raw, 2, "view size")?;
    if !(v[0] > 0.0 && v[1] > 0.0) {
        anyhow::bail!("view size must be positive, got '{}'", raw);
    }
    Ok(Point::new(v[0], v[1]))
}

fn open_config(path: Option<&Path>) -> Result<()> {
    let config_path = path.unwrap_or(config::CONFIG_PATH.as_path());
    if !config_path.exists() {
        config::save_config(&config::Config::default(), Some(config_path))
            .context("Failed to write default config")?;
    }
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
