use anyhow::{anyhow, bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_fb::{Channels, ColorFormat, Extent, FrameBuffer, ToneMapper};
use tessera_model::{demo_scene, SceneFile};
use tessera_render::image_out::{temp_path, write_color};
use tessera_render::{
    PathTracer, ProgressiveRenderer, ProgressiveSettings, RenderSummary, Scene, TraceSettings,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tessera", version, about = "Progressive tiled CPU renderer")]
struct Cli {
    /// Log filter, e.g. `debug` or `tessera_fb=debug`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Render(RenderArgs),
    DemoScene(DemoSceneArgs),
}

#[derive(Args)]
#[command(about = "Render a scene progressively into an image. Ctrl-C stops early and keeps the partial image.")]
struct RenderArgs {
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output image; `.exr` keeps linear float color, other extensions are tone mapped.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = 640)]
    width: u32,

    #[arg(long, default_value_t = 360)]
    height: u32,

    #[arg(long, default_value_t = 64)]
    frames: u32,

    /// Skip tiles whose error is at or below this. 0 renders every tile each frame.
    #[arg(long, default_value_t = 0.0)]
    variance_threshold: f32,

    /// none, rgba8 or rgba32f.
    #[arg(long, default_value = "rgba32f")]
    format: ColorFormat,

    #[arg(long)]
    no_accum: bool,

    #[arg(long)]
    no_variance: bool,

    #[arg(long, default_value_t = 0)]
    threads: usize,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    #[arg(long, default_value_t = 4)]
    max_depth: u32,

    #[arg(long, default_value_t = 1.0)]
    exposure: f32,

    /// Write the image every N frames. 0 writes only at the end.
    #[arg(long, default_value_t = 0)]
    save_every: u32,
}

#[derive(Args)]
#[command(about = "Write a small demo scene as JSON.")]
struct DemoSceneArgs {
    #[arg(long)]
    out: PathBuf,
}

#[derive(Serialize)]
struct RenderArgsSummary {
    scene: PathBuf,
    width: u32,
    height: u32,
    frames: u32,
    variance_threshold: f32,
    format: &'static str,
    accum: bool,
    variance: bool,
    threads: usize,
    seed: u64,
    max_depth: u32,
    exposure: f32,
    save_every: u32,
}

#[derive(Serialize)]
struct RenderOutcome {
    frames: u32,
    tiles_rendered: usize,
    frame_error: f32,
    stop: String,
    elapsed_ms: u128,
}

#[derive(Serialize)]
struct RunOutputs {
    image: PathBuf,
    run: PathBuf,
}

#[derive(Serialize)]
struct HostInfo {
    os: String,
    arch: String,
}

#[derive(Serialize)]
struct RunReceipt {
    version: String,
    started_at_utc: String,
    finished_at_utc: String,
    args: RenderArgsSummary,
    outcome: RenderOutcome,
    outputs: RunOutputs,
    host: HostInfo,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Render(args) => run_render(args),
        Commands::DemoScene(args) => run_demo_scene(args),
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).with_context(|| format!("invalid --log-level {level:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install logger: {err}"))
}

fn run_demo_scene(args: DemoSceneArgs) -> Result<()> {
    write_json(&args.out, &demo_scene())?;
    info!("wrote demo scene to {:?}", args.out);
    Ok(())
}

fn run_render(args: RenderArgs) -> Result<()> {
    let started_at_utc = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);

    let contents = fs::read_to_string(&args.in_path)
        .with_context(|| format!("failed to read input {:?}", args.in_path))?;
    let file: SceneFile = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse scene {:?}", args.in_path))?;
    let scene = Scene::from_file(&file).with_context(|| format!("invalid scene {:?}", args.in_path))?;

    if args.format == ColorFormat::None {
        bail!("--format none has no color buffer to write to {:?}", args.out);
    }
    let linear_output = is_exr(&args.out);

    let mut channels = Channels::DEPTH;
    if !args.no_accum {
        channels |= Channels::ACCUM;
    }
    if !args.no_variance {
        if args.no_accum {
            warn!("--no-accum also disables the variance estimate");
        } else {
            channels |= Channels::VARIANCE;
        }
    }
    if args.variance_threshold > 0.0 && !channels.contains(Channels::VARIANCE) {
        warn!("--variance-threshold has no effect without a variance buffer");
    }

    let extent = Extent::new(args.width, args.height);
    let mut fb = FrameBuffer::new(extent, args.format, channels)?;
    if !linear_output {
        fb.set_pixel_op(Some(Arc::new(ToneMapper {
            exposure: args.exposure,
            ..ToneMapper::default()
        })));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed))
            .context("failed to install Ctrl-C handler")?;
    }

    let tracer = PathTracer::new(
        &scene,
        extent,
        TraceSettings {
            seed: args.seed,
            max_depth: args.max_depth,
        },
    );
    let renderer = ProgressiveRenderer::new(
        &fb,
        tracer,
        ProgressiveSettings {
            max_frames: args.frames,
            error_threshold: args.variance_threshold,
            threads: args.threads,
        },
    );

    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output directory {:?}", parent))?;
        }
    }

    let mut write_error: Option<anyhow::Error> = None;
    let summary = renderer.run(&cancel, |report| {
        if args.save_every == 0 || write_error.is_some() || (report.frame + 1) % args.save_every != 0 {
            return;
        }
        match write_color(&args.out, &fb) {
            Ok(()) => info!("render: wrote frame {} to {:?}", report.frame + 1, args.out),
            Err(err) => write_error = Some(anyhow!("failed to write image: {err}")),
        }
    })?;
    if let Some(err) = write_error {
        return Err(err);
    }

    write_color(&args.out, &fb).map_err(|err| anyhow!("failed to write image: {err}"))?;
    info!("render: wrote {:?}", args.out);

    let run_path = receipt_path(&args.out);
    let receipt = RunReceipt {
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at_utc,
        finished_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        args: RenderArgsSummary {
            scene: args.in_path.clone(),
            width: args.width,
            height: args.height,
            frames: args.frames,
            variance_threshold: args.variance_threshold,
            format: args.format.name(),
            accum: fb.has_accum(),
            variance: fb.has_variance(),
            threads: args.threads,
            seed: args.seed,
            max_depth: args.max_depth,
            exposure: args.exposure,
            save_every: args.save_every,
        },
        outcome: outcome(&summary),
        outputs: RunOutputs {
            image: args.out.clone(),
            run: run_path.clone(),
        },
        host: HostInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        },
    };
    write_json(&run_path, &receipt)
}

fn outcome(summary: &RenderSummary) -> RenderOutcome {
    RenderOutcome {
        frames: summary.frames,
        tiles_rendered: summary.tiles_rendered,
        frame_error: summary.frame_error,
        stop: format!("{:?}", summary.stop).to_lowercase(),
        elapsed_ms: summary.elapsed.as_millis(),
    }
}

fn is_exr(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("exr"))
}

fn receipt_path(image: &Path) -> PathBuf {
    image.with_file_name("run.json")
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &json)
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory {:?}", parent))?;
    }

    let tmp_path = temp_path(path);
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create temp file {:?}", tmp_path))?;
    file.write_all(data)
        .with_context(|| format!("failed to write temp file {:?}", tmp_path))?;
    file.sync_all()
        .with_context(|| format!("failed to sync temp file {:?}", tmp_path))?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(anyhow!("failed to replace output {:?}: {}", path, err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_flags_parse() {
        let cli = Cli::try_parse_from([
            "tessera",
            "render",
            "--in",
            "scene.json",
            "--out",
            "out/frame.exr",
            "--format",
            "rgba8",
            "--variance-threshold",
            "0.05",
            "--no-variance",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Commands::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.format, ColorFormat::Rgba8);
        assert_eq!(args.variance_threshold, 0.05);
        assert!(args.no_variance && !args.no_accum);
        assert!(is_exr(&args.out));
        assert_eq!(receipt_path(&args.out), PathBuf::from("out/run.json"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let result = Cli::try_parse_from([
            "tessera", "render", "--in", "a.json", "--out", "b.png", "--format", "srgba",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn json_is_written_atomically() {
        let dir = std::env::temp_dir().join(format!("tessera-cli-{}", std::process::id()));
        let path = dir.join("scene.json");
        write_json(&path, &demo_scene()).unwrap();

        let decoded: SceneFile = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded, demo_scene());
        let leftovers = fs::read_dir(&dir)
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().file_name() != "scene.json")
            .count();
        assert_eq!(leftovers, 0);
        fs::remove_dir_all(&dir).unwrap();
    }
}
