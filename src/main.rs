use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use reqwest::Client;
use url::Url;

use promptreel::encoding::{is_ffmpeg_available, VideoArtifact, VideoMetadata};
use promptreel::generator::{GeneratorConfig, SceneGenerator};
use promptreel::pipeline::{render_scene, VideoPipeline};
use promptreel::progress::{ProgressSink, StderrProgress};
use promptreel::renderer::SceneRenderer;
use promptreel::scene::{extract_render_config, strip_code_fences};
use promptreel::upscale::{LanczosUpscaler, UpscalePipeline};

#[derive(Debug, Parser)]
#[command(name = "promptreel")]
#[command(about = "Text-to-video pipeline: prompt -> scene script -> frames -> mp4")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate a video from a natural-language prompt.
    Generate {
        prompt: String,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// Chain the 2x upscale pass after the initial encode.
        #[arg(long, default_value_t = false)]
        hd: bool,
        #[arg(long)]
        model: Option<String>,
        #[arg(long = "api-url")]
        api_url: Option<String>,
        #[arg(long = "timeout-seconds", default_value_t = 120)]
        timeout_seconds: u64,
        /// Also write the generated scene source to this path.
        #[arg(long = "save-scene")]
        save_scene: Option<PathBuf>,
    },
    /// Render an existing scene source file without calling the model.
    Render {
        scene: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Upscale an existing video to double resolution.
    Upscale {
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, default_value_t = 30)]
        fps: u32,
    },
    /// Resolve and print the render config for a scene source file.
    Check {
        scene: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Generate {
            prompt,
            output,
            hd,
            model,
            api_url,
            timeout_seconds,
            save_scene,
        } => {
            run_generate(
                &prompt,
                output,
                hd,
                model,
                api_url,
                timeout_seconds,
                save_scene,
            )
            .await
        }
        Commands::Render { scene, output } => run_render(&scene, output),
        Commands::Upscale {
            input,
            output,
            width,
            height,
            fps,
        } => run_upscale(&input, &output, width, height, fps),
        Commands::Check { scene } => run_check(&scene),
    }
}

async fn run_generate(
    prompt: &str,
    output: Option<PathBuf>,
    hd: bool,
    model: Option<String>,
    api_url: Option<String>,
    timeout_seconds: u64,
    save_scene: Option<PathBuf>,
) -> Result<()> {
    ensure_ffmpeg()?;
    let api_key = env::var("OPENROUTER_API_KEY")
        .context("OPENROUTER_API_KEY is required to call the generation endpoint")?;

    let mut config = GeneratorConfig::new(api_key);
    if let Some(model) = model {
        config.model = model;
    }
    if let Some(api_url) = api_url {
        Url::parse(&api_url).with_context(|| format!("invalid --api-url '{api_url}'"))?;
        config.api_url = api_url;
    }

    let http = Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .context("failed to create HTTP client")?;
    let pipeline = VideoPipeline::new(SceneGenerator::new(http, config));

    let output = output.unwrap_or_else(default_output_name);
    let mut progress = StderrProgress;
    let outcome = pipeline.generate(prompt, &output, &mut progress).await?;

    if let Some(scene_path) = save_scene {
        fs::write(&scene_path, &outcome.scene_source)
            .with_context(|| format!("failed to write scene source {}", scene_path.display()))?;
    }
    report_artifact(&outcome.artifact);

    if hd {
        let hd_output = hd_output_name(&output);
        let artifact = run_upscale_pass(
            &outcome.artifact.data,
            outcome.artifact.metadata,
            &hd_output,
            &mut progress,
        )?;
        report_artifact(&artifact);
    }
    Ok(())
}

fn run_render(scene_path: &Path, output: Option<PathBuf>) -> Result<()> {
    ensure_ffmpeg()?;
    let raw = fs::read_to_string(scene_path)
        .with_context(|| format!("failed to read scene source {}", scene_path.display()))?;
    let source = strip_code_fences(&raw);

    let output = output.unwrap_or_else(default_output_name);
    let mut progress = StderrProgress;
    let artifact = render_scene(&source, &output, &mut progress)?;
    report_artifact(&artifact);
    Ok(())
}

fn run_upscale(input: &Path, output: &Path, width: u32, height: u32, fps: u32) -> Result<()> {
    ensure_ffmpeg()?;
    if width == 0 || height == 0 || fps == 0 {
        bail!("--width, --height and --fps must be positive");
    }
    let payload = fs::read(input)
        .with_context(|| format!("failed to read source video {}", input.display()))?;

    // frame_count is derived from the container during extraction.
    let source = VideoMetadata {
        width,
        height,
        fps,
        frame_count: 0,
    };
    let mut progress = StderrProgress;
    let artifact = run_upscale_pass(&payload, source, output, &mut progress)?;
    report_artifact(&artifact);
    Ok(())
}

fn run_upscale_pass(
    payload: &[u8],
    source: VideoMetadata,
    output: &Path,
    progress: &mut dyn ProgressSink,
) -> Result<VideoArtifact> {
    let mut pipeline = UpscalePipeline::new(LanczosUpscaler);
    let artifact = pipeline.upscale(payload, source, output, progress)?;
    Ok(artifact)
}

fn run_check(scene_path: &Path) -> Result<()> {
    let raw = fs::read_to_string(scene_path)
        .with_context(|| format!("failed to read scene source {}", scene_path.display()))?;
    let source = strip_code_fences(&raw);
    let config = extract_render_config(&source);
    let renderer = SceneRenderer::select(&source);

    println!(
        "OK: {} ({}x{}, {} fps, {} frames, {} renderer)",
        scene_path.display(),
        config.width,
        config.height,
        config.fps,
        config.frame_count,
        renderer.variant_name()
    );
    Ok(())
}

fn ensure_ffmpeg() -> Result<()> {
    if !is_ffmpeg_available() {
        bail!("ffmpeg was not found on PATH; install ffmpeg to encode video");
    }
    Ok(())
}

fn default_output_name() -> PathBuf {
    PathBuf::from(format!(
        "promptreel-{}.mp4",
        Utc::now().format("%Y%m%d-%H%M%S")
    ))
}

fn hd_output_name(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    output.with_file_name(format!("{stem}-hd.mp4"))
}

fn report_artifact(artifact: &VideoArtifact) {
    println!(
        "Wrote {} ({}x{}, {} fps, {} frames, {} bytes)",
        artifact.path.display(),
        artifact.metadata.width,
        artifact.metadata.height,
        artifact.metadata.fps,
        artifact.metadata.frame_count,
        artifact.data.len()
    );
}
