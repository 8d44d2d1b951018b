use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;

use crate::error::{EngineError, EngineResult};
use crate::progress::ProgressSink;
use crate::renderer::Frame;
use crate::scene::RenderConfig;

pub const FRAME_FILE_PREFIX: &str = "frame";
pub const HD_FRAME_FILE_PREFIX: &str = "hd_frame";
const STDERR_TAIL_CHARS: usize = 500;

/// Speed/quality tradeoff for an encode pass. The initial pass favors
/// speed; the upscale re-encode favors fidelity and adds a constant-quality
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodePreset {
    Fast,
    Slow,
}

impl EncodePreset {
    fn speed_preset(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Slow => "slow",
        }
    }

    fn quality_constant(self) -> Option<&'static str> {
        match self {
            Self::Fast => None,
            Self::Slow => Some("18"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub frame_count: u32,
}

/// Encoded video output: payload bytes, a locally-resolvable access handle,
/// and the resolved metadata. Owned by the caller once returned; no scratch
/// state survives the call that produced it.
#[derive(Debug)]
pub struct VideoArtifact {
    pub data: Vec<u8>,
    pub path: PathBuf,
    pub metadata: VideoMetadata,
}

/// Per-invocation scratch namespace. Unique prefix per call, so concurrent
/// pipeline invocations can never collide on frame filenames. Dropping the
/// workspace removes it; `close` surfaces removal errors on the success
/// path.
pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    pub fn create() -> EngineResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("promptreel-")
            .tempdir()
            .map_err(|error| {
                EngineError::encode(format!("failed to create scratch workspace: {error}"))
            })?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Zero-padded frame path: glob order exactly matches index order.
    pub fn frame_path(&self, prefix: &str, index: usize) -> PathBuf {
        self.dir.path().join(format!("{prefix}{index:05}.png"))
    }

    pub fn close(self) -> EngineResult<()> {
        self.dir.close().map_err(|error| {
            EngineError::encode(format!("failed to remove scratch workspace: {error}"))
        })
    }
}

pub fn is_ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Assembles the ordered frame sequence into an H.264/MP4 artifact at
/// `output_path`. Every scratch file is removed before this returns, on the
/// success and the failure path alike.
pub fn encode_frames(
    frames: &[Frame],
    config: &RenderConfig,
    output_path: &Path,
    progress: &mut dyn ProgressSink,
) -> EngineResult<VideoArtifact> {
    verify_frame_sequence(frames, config)?;

    let scratch = ScratchWorkspace::create()?;
    progress.update("writing frames to the encoder workspace...");
    for frame in frames {
        let path = scratch.frame_path(FRAME_FILE_PREFIX, frame.index as usize);
        fs::write(&path, &frame.png).map_err(|error| {
            EngineError::encode(format!("failed to write {}: {error}", path.display()))
        })?;
    }

    progress.update("encoding video...");
    let encoded = scratch.path().join("output.mp4");
    run_ffmpeg_encode(
        scratch.path(),
        config.fps,
        FRAME_FILE_PREFIX,
        EncodePreset::Fast,
        &encoded,
    )?;

    let data = fs::read(&encoded).map_err(|error| {
        EngineError::encode(format!("failed to read encoded video: {error}"))
    })?;
    fs::write(output_path, &data).map_err(|error| {
        EngineError::encode(format!(
            "failed to write artifact {}: {error}",
            output_path.display()
        ))
    })?;

    scratch.close()?;
    progress.update("video encoded");

    Ok(VideoArtifact {
        data,
        path: output_path.to_path_buf(),
        metadata: VideoMetadata {
            width: config.width,
            height: config.height,
            fps: config.fps,
            frame_count: frames.len() as u32,
        },
    })
}

/// The encoder consumes frames in strictly increasing index order; a gap,
/// duplicate, or dimension mismatch here means the render stage broke its
/// contract.
fn verify_frame_sequence(frames: &[Frame], config: &RenderConfig) -> EngineResult<()> {
    if frames.is_empty() {
        return Err(EngineError::encode("no frames to encode"));
    }
    for (expected, frame) in frames.iter().enumerate() {
        if frame.index as usize != expected {
            return Err(EngineError::encode(format!(
                "frame sequence is out of order: expected index {expected}, got {}",
                frame.index
            )));
        }
        if frame.width != config.width || frame.height != config.height {
            return Err(EngineError::encode(format!(
                "frame {} is {}x{}, expected {}x{}",
                frame.index, frame.width, frame.height, config.width, config.height
            )));
        }
    }
    Ok(())
}

pub(crate) fn run_ffmpeg_encode(
    workspace: &Path,
    fps: u32,
    frame_prefix: &str,
    preset: EncodePreset,
    output: &Path,
) -> EngineResult<()> {
    let args = ffmpeg_encode_args(fps, frame_prefix, preset, output);
    run_ffmpeg(workspace, &args)
}

pub(crate) fn run_ffmpeg_extract(workspace: &Path, input: &str, frame_prefix: &str) -> EngineResult<()> {
    let args = ffmpeg_extract_args(input, frame_prefix);
    run_ffmpeg(workspace, &args)
}

fn ffmpeg_encode_args(
    fps: u32,
    frame_prefix: &str,
    preset: EncodePreset,
    output: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-framerate".to_owned(),
        fps.to_string(),
        "-pattern_type".to_owned(),
        "glob".to_owned(),
        "-i".to_owned(),
        format!("{frame_prefix}*.png"),
        "-c:v".to_owned(),
        "libx264".to_owned(),
        "-pix_fmt".to_owned(),
        "yuv420p".to_owned(),
        "-preset".to_owned(),
        preset.speed_preset().to_owned(),
    ];
    if let Some(crf) = preset.quality_constant() {
        args.push("-crf".to_owned());
        args.push(crf.to_owned());
    }
    args.push(output.to_string_lossy().into_owned());
    args
}

fn ffmpeg_extract_args(input: &str, frame_prefix: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-i".to_owned(),
        input.to_owned(),
        format!("{frame_prefix}%05d.png"),
    ]
}

fn run_ffmpeg(workspace: &Path, args: &[String]) -> EngineResult<()> {
    tracing::debug!(args = %args.join(" "), "invoking ffmpeg");
    let output = Command::new("ffmpeg")
        .current_dir(workspace)
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                EngineError::encode(
                    "ffmpeg executable not found on PATH; install ffmpeg to encode video",
                )
            } else {
                EngineError::encode(format!("failed to run ffmpeg: {error}"))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EngineError::encode(format!(
            "ffmpeg failed with status {} (args='{}', stderr_tail='{}')",
            output.status,
            args.join(" "),
            tail_chars(&stderr, STDERR_TAIL_CHARS)
        )));
    }
    Ok(())
}

fn tail_chars(text: &str, max_chars: usize) -> String {
    let chars = text.chars().collect::<Vec<_>>();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect::<String>().trim().to_owned()
}
