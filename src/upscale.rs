use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{ImageReader, RgbaImage};

use crate::encoding::{
    run_ffmpeg_encode, run_ffmpeg_extract, EncodePreset, ScratchWorkspace, VideoArtifact,
    VideoMetadata, FRAME_FILE_PREFIX, HD_FRAME_FILE_PREFIX,
};
use crate::error::{EngineError, EngineResult};
use crate::progress::{percent, ProgressSink};

/// Linear upscale factor applied by the enhancement pass.
pub const UPSCALE_FACTOR: u32 = 2;

/// Single-image super-resolution collaborator. Takes one raster frame and
/// returns one raster frame at exactly double the width and height.
pub trait FrameUpscaler {
    fn upscale_frame(&self, frame: RgbaImage) -> anyhow::Result<RgbaImage>;
}

/// Default collaborator: Lanczos3 resampling. Lets the HD pass run
/// end-to-end without the external neural engine; a real engine plugs in
/// through the same trait.
pub struct LanczosUpscaler;

impl FrameUpscaler for LanczosUpscaler {
    fn upscale_frame(&self, frame: RgbaImage) -> anyhow::Result<RgbaImage> {
        let (width, height) = frame.dimensions();
        Ok(image::imageops::resize(
            &frame,
            width * UPSCALE_FACTOR,
            height * UPSCALE_FACTOR,
            FilterType::Lanczos3,
        ))
    }
}

/// Observable stage of an upscale call. `Failed` is terminal from any
/// non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaleStage {
    Idle,
    Extracting,
    Upscaling { done: u32, total: u32 },
    Reencoding,
    Done,
    Failed,
}

/// Re-renders a finished video at 2x resolution: extract the frames the
/// container yields, enhance each through the collaborator, re-encode with
/// the fidelity-leaning preset. A single frame failure aborts the whole
/// call; no partial HD artifact is ever returned, and all scratch state is
/// removed on every exit path.
pub struct UpscalePipeline<U: FrameUpscaler> {
    upscaler: U,
    stage: UpscaleStage,
}

impl<U: FrameUpscaler> UpscalePipeline<U> {
    pub fn new(upscaler: U) -> Self {
        Self {
            upscaler,
            stage: UpscaleStage::Idle,
        }
    }

    pub fn stage(&self) -> UpscaleStage {
        self.stage
    }

    pub fn upscale(
        &mut self,
        payload: &[u8],
        source: VideoMetadata,
        output_path: &Path,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<VideoArtifact> {
        let result = self.run(payload, source, output_path, progress);
        self.stage = match &result {
            Ok(_) => UpscaleStage::Done,
            Err(_) => UpscaleStage::Failed,
        };
        result
    }

    fn run(
        &mut self,
        payload: &[u8],
        source: VideoMetadata,
        output_path: &Path,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<VideoArtifact> {
        if source.width == 0 || source.height == 0 || source.fps == 0 {
            return Err(EngineError::encode(format!(
                "source metadata must be positive, got {}x{} at {} fps",
                source.width, source.height, source.fps
            )));
        }
        if payload.is_empty() {
            return Err(EngineError::encode("source video payload is empty"));
        }

        // The scratch drop on any early return below removes extracted
        // originals, enhanced frames, and both container files.
        let scratch = ScratchWorkspace::create()?;

        self.stage = UpscaleStage::Extracting;
        progress.update("extracting frames from the source video...");
        let input = scratch.path().join("input.mp4");
        fs::write(&input, payload).map_err(|error| {
            EngineError::encode(format!("failed to stage source video: {error}"))
        })?;
        run_ffmpeg_extract(scratch.path(), "input.mp4", FRAME_FILE_PREFIX)?;

        let frame_files = list_frame_files(scratch.path())?;
        if frame_files.is_empty() {
            return Err(EngineError::encode(
                "no frames could be extracted from the source video",
            ));
        }
        let total = frame_files.len();

        for (index, frame_file) in frame_files.iter().enumerate() {
            self.stage = UpscaleStage::Upscaling {
                done: index as u32,
                total: total as u32,
            };

            let original = ImageReader::open(frame_file)
                .map_err(|error| {
                    EngineError::upscale_frame(index, format!("failed to open frame: {error}"))
                })?
                .decode()
                .map_err(|error| {
                    EngineError::upscale_frame(index, format!("failed to decode frame: {error}"))
                })?
                .to_rgba8();
            let (src_w, src_h) = original.dimensions();

            let enhanced = self
                .upscaler
                .upscale_frame(original)
                .map_err(|error| EngineError::upscale_frame(index, error.to_string()))?;

            let (out_w, out_h) = enhanced.dimensions();
            if out_w != src_w * UPSCALE_FACTOR || out_h != src_h * UPSCALE_FACTOR {
                return Err(EngineError::upscale_frame(
                    index,
                    format!(
                        "collaborator returned {out_w}x{out_h}, expected {}x{}",
                        src_w * UPSCALE_FACTOR,
                        src_h * UPSCALE_FACTOR
                    ),
                ));
            }

            let hd_path = scratch.frame_path(HD_FRAME_FILE_PREFIX, index);
            enhanced.save(&hd_path).map_err(|error| {
                EngineError::upscale_frame(index, format!("failed to save enhanced frame: {error}"))
            })?;
            // `original` was consumed by the collaborator and `enhanced`
            // drops here, bounding peak memory to one frame pair.
            drop(enhanced);

            progress.update(&format!(
                "upscaling frames: {}%",
                percent(index as u32, total as u32)
            ));
        }

        self.stage = UpscaleStage::Reencoding;
        progress.update("re-encoding enhanced video...");
        let encoded = scratch.path().join("output_hd.mp4");
        run_ffmpeg_encode(
            scratch.path(),
            source.fps,
            HD_FRAME_FILE_PREFIX,
            EncodePreset::Slow,
            &encoded,
        )?;

        let data = fs::read(&encoded).map_err(|error| {
            EngineError::encode(format!("failed to read enhanced video: {error}"))
        })?;
        fs::write(output_path, &data).map_err(|error| {
            EngineError::encode(format!(
                "failed to write artifact {}: {error}",
                output_path.display()
            ))
        })?;

        scratch.close()?;
        progress.update("hd video complete");

        Ok(VideoArtifact {
            data,
            path: output_path.to_path_buf(),
            metadata: VideoMetadata {
                width: source.width * UPSCALE_FACTOR,
                height: source.height * UPSCALE_FACTOR,
                fps: source.fps,
                frame_count: total as u32,
            },
        })
    }
}

/// Extracted frame files in index order. Zero-padded names make the
/// lexicographic sort equal to the numeric one.
fn list_frame_files(workspace: &Path) -> EngineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(workspace).map_err(|error| {
        EngineError::encode(format!("failed to list scratch workspace: {error}"))
    })?;
    for entry in entries {
        let entry = entry.map_err(|error| {
            EngineError::encode(format!("failed to list scratch workspace: {error}"))
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(FRAME_FILE_PREFIX)
            && !name.starts_with(HD_FRAME_FILE_PREFIX)
            && name.ends_with(".png")
        {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
