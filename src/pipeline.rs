use std::path::Path;

use anyhow::anyhow;

use crate::encoding::{encode_frames, VideoArtifact};
use crate::error::EngineResult;
use crate::generator::SceneGenerator;
use crate::progress::ProgressSink;
use crate::renderer::SceneRenderer;
use crate::scene::extract_render_config;

/// Result of a full generation: the scene source the model produced (kept so
/// callers can persist or inspect it) and the encoded artifact.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub scene_source: String,
    pub artifact: VideoArtifact,
}

/// One prompt-to-video pipeline. The generator handle is stateless beyond
/// configuration and may be shared across invocations; every invocation owns
/// its scratch namespace, so concurrent calls cannot collide.
pub struct VideoPipeline {
    generator: SceneGenerator,
}

impl VideoPipeline {
    pub fn new(generator: SceneGenerator) -> Self {
        Self { generator }
    }

    /// Full pipeline: prompt -> scene source -> config -> frames -> MP4.
    /// Strictly sequential; each stage cleans up its own scratch state
    /// before an error propagates.
    pub async fn generate(
        &self,
        prompt: &str,
        output_path: &Path,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<GenerationOutcome> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(anyhow!("prompt must not be empty").into());
        }

        let scene_source = self.generator.generate(prompt, progress).await?;
        let artifact = render_scene(&scene_source, output_path, progress)?;
        Ok(GenerationOutcome {
            scene_source,
            artifact,
        })
    }
}

/// Renders and encodes existing scene source without touching the model.
/// This is the offline half of `generate` and the `render` subcommand.
pub fn render_scene(
    source: &str,
    output_path: &Path,
    progress: &mut dyn ProgressSink,
) -> EngineResult<VideoArtifact> {
    let config = extract_render_config(source);
    let renderer = SceneRenderer::select(source);
    tracing::info!(
        variant = renderer.variant_name(),
        frames = config.frame_count,
        fps = config.fps,
        width = config.width,
        height = config.height,
        "rendering scene"
    );

    let frames = renderer.render_all(&config, progress)?;
    encode_frames(&frames, &config, output_path, progress)
}
