pub mod encoding;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod progress;
pub mod renderer;
pub mod scene;
pub mod schema;
pub mod upscale;

pub use encoding::{VideoArtifact, VideoMetadata};
pub use error::{EngineError, EngineResult};
pub use pipeline::{render_scene, GenerationOutcome, VideoPipeline};
pub use progress::ProgressSink;
pub use scene::RenderConfig;
