pub type EngineResult<T> = Result<T, EngineError>;

/// Failure taxonomy for the generation and upscale pipelines.
///
/// Config extraction is intentionally absent: it is total and resolves
/// missing fields to defaults instead of failing.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Network failure or non-success status from the generation endpoint.
    /// Never retried.
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The model responded, but the response did not carry the expected
    /// message content.
    #[error("generation contract error: {0}")]
    GenerationContract(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("encode error: {0}")]
    Encode(String),

    /// A single frame's enhancement failed; the whole upscale call aborts.
    #[error("upscale error at frame {frame}: {message}")]
    UpscaleFrame { frame: usize, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn transport_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn generation_contract(message: impl Into<String>) -> Self {
        Self::GenerationContract(message.into())
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode(message.into())
    }

    pub fn upscale_frame(frame: usize, message: impl Into<String>) -> Self {
        Self::UpscaleFrame {
            frame,
            message: message.into(),
        }
    }

    /// HTTP status carried by a transport failure, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(EngineError::transport("x")
            .to_string()
            .contains("transport error:"));
        assert!(EngineError::generation_contract("x")
            .to_string()
            .contains("generation contract error:"));
        assert!(EngineError::render("x").to_string().contains("render error:"));
        assert!(EngineError::encode("x").to_string().contains("encode error:"));
        assert!(EngineError::upscale_frame(7, "x")
            .to_string()
            .contains("upscale error at frame 7"));
    }

    #[test]
    fn transport_status_is_preserved() {
        let error = EngineError::transport_status(503, "service unavailable");
        assert_eq!(error.status(), Some(503));
        assert_eq!(EngineError::transport("refused").status(), None);
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let error = EngineError::Other(anyhow::Error::new(base));
        assert!(error.to_string().contains("boom"));
    }
}
