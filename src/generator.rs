use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::progress::ProgressSink;
use crate::scene::strip_code_fences;

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "stepfun/step-3.5-flash:free";
pub const MAX_COMPLETION_TOKENS: u32 = 4000;
pub const SAMPLING_TEMPERATURE: f32 = 0.7;

const DEFAULT_REFERER: &str = "http://localhost";
const DEFAULT_TITLE: &str = "promptreel";
const ERROR_BODY_TAIL_CHARS: usize = 300;

/// Style and format guide sent as the fixed system instruction. The model is
/// asked for a declarative scene script the renderer can draw directly; the
/// renderer falls back to a placeholder when the reply does not validate.
const SYSTEM_PROMPT: &str = r##"# Scene Script Generator

You are an expert motion designer. Given a short description, you produce a
scene script for a procedural video renderer. The renderer draws layered 2D
shapes over a gradient backdrop, one frame at a time, completely
deterministically.

## Output format (MANDATORY)

Reply with ONE fenced json code block and nothing else. The block contains a
single JSON object with this shape:

```json
{
  "config": {
    "durationInSeconds": 5,
    "fps": 30,
    "width": 1920,
    "height": 1080
  },
  "background": { "top": "#0f0f23", "bottom": "#1a2840" },
  "shapes": [
    {
      "kind": "circle",
      "color": "#6366f1",
      "radius": 0.08,
      "center": [0.5, 0.45],
      "orbit": { "radius": 0.22, "speed": 0.4, "phase": 0.0 },
      "pulse": { "amount": 0.15, "speed": 1.0 }
    },
    {
      "kind": "rect",
      "color": "#06b6d4",
      "size": [0.18, 0.1],
      "center": [0.3, 0.65],
      "spin": 0.5
    },
    {
      "kind": "particles",
      "color": "#ffffff",
      "count": 120,
      "size": 0.004,
      "seed": 7,
      "drift": 0.05,
      "twinkle": 1.5
    }
  ]
}
```

## Config rules

- `config` is required and must declare all four fields. `durationInFrames`
  may replace `durationInSeconds`.
- Dimension presets: horizontal 1920x1080 (default), vertical 1080x1920,
  square 1080x1080.
- Defaults when the description does not say otherwise: 5 seconds, 30 fps,
  horizontal.

## Animation rules

- All motion is a function of scene time in seconds. `speed`, `spin` and
  pulse `speed` are revolutions (or cycles) per second, so pacing is
  identical at any fps. Never think in raw frame counts.
- Positions (`center`) and sizes (`radius`, `size`) are fractions of the
  output dimensions in [0, 1], so the same script works at any resolution.
- Keep motion gentle: orbit speeds of 0.2-0.8, pulse amounts below 0.3.

## Determinism rules

- There is no randomness at render time. Particle layouts derive entirely
  from the integer `seed`; pick any seed and reuse it if two particle
  systems should match.
- Do not describe effects that depend on previous frames; every frame is
  drawn from scratch at its own time value.

## Composition guidance

- Use the background gradient for mood; dark backdrops make colors pop.
- Layer order is paint order: later shapes draw over earlier ones.
- 2 to 6 shapes is plenty. One particle system (count 50-300) adds life.
- Color palettes: pick 2-4 related hues, e.g. indigo #6366f1, violet
  #8b5cf6, cyan #06b6d4 over near-black #0f0f23.

Generate ONLY the json block. No explanations before or after."##;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub referer: String,
    pub title: String,
}

impl GeneratorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            referer: DEFAULT_REFERER.to_owned(),
            title: DEFAULT_TITLE.to_owned(),
        }
    }
}

/// Client for the remote scene-synthesis model. Stateless beyond its
/// configuration; a single instance may be reused across calls.
#[derive(Debug, Clone)]
pub struct SceneGenerator {
    http: Client,
    config: GeneratorConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl SceneGenerator {
    pub fn new(http: Client, config: GeneratorConfig) -> Self {
        Self { http, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Requests scene source for a prompt. Sends a single request; transport
    /// failures and non-success statuses are not retried.
    pub async fn generate(
        &self,
        prompt: &str,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<String> {
        progress.update("connecting to the scene generation model...");

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: SAMPLING_TEMPERATURE,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let response = self
            .http
            .post(self.config.api_url.as_str())
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.title)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                EngineError::transport(format!("failed to reach the generation endpoint: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::transport_status(
                status.as_u16(),
                format!(
                    "generation endpoint returned {status}: {}",
                    tail_chars(&body, ERROR_BODY_TAIL_CHARS)
                ),
            ));
        }

        let payload: ChatResponse = response.json().await.map_err(|error| {
            EngineError::generation_contract(format!("failed to decode the model response: {error}"))
        })?;
        let source = scene_source_from_response(payload)?;

        tracing::debug!(model = %self.config.model, bytes = source.len(), "scene source received");
        progress.update("scene code generated");
        Ok(source)
    }
}

fn scene_source_from_response(response: ChatResponse) -> EngineResult<String> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| {
            EngineError::generation_contract("model response carried no message content")
        })?;
    Ok(strip_code_fences(&content))
}

fn tail_chars(text: &str, max_chars: usize) -> String {
    let chars = text.chars().collect::<Vec<_>>();
    let start = chars.len().saturating_sub(max_chars);
    chars[start..].iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_content_is_extracted_and_fence_stripped() {
        let payload: ChatResponse = serde_json::from_str(
            r#"{ "choices": [ { "message": { "content": "```json\n{ \"config\": {} }\n```" } } ] }"#,
        )
        .expect("payload should decode");
        let source = scene_source_from_response(payload).expect("content should be present");
        assert_eq!(source, r#"{ "config": {} }"#);
    }

    #[test]
    fn missing_content_is_a_contract_error() {
        let payload: ChatResponse =
            serde_json::from_str(r#"{ "choices": [ { "message": {} } ] }"#)
                .expect("payload should decode");
        let error = scene_source_from_response(payload).expect_err("content is absent");
        assert!(matches!(error, EngineError::GenerationContract(_)));
    }

    #[test]
    fn empty_choices_is_a_contract_error() {
        let payload: ChatResponse =
            serde_json::from_str(r#"{ "choices": [] }"#).expect("payload should decode");
        assert!(scene_source_from_response(payload).is_err());
    }

    #[test]
    fn whitespace_only_content_is_a_contract_error() {
        let payload: ChatResponse = serde_json::from_str(
            r#"{ "choices": [ { "message": { "content": "   \n  " } } ] }"#,
        )
        .expect("payload should decode");
        assert!(scene_source_from_response(payload).is_err());
    }

    #[test]
    fn request_body_serializes_with_fixed_sampling() {
        let request = ChatRequest {
            model: DEFAULT_MODEL,
            messages: vec![ChatMessage {
                role: "user",
                content: "a red cube rotating",
            }],
            temperature: SAMPLING_TEMPERATURE,
            max_tokens: MAX_COMPLETION_TOKENS,
        };
        let value = serde_json::to_value(&request).expect("request should serialize");
        assert_eq!(value["model"], DEFAULT_MODEL);
        assert_eq!(value["max_tokens"], 4000);
        assert_eq!(value["messages"][0]["role"], "user");
    }
}
