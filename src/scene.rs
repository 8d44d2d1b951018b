use std::sync::OnceLock;

use regex::Regex;

use crate::schema::SceneScript;

pub const DEFAULT_FRAME_COUNT: u32 = 300;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;

/// Upper bounds applied to extracted values. Model output is untrusted free
/// text; a hallucinated `durationInFrames: 99999999` must not wedge a render
/// loop or exhaust the scratch workspace.
pub const MAX_FRAME_COUNT: u32 = 10_000;
pub const MAX_DIMENSION: u32 = 4_096;

/// Fully-resolved numeric parameters for one generation. Always valid by
/// construction: every field is positive, dimensions are even (yuv420p
/// output requires it) and within [`MAX_DIMENSION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    pub frame_count: u32,
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_count: DEFAULT_FRAME_COUNT,
            fps: DEFAULT_FPS,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl RenderConfig {
    /// Scene time in seconds at a frame index.
    pub fn time_at(&self, frame_index: u32) -> f32 {
        frame_index as f32 / self.fps as f32
    }

    pub(crate) fn clamped(frame_count: u32, fps: u32, width: u32, height: u32) -> Self {
        Self {
            frame_count: frame_count.clamp(1, MAX_FRAME_COUNT),
            fps: fps.max(1),
            width: round_up_to_even(width.clamp(1, MAX_DIMENSION)),
            height: round_up_to_even(height.clamp(1, MAX_DIMENSION)),
        }
    }
}

fn round_up_to_even(value: u32) -> u32 {
    value + (value & 1)
}

/// Strips markdown code-fence markers from the boundaries of a model reply.
/// Only the outermost fence pair is removed; interior backticks are content.
pub fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the optional language tag on the opening fence line.
        text = match rest.split_once('\n') {
            Some((_, body)) => body,
            None => rest,
        };
    }
    text = text.trim_end();
    if let Some(body) = text.strip_suffix("```") {
        text = body.trim_end();
    }
    text.trim().to_owned()
}

/// Recovers a [`RenderConfig`] from generated scene source.
///
/// Total: never fails. A structured scene script is preferred when the
/// source embeds one; otherwise each field is matched independently so a
/// partially well-formed source yields a partially-defaulted, still-valid
/// config.
pub fn extract_render_config(source: &str) -> RenderConfig {
    if let Some(script) = SceneScript::parse(source) {
        return script.resolved_config();
    }

    let fps = capture_u32(fps_regex(), source).unwrap_or(DEFAULT_FPS).max(1);
    let frame_count = capture_u32(duration_frames_regex(), source)
        .or_else(|| {
            capture_f32(duration_seconds_regex(), source)
                .map(|seconds| (seconds * fps as f32).ceil().max(1.0) as u32)
        })
        .unwrap_or(DEFAULT_FRAME_COUNT);
    let width = capture_u32(width_regex(), source).unwrap_or(DEFAULT_WIDTH);
    let height = capture_u32(height_regex(), source).unwrap_or(DEFAULT_HEIGHT);

    RenderConfig::clamped(frame_count, fps, width, height)
}

fn capture_u32(regex: &Regex, source: &str) -> Option<u32> {
    regex
        .captures(source)
        .and_then(|captures| captures.get(1))
        .and_then(|capture| capture.as_str().parse::<u32>().ok())
        .filter(|value| *value > 0)
}

fn capture_f32(regex: &Regex, source: &str) -> Option<f32> {
    regex
        .captures(source)
        .and_then(|captures| captures.get(1))
        .and_then(|capture| capture.as_str().parse::<f32>().ok())
        .filter(|value| value.is_finite() && *value > 0.0)
}

fn duration_frames_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)duration_?in_?frames"?\s*[:=]\s*(\d+)"#)
            .expect("duration-in-frames pattern must compile")
    })
}

fn duration_seconds_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)duration_?in_?seconds"?\s*[:=]\s*(\d+(?:\.\d+)?)"#)
            .expect("duration-in-seconds pattern must compile")
    })
}

fn fps_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\bfps"?\s*[:=]\s*(\d+)"#).expect("fps pattern must compile")
    })
}

fn width_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\bwidth"?\s*[:=]\s*(\d+)"#).expect("width pattern must compile")
    })
}

fn height_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\bheight"?\s*[:=]\s*(\d+)"#).expect("height pattern must compile")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_with_language_tag_are_stripped() {
        let raw = "```json\n{ \"fps\": 24 }\n```";
        assert_eq!(strip_code_fences(raw), "{ \"fps\": 24 }");
    }

    #[test]
    fn fences_without_language_tag_are_stripped() {
        assert_eq!(strip_code_fences("```\nbody\n```"), "body");
        assert_eq!(strip_code_fences("  body with no fences  "), "body with no fences");
    }

    #[test]
    fn interior_backticks_survive() {
        let raw = "```\nuse `fps` here\n```";
        assert_eq!(strip_code_fences(raw), "use `fps` here");
    }

    #[test]
    fn extraction_is_total_on_garbage() {
        for source in ["", "no numbers here", "fps: zero", "width: -4"] {
            let config = extract_render_config(source);
            assert!(config.frame_count >= 1);
            assert!(config.fps >= 1);
            assert!(config.width >= 1);
            assert!(config.height >= 1);
        }
    }

    #[test]
    fn empty_source_yields_all_defaults() {
        assert_eq!(extract_render_config(""), RenderConfig::default());
    }

    #[test]
    fn declared_fields_are_recovered() {
        let source = "durationInFrames: 150, fps: 30, width: 1920, height: 1080";
        assert_eq!(
            extract_render_config(source),
            RenderConfig {
                frame_count: 150,
                fps: 30,
                width: 1920,
                height: 1080,
            }
        );
    }

    #[test]
    fn snake_case_declarations_are_recovered() {
        let source = "duration_in_frames = 90\nfps = 24\nwidth = 640\nheight = 360";
        let config = extract_render_config(source);
        assert_eq!(config.frame_count, 90);
        assert_eq!(config.fps, 24);
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 360);
    }

    #[test]
    fn seconds_declaration_derives_frame_count() {
        let source = "durationInSeconds: 5, fps: 60";
        let config = extract_render_config(source);
        assert_eq!(config.frame_count, 300);
        assert_eq!(config.fps, 60);
        assert_eq!(config.width, DEFAULT_WIDTH);
        assert_eq!(config.height, DEFAULT_HEIGHT);
    }

    #[test]
    fn partial_declarations_default_the_rest() {
        let config = extract_render_config("fps: 24");
        assert_eq!(config.fps, 24);
        assert_eq!(config.frame_count, DEFAULT_FRAME_COUNT);
        assert_eq!(config.width, DEFAULT_WIDTH);
        assert_eq!(config.height, DEFAULT_HEIGHT);
    }

    #[test]
    fn extracted_values_are_clamped() {
        let config = extract_render_config("durationInFrames: 99999999, width: 99999, height: 7");
        assert_eq!(config.frame_count, MAX_FRAME_COUNT);
        assert_eq!(config.width, MAX_DIMENSION);
        // Odd heights round up to even for yuv420p output.
        assert_eq!(config.height, 8);
    }

    #[test]
    fn structured_scene_script_wins_over_regex() {
        let source = r##"{
            "config": { "durationInFrames": 48, "fps": 24, "width": 320, "height": 180 },
            "shapes": [{ "kind": "circle", "color": "#ffffff", "radius": 0.1 }]
        }"##;
        let config = extract_render_config(source);
        assert_eq!(
            config,
            RenderConfig {
                frame_count: 48,
                fps: 24,
                width: 320,
                height: 180,
            }
        );
    }

    #[test]
    fn time_at_follows_fps() {
        let config = RenderConfig {
            frame_count: 150,
            fps: 30,
            width: 1920,
            height: 1080,
        };
        assert_eq!(config.time_at(0), 0.0);
        assert!((config.time_at(1) - 1.0 / 30.0).abs() < 1e-6);
        assert!((config.time_at(2) - 2.0 / 30.0).abs() < 1e-6);
    }
}
