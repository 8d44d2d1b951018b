use anyhow::{anyhow, bail, Result};
use serde::Deserialize;

use crate::scene::{RenderConfig, DEFAULT_FPS, DEFAULT_FRAME_COUNT, DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Ceiling for particle systems; generated scripts occasionally ask for
/// absurd counts.
pub const MAX_PARTICLE_COUNT: u32 = 5_000;

/// Declarative scene description the renderer can interpret directly.
///
/// This is the structured intermediate representation the generation stage
/// asks the model for: a small JSON config object plus drawing directives.
/// Generated code is never executed; anything that does not decode and
/// validate against this schema renders through the placeholder instead.
#[derive(Debug, Clone, Deserialize)]
pub struct SceneScript {
    pub config: ScriptConfig,
    #[serde(default)]
    pub background: Option<Background>,
    #[serde(default)]
    pub shapes: Vec<Shape>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptConfig {
    pub duration_in_seconds: Option<f32>,
    pub duration_in_frames: Option<u32>,
    pub fps: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Vertical two-stop gradient behind every shape.
#[derive(Debug, Clone, Deserialize)]
pub struct Background {
    pub top: String,
    pub bottom: String,
}

/// One drawing directive. Positions and sizes are normalized to [0, 1] of
/// the output dimensions so scripts are resolution-independent; `speed` and
/// `spin` are revolutions per second of scene time.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Shape {
    Circle {
        color: String,
        radius: f32,
        #[serde(default = "center_default")]
        center: [f32; 2],
        #[serde(default)]
        orbit: Option<Orbit>,
        #[serde(default)]
        pulse: Option<Pulse>,
    },
    Rect {
        color: String,
        size: [f32; 2],
        #[serde(default = "center_default")]
        center: [f32; 2],
        #[serde(default)]
        spin: f32,
        #[serde(default)]
        orbit: Option<Orbit>,
        #[serde(default)]
        pulse: Option<Pulse>,
    },
    Particles {
        color: String,
        count: u32,
        size: f32,
        #[serde(default)]
        seed: u64,
        #[serde(default)]
        drift: f32,
        #[serde(default)]
        twinkle: f32,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Orbit {
    pub radius: f32,
    pub speed: f32,
    #[serde(default)]
    pub phase: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pulse {
    pub amount: f32,
    pub speed: f32,
}

fn center_default() -> [f32; 2] {
    [0.5, 0.5]
}

impl SceneScript {
    /// Decodes a scene script from generated source, tolerating prose around
    /// the JSON object. Returns `None` when no decodable script is present.
    pub fn parse(source: &str) -> Option<Self> {
        let trimmed = source.trim();
        if let Ok(script) = serde_json::from_str::<SceneScript>(trimmed) {
            return Some(script);
        }

        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if end <= start {
            return None;
        }
        serde_json::from_str::<SceneScript>(&trimmed[start..=end]).ok()
    }

    /// Structural contract for the interpretable renderer: the script must
    /// declare the full composition config and at least one drawable
    /// directive, and every directive must be in range.
    pub fn validate(&self) -> Result<()> {
        if self.config.fps.is_none() {
            bail!("scene script does not declare fps");
        }
        if self.config.width.is_none() || self.config.height.is_none() {
            bail!("scene script does not declare output dimensions");
        }
        if self.config.duration_in_frames.is_none() && self.config.duration_in_seconds.is_none() {
            bail!("scene script does not declare a duration");
        }
        if self.background.is_none() && self.shapes.is_empty() {
            bail!("scene script has no drawable content");
        }

        if let Some(background) = &self.background {
            parse_hex_color(&background.top)
                .ok_or_else(|| anyhow!("invalid background color '{}'", background.top))?;
            parse_hex_color(&background.bottom)
                .ok_or_else(|| anyhow!("invalid background color '{}'", background.bottom))?;
        }

        for (index, shape) in self.shapes.iter().enumerate() {
            shape
                .validate()
                .map_err(|error| anyhow!("shape {index}: {error}"))?;
        }

        Ok(())
    }

    /// Config with unset fields resolved to defaults, clamped into the
    /// always-valid range.
    pub fn resolved_config(&self) -> RenderConfig {
        let fps = self.config.fps.unwrap_or(DEFAULT_FPS).max(1);
        let frame_count = self
            .config
            .duration_in_frames
            .or_else(|| {
                self.config
                    .duration_in_seconds
                    .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
                    .map(|seconds| (seconds * fps as f32).ceil().max(1.0) as u32)
            })
            .unwrap_or(DEFAULT_FRAME_COUNT);
        RenderConfig::clamped(
            frame_count,
            fps,
            self.config.width.unwrap_or(DEFAULT_WIDTH),
            self.config.height.unwrap_or(DEFAULT_HEIGHT),
        )
    }
}

impl Shape {
    fn validate(&self) -> Result<()> {
        match self {
            Shape::Circle {
                color,
                radius,
                center,
                ..
            } => {
                require_color(color)?;
                require_unit_range("radius", *radius)?;
                require_center(center)?;
            }
            Shape::Rect {
                color,
                size,
                center,
                ..
            } => {
                require_color(color)?;
                require_unit_range("size.x", size[0])?;
                require_unit_range("size.y", size[1])?;
                require_center(center)?;
            }
            Shape::Particles {
                color, count, size, ..
            } => {
                require_color(color)?;
                if *count == 0 {
                    bail!("particle count must be at least 1");
                }
                if *count > MAX_PARTICLE_COUNT {
                    bail!("particle count {count} exceeds limit {MAX_PARTICLE_COUNT}");
                }
                require_unit_range("size", *size)?;
            }
        }
        Ok(())
    }

    pub fn color_rgb(&self) -> [u8; 3] {
        let color = match self {
            Shape::Circle { color, .. }
            | Shape::Rect { color, .. }
            | Shape::Particles { color, .. } => color,
        };
        parse_hex_color(color).unwrap_or([255, 255, 255])
    }
}

fn require_color(value: &str) -> Result<()> {
    if parse_hex_color(value).is_none() {
        bail!("invalid color '{value}' (expected #rrggbb)");
    }
    Ok(())
}

fn require_unit_range(field: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > 1.0 {
        bail!("{field} must be within (0, 1], got {value}");
    }
    Ok(())
}

fn require_center(center: &[f32; 2]) -> Result<()> {
    for component in center {
        if !component.is_finite() || *component < 0.0 || *component > 1.0 {
            bail!("center components must be within [0, 1], got {component}");
        }
    }
    Ok(())
}

/// Parses `#rrggbb` (case-insensitive, leading `#` optional).
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let red = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let green = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let blue = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([red, green, blue])
}
