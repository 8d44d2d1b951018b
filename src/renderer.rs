use std::f32::consts::TAU;
use std::io::Cursor;

use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::error::{EngineError, EngineResult};
use crate::progress::{percent, ProgressSink};
use crate::scene::RenderConfig;
use crate::schema::{parse_hex_color, Background, Orbit, SceneScript, Shape};

/// Backdrop used when a script declares no background.
const DEFAULT_BACKDROP: [u8; 3] = [15, 15, 35];
const COUNTER_COLOR: [u8; 3] = [255, 255, 255];

/// One rendered raster image, PNG-encoded, tagged with its frame index.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// Per-frame renderer, polymorphic over how the scene source is interpreted.
///
/// Generated code is never executed. A source that decodes and validates as
/// a [`SceneScript`] is drawn directly; everything else renders through a
/// deterministic placeholder (time-varying gradient plus a frame counter) so
/// a malformed generation step degrades visual fidelity instead of failing
/// the pipeline.
pub enum SceneRenderer {
    Script(SceneScript),
    Placeholder,
}

impl SceneRenderer {
    pub fn select(source: &str) -> Self {
        match SceneScript::parse(source) {
            Some(script) => match script.validate() {
                Ok(()) => {
                    tracing::debug!("scene script accepted, using the script renderer");
                    Self::Script(script)
                }
                Err(error) => {
                    tracing::debug!(%error, "scene script rejected, using the placeholder");
                    Self::Placeholder
                }
            },
            None => {
                tracing::debug!("no decodable scene script, using the placeholder");
                Self::Placeholder
            }
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::Script(_) => "script",
            Self::Placeholder => "placeholder",
        }
    }

    /// Renders frames `0..frame_count` in order. The off-screen target is
    /// allocated once, reused for every frame, and released on both the
    /// success and failure path when this call returns.
    pub fn render_all(
        &self,
        config: &RenderConfig,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<Vec<Frame>> {
        let mut target = RenderTarget::new(config)?;
        let mut frames = Vec::with_capacity(config.frame_count as usize);
        for index in 0..config.frame_count {
            frames.push(self.render_into(&mut target, config, index)?);
            progress.update(&format!(
                "rendering frames: {}%",
                percent(index, config.frame_count)
            ));
        }
        Ok(frames)
    }

    /// Renders a single frame into a fresh target. Same (source, config,
    /// index) always yields byte-identical pixels.
    pub fn render_frame(&self, config: &RenderConfig, index: u32) -> EngineResult<Frame> {
        let mut target = RenderTarget::new(config)?;
        self.render_into(&mut target, config, index)
    }

    fn render_into(
        &self,
        target: &mut RenderTarget,
        config: &RenderConfig,
        index: u32,
    ) -> EngineResult<Frame> {
        match self {
            Self::Script(script) => draw_script(target, script, config, index),
            Self::Placeholder => draw_placeholder(target, config, index),
        }
        let png = target.encode_png()?;
        Ok(Frame {
            index,
            width: config.width,
            height: config.height,
            png,
        })
    }
}

/// Hidden render surface. Every draw keeps alpha at 255, so the pixmap's
/// premultiplied storage doubles as plain RGBA.
struct RenderTarget {
    pixmap: Pixmap,
    width: u32,
    height: u32,
}

impl RenderTarget {
    fn new(config: &RenderConfig) -> EngineResult<Self> {
        let pixmap = Pixmap::new(config.width, config.height).ok_or_else(|| {
            EngineError::render(format!(
                "cannot allocate a {}x{} render target",
                config.width, config.height
            ))
        })?;
        Ok(Self {
            pixmap,
            width: config.width,
            height: config.height,
        })
    }

    fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let index = (y * self.width + x) as usize;
        if let Some(pixel) = PremultipliedColorU8::from_rgba(rgb[0], rgb[1], rgb[2], 255) {
            self.pixmap.pixels_mut()[index] = pixel;
        }
    }

    fn blend_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3], coverage: f32) {
        if coverage <= 0.0 || x >= self.width || y >= self.height {
            return;
        }
        let alpha = (coverage.min(1.0) * 255.0 + 0.5) as u16;
        let index = (y * self.width + x) as usize;
        let pixels = self.pixmap.pixels_mut();
        let dst = pixels[index];
        let inv = 255 - alpha;
        let red = mul_div255(u16::from(rgb[0]), alpha) + mul_div255(u16::from(dst.red()), inv);
        let green = mul_div255(u16::from(rgb[1]), alpha) + mul_div255(u16::from(dst.green()), inv);
        let blue = mul_div255(u16::from(rgb[2]), alpha) + mul_div255(u16::from(dst.blue()), inv);
        if let Some(pixel) = PremultipliedColorU8::from_rgba(
            red.min(255) as u8,
            green.min(255) as u8,
            blue.min(255) as u8,
            255,
        ) {
            pixels[index] = pixel;
        }
    }

    fn encode_png(&self) -> EngineResult<Vec<u8>> {
        let image =
            image::RgbaImage::from_raw(self.width, self.height, self.pixmap.data().to_vec())
                .ok_or_else(|| EngineError::render("render target buffer size mismatch"))?;
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|error| EngineError::render(format!("failed to encode frame png: {error}")))?;
        Ok(png)
    }
}

fn mul_div255(value: u16, factor: u16) -> u16 {
    ((u32::from(value) * u32::from(factor) + 127) / 255) as u16
}

/// Deterministic pseudo-random value in [0, 1) derived from a stable
/// (seed, element, channel) triple. Never consults global entropy; the same
/// triple yields the same value on every run.
pub fn seeded_unit(seed: u64, element: u32, channel: u32) -> f32 {
    let mut state = seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((u64::from(element) << 32) | u64::from(channel));
    state ^= state >> 30;
    state = state.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    state ^= state >> 27;
    state = state.wrapping_mul(0x94D0_49BB_1331_11EB);
    state ^= state >> 31;
    (state >> 40) as f32 / (1u64 << 24) as f32
}

fn draw_script(target: &mut RenderTarget, script: &SceneScript, config: &RenderConfig, index: u32) {
    let time = config.time_at(index);
    draw_background(target, script.background.as_ref());
    for shape in &script.shapes {
        draw_shape(target, shape, time);
    }
}

fn draw_background(target: &mut RenderTarget, background: Option<&Background>) {
    let (top, bottom) = match background {
        Some(background) => (
            parse_hex_color(&background.top).unwrap_or(DEFAULT_BACKDROP),
            parse_hex_color(&background.bottom).unwrap_or(DEFAULT_BACKDROP),
        ),
        None => (DEFAULT_BACKDROP, DEFAULT_BACKDROP),
    };

    let span = (target.height - 1).max(1) as f32;
    for y in 0..target.height {
        let rgb = lerp_rgb(top, bottom, y as f32 / span);
        for x in 0..target.width {
            target.set_pixel(x, y, rgb);
        }
    }
}

fn draw_shape(target: &mut RenderTarget, shape: &Shape, time: f32) {
    let width = target.width as f32;
    let height = target.height as f32;
    let min_dim = width.min(height);
    let rgb = shape.color_rgb();

    match shape {
        Shape::Circle {
            radius,
            center,
            orbit,
            pulse,
            ..
        } => {
            let (cx, cy) = animate_center(*center, orbit.as_ref(), time, width, height, min_dim);
            let mut r = radius * min_dim;
            if let Some(pulse) = pulse {
                r *= 1.0 + pulse.amount * (TAU * pulse.speed * time).sin();
            }
            if r > 0.5 {
                fill_circle(target, cx, cy, r, rgb, 1.0);
            }
        }
        Shape::Rect {
            size,
            center,
            spin,
            orbit,
            pulse,
            ..
        } => {
            let (cx, cy) = animate_center(*center, orbit.as_ref(), time, width, height, min_dim);
            let mut half_w = size[0] * width / 2.0;
            let mut half_h = size[1] * height / 2.0;
            if let Some(pulse) = pulse {
                let scale = 1.0 + pulse.amount * (TAU * pulse.speed * time).sin();
                half_w *= scale;
                half_h *= scale;
            }
            if half_w > 0.25 && half_h > 0.25 {
                fill_rotated_rect(target, cx, cy, half_w, half_h, TAU * spin * time, rgb);
            }
        }
        Shape::Particles {
            count,
            size,
            seed,
            drift,
            twinkle,
            ..
        } => {
            let r = (size * min_dim).max(1.0);
            for element in 0..*count {
                let u = seeded_unit(*seed, element, 0);
                let v = seeded_unit(*seed, element, 1);
                let rate = 0.5 + seeded_unit(*seed, element, 2);
                let phase = seeded_unit(*seed, element, 3) * TAU;
                let x = (u + drift * rate * time).rem_euclid(1.0) * width;
                let y = (v + 0.02 * (time * rate * 2.0 + phase).sin()).rem_euclid(1.0) * height;
                let alpha = if *twinkle > 0.0 {
                    0.5 + 0.5 * (TAU * twinkle * time + phase).sin()
                } else {
                    1.0
                };
                fill_circle(target, x, y, r, rgb, alpha);
            }
        }
    }
}

fn animate_center(
    center: [f32; 2],
    orbit: Option<&Orbit>,
    time: f32,
    width: f32,
    height: f32,
    min_dim: f32,
) -> (f32, f32) {
    let mut cx = center[0] * width;
    let mut cy = center[1] * height;
    if let Some(orbit) = orbit {
        let angle = TAU * (orbit.speed * time + orbit.phase);
        cx += orbit.radius * min_dim * angle.cos();
        cy += orbit.radius * min_dim * angle.sin();
    }
    (cx, cy)
}

fn fill_circle(target: &mut RenderTarget, cx: f32, cy: f32, radius: f32, rgb: [u8; 3], alpha: f32) {
    let x0 = (cx - radius - 1.0).floor().max(0.0) as u32;
    let x1 = ((cx + radius + 1.0).ceil().max(0.0) as u32).min(target.width.saturating_sub(1));
    let y0 = (cy - radius - 1.0).floor().max(0.0) as u32;
    let y1 = ((cy + radius + 1.0).ceil().max(0.0) as u32).min(target.height.saturating_sub(1));

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let distance = (dx * dx + dy * dy).sqrt();
            // One-pixel analytic edge keeps coverage deterministic.
            let coverage = (radius + 0.5 - distance).clamp(0.0, 1.0) * alpha;
            target.blend_pixel(x, y, rgb, coverage);
        }
    }
}

fn fill_rotated_rect(
    target: &mut RenderTarget,
    cx: f32,
    cy: f32,
    half_w: f32,
    half_h: f32,
    angle: f32,
    rgb: [u8; 3],
) {
    let extent = (half_w * half_w + half_h * half_h).sqrt() + 1.0;
    let x0 = (cx - extent).floor().max(0.0) as u32;
    let x1 = ((cx + extent).ceil().max(0.0) as u32).min(target.width.saturating_sub(1));
    let y0 = (cy - extent).floor().max(0.0) as u32;
    let y1 = ((cy + extent).ceil().max(0.0) as u32).min(target.height.saturating_sub(1));
    let (sin, cos) = angle.sin_cos();

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let local_x = dx * cos + dy * sin;
            let local_y = -dx * sin + dy * cos;
            let coverage = (half_w - local_x.abs() + 0.5)
                .clamp(0.0, 1.0)
                .min((half_h - local_y.abs() + 0.5).clamp(0.0, 1.0));
            target.blend_pixel(x, y, rgb, coverage);
        }
    }
}

fn draw_placeholder(target: &mut RenderTarget, config: &RenderConfig, index: u32) {
    let progress = index as f32 / config.frame_count as f32;
    let start = hsl_to_rgb(progress * 360.0, 0.7, 0.5);
    let end = hsl_to_rgb(progress * 360.0 + 180.0, 0.7, 0.3);
    let span = (config.width + config.height).saturating_sub(2).max(1) as f32;

    for y in 0..config.height {
        for x in 0..config.width {
            let t = (x + y) as f32 / span;
            target.set_pixel(x, y, lerp_rgb(start, end, t));
        }
    }

    draw_frame_counter(target, index);
}

/// Segment bits: 0=top, 1=top-right, 2=bottom-right, 3=bottom, 4=bottom-left,
/// 5=top-left, 6=middle.
const SEGMENT_MASKS: [u8; 10] = [
    0x3F, 0x06, 0x5B, 0x4F, 0x66, 0x6D, 0x7D, 0x07, 0x7F, 0x6F,
];

/// Zero-padded frame index in the lower-left corner, drawn as seven-segment
/// digits so the placeholder needs no font assets.
fn draw_frame_counter(target: &mut RenderTarget, index: u32) {
    let digit_h = (target.height / 12).max(14);
    let digit_w = (digit_h * 11 / 20).max(8);
    let stroke = (digit_h / 7).max(2);
    let spacing = (digit_w / 2).max(4);
    let margin = digit_h / 2;

    let text = format!("{index:05}");
    let mut x = margin;
    let y = target.height.saturating_sub(margin + digit_h);
    for ch in text.chars() {
        let digit = (ch as u8 - b'0') as usize;
        draw_digit(target, x, y, digit_w, digit_h, stroke, SEGMENT_MASKS[digit]);
        x += digit_w + spacing;
    }
}

fn draw_digit(target: &mut RenderTarget, x: u32, y: u32, w: u32, h: u32, stroke: u32, mask: u8) {
    let half = h / 2;
    let segments = [
        (x, y, w, stroke),
        (x + w - stroke, y, stroke, half),
        (x + w - stroke, y + half, stroke, h - half),
        (x, y + h - stroke, w, stroke),
        (x, y + half, stroke, h - half),
        (x, y, stroke, half),
        (x, y + half - stroke / 2, w, stroke),
    ];
    for (bit, (sx, sy, sw, sh)) in segments.iter().enumerate() {
        if mask & (1 << bit) != 0 {
            fill_axis_rect(target, *sx, *sy, *sw, *sh, COUNTER_COLOR);
        }
    }
}

fn fill_axis_rect(target: &mut RenderTarget, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
    let x1 = (x + w).min(target.width);
    let y1 = (y + h).min(target.height);
    for yy in y.min(target.height)..y1 {
        for xx in x.min(target.width)..x1 {
            target.set_pixel(xx, yy, rgb);
        }
    }
}

fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [u8; 3] {
    let hue = hue.rem_euclid(360.0);
    let chroma = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let hue_prime = hue / 60.0;
    let x = chroma * (1.0 - (hue_prime % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hue_prime as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = lightness - chroma / 2.0;
    [
        to_channel(r1 + m),
        to_channel(g1 + m),
        to_channel(b1 + m),
    ]
}

fn to_channel(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn lerp_rgb(a: [u8; 3], b: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    [
        lerp_channel(a[0], b[0], t),
        lerp_channel(a[1], b[1], t),
        lerp_channel(a[2], b[2], t),
    ]
}

fn lerp_channel(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;

    fn small_config() -> RenderConfig {
        RenderConfig {
            frame_count: 4,
            fps: 30,
            width: 64,
            height: 36,
        }
    }

    #[test]
    fn seeded_unit_is_stable_and_in_range() {
        for element in 0..32 {
            for channel in 0..4 {
                let first = seeded_unit(7, element, channel);
                let second = seeded_unit(7, element, channel);
                assert_eq!(first.to_bits(), second.to_bits());
                assert!(first >= 0.0 && first < 1.0);
            }
        }
        assert_ne!(
            seeded_unit(7, 0, 0).to_bits(),
            seeded_unit(7, 0, 1).to_bits()
        );
        assert_ne!(
            seeded_unit(7, 0, 0).to_bits(),
            seeded_unit(8, 0, 0).to_bits()
        );
    }

    #[test]
    fn hsl_conversion_hits_expected_hues() {
        let red = hsl_to_rgb(0.0, 0.7, 0.5);
        assert!(red[0] > red[1] && red[0] > red[2]);
        let green = hsl_to_rgb(120.0, 0.7, 0.5);
        assert!(green[1] > green[0] && green[1] > green[2]);
        let blue = hsl_to_rgb(240.0, 0.7, 0.5);
        assert!(blue[2] > blue[0] && blue[2] > blue[1]);
        assert_eq!(hsl_to_rgb(42.0, 0.7, 0.0), [0, 0, 0]);
        assert_eq!(hsl_to_rgb(42.0, 0.7, 1.0), [255, 255, 255]);
    }

    #[test]
    fn segment_masks_cover_the_usual_shapes() {
        assert_eq!(SEGMENT_MASKS[8].count_ones(), 7);
        assert_eq!(SEGMENT_MASKS[1].count_ones(), 2);
        assert_eq!(SEGMENT_MASKS[0].count_ones(), 6);
    }

    #[test]
    fn placeholder_frames_decode_to_declared_dimensions() {
        let config = small_config();
        let frame = SceneRenderer::Placeholder
            .render_frame(&config, 0)
            .expect("placeholder frame should render");
        let decoded = image::load_from_memory(&frame.png).expect("png should decode");
        assert_eq!(decoded.width(), config.width);
        assert_eq!(decoded.height(), config.height);
    }

    #[test]
    fn placeholder_frames_differ_by_index() {
        let config = small_config();
        let renderer = SceneRenderer::Placeholder;
        let first = renderer.render_frame(&config, 0).expect("should render");
        let second = renderer.render_frame(&config, 1).expect("should render");
        assert_ne!(first.png, second.png);
    }

    #[test]
    fn render_all_reports_per_frame_progress() {
        let config = small_config();
        let mut progress = RecordingProgress::default();
        let frames = SceneRenderer::Placeholder
            .render_all(&config, &mut progress)
            .expect("render_all should succeed");
        assert_eq!(frames.len(), config.frame_count as usize);
        assert_eq!(progress.updates.len(), config.frame_count as usize);
        assert!(progress.updates[0].contains("rendering frames"));
    }

    #[test]
    fn select_falls_back_on_unusable_sources() {
        assert_eq!(
            SceneRenderer::select("const nope = 1;").variant_name(),
            "placeholder"
        );
        let valid = r##"{
            "config": { "durationInFrames": 4, "fps": 30, "width": 64, "height": 36 },
            "shapes": [{ "kind": "circle", "color": "#6366f1", "radius": 0.2 }]
        }"##;
        assert_eq!(SceneRenderer::select(valid).variant_name(), "script");
    }
}
