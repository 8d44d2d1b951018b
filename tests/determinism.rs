use promptreel::renderer::SceneRenderer;
use promptreel::scene::{extract_render_config, RenderConfig};

const SCRIPT_SOURCE: &str = r##"{
    "config": { "durationInFrames": 12, "fps": 24, "width": 96, "height": 54 },
    "background": { "top": "#0f0f23", "bottom": "#1a2840" },
    "shapes": [
        { "kind": "circle", "color": "#6366f1", "radius": 0.12,
          "orbit": { "radius": 0.2, "speed": 0.5 } },
        { "kind": "rect", "color": "#06b6d4", "size": [0.3, 0.15],
          "center": [0.3, 0.6], "spin": 0.75 },
        { "kind": "particles", "color": "#ffffff", "count": 60, "size": 0.01,
          "seed": 7, "drift": 0.05, "twinkle": 1.5 }
    ]
}"##;

#[test]
fn placeholder_render_is_deterministic() {
    let config = RenderConfig {
        frame_count: 10,
        fps: 30,
        width: 96,
        height: 54,
    };
    let renderer = SceneRenderer::Placeholder;

    let first = render_hash(&renderer, &config, 4);
    let second = render_hash(&renderer, &config, 4);
    assert_eq!(first, second, "placeholder render should be deterministic");
}

#[test]
fn script_render_is_deterministic() {
    let config = extract_render_config(SCRIPT_SOURCE);
    let renderer = SceneRenderer::select(SCRIPT_SOURCE);
    assert_eq!(renderer.variant_name(), "script");

    let first = render_hash(&renderer, &config, 7);
    let second = render_hash(&renderer, &config, 7);
    assert_eq!(first, second, "script render should be deterministic");
}

#[test]
fn different_frame_indices_produce_different_pixels() {
    let config = extract_render_config(SCRIPT_SOURCE);
    let renderer = SceneRenderer::select(SCRIPT_SOURCE);

    let early = render_hash(&renderer, &config, 0);
    let late = render_hash(&renderer, &config, 11);
    assert_ne!(early, late, "animated frames should differ over time");

    let placeholder = SceneRenderer::Placeholder;
    let first = render_hash(&placeholder, &config, 0);
    let second = render_hash(&placeholder, &config, 1);
    assert_ne!(first, second, "the frame counter overlay should advance");
}

#[test]
fn separate_renderer_instances_agree() {
    let config = extract_render_config(SCRIPT_SOURCE);
    let first = render_hash(&SceneRenderer::select(SCRIPT_SOURCE), &config, 5);
    let second = render_hash(&SceneRenderer::select(SCRIPT_SOURCE), &config, 5);
    assert_eq!(
        first, second,
        "renderer selection must not introduce hidden state"
    );
}

fn render_hash(renderer: &SceneRenderer, config: &RenderConfig, frame: u32) -> u64 {
    let frame = renderer
        .render_frame(config, frame)
        .expect("failed to render frame for hash");
    fnv1a64(&frame.png)
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325_u64;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0001_0000_01b3);
    }
    hash
}
