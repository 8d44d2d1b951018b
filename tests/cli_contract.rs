use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

fn run_promptreel(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_promptreel"))
        .current_dir(cwd)
        .args(args)
        .output()
        .expect("promptreel command should run")
}

fn command_available(name: &str, version_arg: &str) -> bool {
    Command::new(name)
        .arg(version_arg)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

#[test]
fn check_resolves_declared_config() {
    let dir = tempdir().expect("tempdir should create");
    let scene_path = dir.path().join("scene.txt");
    fs::write(
        &scene_path,
        "durationInFrames: 150\nfps: 30\nwidth: 1920\nheight: 1080\n",
    )
    .expect("scene should write");

    let output = run_promptreel(dir.path(), &["check", "scene.txt"]);
    assert!(output.status.success(), "check should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1920x1080"));
    assert!(stdout.contains("30 fps"));
    assert!(stdout.contains("150 frames"));
    assert!(stdout.contains("placeholder renderer"));
}

#[test]
fn check_reports_the_script_renderer_for_valid_scripts() {
    let dir = tempdir().expect("tempdir should create");
    let scene_path = dir.path().join("scene.json");
    fs::write(
        &scene_path,
        r##"{
            "config": { "durationInFrames": 24, "fps": 12, "width": 64, "height": 36 },
            "shapes": [{ "kind": "circle", "color": "#6366f1", "radius": 0.2 }]
        }"##,
    )
    .expect("scene should write");

    let output = run_promptreel(dir.path(), &["check", "scene.json"]);
    assert!(output.status.success(), "check should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("64x36"));
    assert!(stdout.contains("script renderer"));
}

#[test]
fn check_handles_fenced_scene_files() {
    let dir = tempdir().expect("tempdir should create");
    let scene_path = dir.path().join("scene.md");
    fs::write(
        &scene_path,
        "```json\n{ \"config\": { \"fps\": 24 } }\n```\n",
    )
    .expect("scene should write");

    let output = run_promptreel(dir.path(), &["check", "scene.md"]);
    assert!(output.status.success(), "check should succeed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("24 fps"));
}

#[test]
fn check_fails_for_missing_files() {
    let dir = tempdir().expect("tempdir should create");
    let output = run_promptreel(dir.path(), &["check", "missing.txt"]);
    assert!(!output.status.success(), "missing input should fail");
}

#[test]
fn render_writes_an_mp4_artifact() {
    if !command_available("ffmpeg", "-version") {
        eprintln!("skipping: ffmpeg is not available");
        return;
    }

    let dir = tempdir().expect("tempdir should create");
    let scene_path = dir.path().join("scene.json");
    fs::write(
        &scene_path,
        r##"{
            "config": { "durationInFrames": 6, "fps": 12, "width": 64, "height": 36 },
            "background": { "top": "#0f0f23", "bottom": "#1a2840" },
            "shapes": [{ "kind": "circle", "color": "#6366f1", "radius": 0.2,
                         "orbit": { "radius": 0.2, "speed": 1.0 } }]
        }"##,
    )
    .expect("scene should write");

    let output = run_promptreel(dir.path(), &["render", "scene.json", "-o", "out.mp4"]);
    assert!(
        output.status.success(),
        "render should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let artifact = dir.path().join("out.mp4");
    assert!(artifact.exists());
    let bytes = fs::metadata(&artifact).expect("artifact metadata").len();
    assert!(bytes > 0, "artifact should not be empty");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Wrote out.mp4"));
    assert!(stdout.contains("64x36"));
    assert!(stdout.contains("6 frames"));
}

#[test]
fn generate_requires_an_api_key() {
    let dir = tempdir().expect("tempdir should create");
    let output = Command::new(env!("CARGO_BIN_EXE_promptreel"))
        .current_dir(dir.path())
        .env_remove("OPENROUTER_API_KEY")
        .args(["generate", "a red cube rotating"])
        .output()
        .expect("promptreel command should run");

    if !command_available("ffmpeg", "-version") {
        // Without ffmpeg the command fails earlier with a different message.
        assert!(!output.status.success());
        return;
    }
    assert!(!output.status.success(), "generate without a key should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("OPENROUTER_API_KEY"));
}
