use assert_cmd::prelude::*;
use predicates::str::contains;
use std::io::Write;
use std::process::Command;
use tempfile::{Builder, NamedTempFile};

fn write_model(suffix: &str, contents: &str) -> NamedTempFile {
    let mut tmp = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp model");
    tmp.write_all(contents.as_bytes()).expect("write model");
    tmp
}

fn build_cube(size: f32) -> NamedTempFile {
    let mut obj = String::from("# cube\n");
    for z in [0.0, size] {
        for y in [0.0, size] {
            for x in [0.0, size] {
                obj.push_str(&format!("v {x} {y} {z}\n"));
            }
        }
    }
    let faces = [
        [1, 3, 4, 2],
        [5, 6, 8, 7],
        [1, 2, 6, 5],
        [3, 7, 8, 4],
        [1, 5, 7, 3],
        [2, 4, 8, 6],
    ];
    for [a, b, c, d] in faces {
        obj.push_str(&format!("f {a} {b} {c}\nf {a} {c} {d}\n"));
    }
    write_model(".obj", &obj)
}

#[test]
fn cli_loads_model_and_prints_summary() {
    let cube = build_cube(4.0);
    let mut cmd = Command::cargo_bin("artifact-viewer").expect("binary exists");
    cmd.arg(cube.path())
        .arg("--summary-only")
        .arg("--no-auto-rotate")
        .arg("--frames")
        .arg("5");
    cmd.assert()
        .success()
        .stdout(contains("as OBJ (8 vertices, 12 triangles)"))
        .stdout(contains(
            " - bounds min=(0.000, 0.000, 0.000) max=(4.000, 4.000, 4.000)",
        ))
        .stdout(contains(
            " - normalized scale=0.500 offset=(-2.000, -2.000, -2.000)",
        ))
        .stdout(contains("Rendered 5 frame(s); yaw=0.000 pitch=0.000"))
        .stdout(contains("Released 0 local reference(s)"));
}

#[test]
fn cli_reads_settings_file() {
    let cube = build_cube(1.0);
    let settings = format!(
        "(viewer: Some((source_url: {:?}, model_format: Some(OBJ), auto_rotate: false)))",
        cube.path().display().to_string()
    );
    let config = write_model(".ron", &settings);
    let mut cmd = Command::cargo_bin("artifact-viewer").expect("binary exists");
    cmd.arg("--config")
        .arg(config.path())
        .arg("--summary-only")
        .arg("--frames")
        .arg("2");
    cmd.assert()
        .success()
        .stdout(contains("12 triangles"))
        .stdout(contains("Rendered 2 frame(s); yaw=0.000"));
}

#[test]
fn cli_reports_decode_failure() {
    let junk = write_model(".obj", "hello\n");
    let mut cmd = Command::cargo_bin("artifact-viewer").expect("binary exists");
    cmd.arg(junk.path()).arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("Error: could not load"));
}

#[test]
fn cli_requires_a_model() {
    let mut cmd = Command::cargo_bin("artifact-viewer").expect("binary exists");
    cmd.arg("--summary-only");
    cmd.assert().failure().stderr(contains("Usage"));
}

#[test]
fn cli_rejects_unknown_format() {
    let cube = build_cube(1.0);
    let mut cmd = Command::cargo_bin("artifact-viewer").expect("binary exists");
    cmd.arg(cube.path()).arg("--format").arg("fbx");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown format"));
}
