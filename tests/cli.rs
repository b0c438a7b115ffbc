use assert_cmd::prelude::*;
use ember_engine::{
    load_from_path, save_to_path, PhysicsSystem, Resources, RigidBody, Scene, SceneFormat,
    Transform,
};
use glam::Vec3;
use predicates::prelude::*;
use predicates::str::contains;
use std::process::Command;
use tempfile::TempDir;

fn write_scene(dir: &TempDir, file: &str) -> std::path::PathBuf {
    let resources = Resources::new();
    let mut scene = Scene::new();

    let ball = scene.create_game_object("Ball");
    scene.add_game_object(ball).expect("root");
    scene
        .set_transform(ball, Transform::from_position(Vec3::new(0.0, 5.0, 0.0)))
        .expect("transform");
    scene.add_component(ball, RigidBody::default()).expect("body");

    let marker = scene.create_game_object("Marker");
    scene.add_child(ball, marker).expect("child");

    let path = dir.path().join(file);
    save_to_path(&scene, &resources, &path, Some(SceneFormat::Json)).expect("save scene");
    path
}

#[test]
fn summary_run_prints_tree_and_simulated_state() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_scene(&dir, "level.json");

    let mut cmd = Command::cargo_bin("ember").expect("binary");
    cmd.arg(&path).arg("--summary-only").arg("--frames").arg("30");
    cmd.assert()
        .success()
        .stdout(contains("Loaded scene with 2 objects"))
        .stdout(contains("- Ball [Rigidbody]"))
        .stdout(contains("  - Marker []"))
        .stdout(contains("Final object states:"))
        .stdout(contains(" - Ball pos=("))
        .stdout(contains(" - Ball pos=(0.00, 5.00, 0.00)").not());
}

#[test]
fn save_flag_writes_a_loadable_binary_scene() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_scene(&dir, "level.json");
    let out = dir.path().join("after.embs");

    let mut cmd = Command::cargo_bin("ember").expect("binary");
    cmd.arg(&path)
        .arg("--summary-only")
        .arg("--frames")
        .arg("0")
        .arg("--save")
        .arg(&out);
    cmd.assert().success().stdout(contains("Saved scene to"));

    let bytes = std::fs::read(&out).expect("saved file");
    assert!(bytes.starts_with(b"EMBS"));

    let mut scene = Scene::with_physics(PhysicsSystem::default());
    let roots = load_from_path(&mut scene, &Resources::new(), &out).expect("reload");
    assert_eq!(roots.len(), 1);
    assert_eq!(scene.object_count(), 2);
    assert!(scene.find_by_name("Marker").is_some());
}

#[test]
fn rejects_unknown_arguments() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_scene(&dir, "level.json");

    let mut cmd = Command::cargo_bin("ember").expect("binary");
    cmd.arg(&path).arg("--turbo");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --turbo"));
}

#[test]
fn missing_scene_fails_with_context() {
    let mut cmd = Command::cargo_bin("ember").expect("binary");
    cmd.arg("does-not-exist.json").arg("--summary-only");
    cmd.assert()
        .failure()
        .stderr(contains("failed to load scene does-not-exist.json"));
}
