//! Runs the gridtool binary against grids in a temporary directory.

use std::path::Path;
use std::process::{Command, Output};

use test_utils::fixtures;

fn gridtool(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gridtool"))
        .args(args)
        .args(["--storage-mode", "eager", "--format", "zarr", "--log-level", "warn"])
        .output()
        .expect("failed to run gridtool")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_layout(dir: &Path) -> String {
    let path = dir.join("grid.yaml");
    std::fs::write(&path, fixtures::layouts::SMALL).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_create_and_info() {
    let dir = tempfile::tempdir().unwrap();
    let layout = write_layout(dir.path());
    let grid = dir.path().join("grid.zarr");
    let grid = grid.to_str().unwrap();

    let out = gridtool(&["create", grid, "--layout", &layout, "--allocate"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("Shape: [2, 5, 3]"));

    let out = gridtool(&["info", grid, "--layout", &layout, "--param", "T_eff=3750,4250"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = stdout(&out);
    assert!(text.contains("Sliced shape: [2, 3, 3]"));
    assert!(text.contains("flux"));
    assert!(text.contains("valid 0"));
}

#[test]
fn test_interpolate_empty_grid_prints_null() {
    let dir = tempfile::tempdir().unwrap();
    let layout = write_layout(dir.path());
    let grid = dir.path().join("grid.zarr");
    let grid = grid.to_str().unwrap();

    assert!(gridtool(&["create", grid, "--layout", &layout, "--allocate"]).status.success());

    let out = gridtool(&[
        "interpolate",
        grid,
        "--layout",
        &layout,
        "--value",
        "mag",
        "--at",
        "Fe_H=0.05",
        "--at",
        "T_eff=3900",
        "--at",
        "log_g=4.2",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(json["value"], "mag");
    assert!(json["data"].is_null());
}

#[test]
fn test_reindex() {
    let dir = tempfile::tempdir().unwrap();
    let layout = write_layout(dir.path());
    let grid = dir.path().join("grid.zarr");
    let grid = grid.to_str().unwrap();

    assert!(gridtool(&["create", grid, "--layout", &layout, "--allocate"]).status.success());
    let out = gridtool(&["reindex", grid, "--layout", &layout, "--rebuild"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
}

#[test]
fn test_missing_layout_fails() {
    let dir = tempfile::tempdir().unwrap();
    let grid = dir.path().join("grid.zarr");
    let out = gridtool(&["create", grid.to_str().unwrap(), "--layout", "/nonexistent/grid.yaml"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Failed to load layout"));
}
