//! Tests of the `cmb2sphere` binary.

use std::path::Path;
use std::process::{Command, Output};

use cmb2sphere::{load_stl, write_healpix_map, Nside, ScalarField};

fn cmb2sphere(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cmb2sphere"))
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap()
}

fn write_map(path: &Path) {
    let nside = Nside::new(4).unwrap();
    let values = nside
        .directions()
        .directions()
        .iter()
        .map(|d| 1e-4 * (3.0 * d.phi).sin() * d.theta.sin())
        .collect();
    write_healpix_map(path, &ScalarField::new(nside, values).unwrap()).unwrap();
}

#[test]
fn test_missing_input_exits_with_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let output = cmb2sphere(
        dir.path(),
        &["--input=/nonexistent/path.fits", "out.stl"],
    );

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Required data file not found"), "{stderr}");
    assert!(!dir.path().join("out.stl").exists());
    assert!(!dir.path().join(".cmb2sphere-cache").exists());
}

#[test]
fn test_writes_stl() {
    let dir = tempfile::tempdir().unwrap();
    write_map(&dir.path().join("map.fits"));

    let output = cmb2sphere(
        dir.path(),
        &["--input=map.fits", "--nside=4", "--fwhm=5", "sphere.stl"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let facets = load_stl(&dir.path().join("sphere.stl")).unwrap();
    assert_eq!(facets.len(), 2 * 192 - 4);
    assert!(dir.path().join(".cmb2sphere-cache").is_dir());
}

#[test]
fn test_writes_ply_without_cache() {
    let dir = tempfile::tempdir().unwrap();
    write_map(&dir.path().join("map.fits"));

    let output = cmb2sphere(
        dir.path(),
        &["--input", "map.fits", "--nside", "2", "--no-cache", "sphere.ply"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let text = std::fs::read_to_string(dir.path().join("sphere.ply")).unwrap();
    assert!(text.starts_with("ply"));
    assert!(text.contains("element vertex 48"));
    assert!(text.contains("element face 92"));
    assert!(!dir.path().join(".cmb2sphere-cache").exists());
}

#[test]
fn test_config_file_and_flag_precedence() {
    let dir = tempfile::tempdir().unwrap();
    write_map(&dir.path().join("map.fits"));
    std::fs::write(
        dir.path().join("options.json"),
        r#"{ "resolution": 1, "auto_scale": true, "cache": { "directory": "cache" } }"#,
    )
    .unwrap();

    let output = cmb2sphere(
        dir.path(),
        &["--config=options.json", "--input=map.fits", "--nside=2", "out.stl"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(load_stl(&dir.path().join("out.stl")).unwrap().len(), 92);
    assert!(dir.path().join("cache").is_dir());
}

#[test]
fn test_invalid_resolution_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    write_map(&dir.path().join("map.fits"));

    let output = cmb2sphere(
        dir.path(),
        &["--input=map.fits", "--nside=0", "--no-cache", "out.stl"],
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid resolution"), "{stderr}");
    assert!(!dir.path().join("out.stl").exists());
}

#[test]
fn test_odd_resolution_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    write_map(&dir.path().join("map.fits"));

    let output = cmb2sphere(
        dir.path(),
        &["--input=map.fits", "--nside=3", "--no-cache", "out.stl"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(load_stl(&dir.path().join("out.stl")).unwrap().len(), 2 * 108 - 4);
}
