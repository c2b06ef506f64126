use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use ddsfile::{D3DFormat, Dds, NewD3dParams};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use tempfile::TempDir;

fn texlens(config_dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_texlens"))
        .env("TEXLENS_CONFIG_DIR", config_dir)
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run texlens")
}

/// 8x8 DXT1 with a red base level and a green 4x4 level.
fn write_two_level_dds(dir: &Path) -> PathBuf {
    let mut dds = Dds::new_d3d(NewD3dParams {
        height: 8,
        width: 8,
        depth: None,
        format: D3DFormat::DXT1,
        mipmap_levels: Some(2),
        caps2: None,
    })
    .unwrap();
    let block = |colour: u16| {
        let mut block = colour.to_le_bytes().to_vec();
        block.extend_from_slice(&[0; 6]);
        block
    };
    dds.data = [block(0xf800).repeat(4), block(0x07e0)].concat();
    let path = dir.join("chain.dds");
    dds.write(&mut File::create(&path).unwrap()).unwrap();
    path
}

#[test]
fn json_report_describes_a_flat_rgb_image() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("rgb.png");
    RgbImage::from_pixel(5, 3, Rgb([200, 100, 50])).save(&path).unwrap();

    let output = texlens(
        temp.path(),
        &["--backend", "software", "--json", path.to_str().unwrap()],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let report: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(report["pixel_format"], "R8G8B8");
    assert_eq!(report["width"], 5);
    assert_eq!(report["height"], 3);
    assert_eq!(report["src_bit_depth"], 24);
    assert_eq!(report["opaque"], true);
    assert_eq!(report["layers"], 1);
    assert!(report["alt_image"].is_null());
}

#[test]
fn pixel_subcommand_prints_rgba_hex() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("rgba.png");
    let mut picture = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
    picture.put_pixel(1, 0, Rgba([0x12, 0x34, 0x56, 0x78]));
    picture.save(&path).unwrap();

    let output = texlens(
        temp.path(),
        &["pixel", path.to_str().unwrap(), "1", "0", "--backend", "software"],
    );
    assert!(output.status.success());
    assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), "#12345678");

    let outside = texlens(
        temp.path(),
        &["pixel", path.to_str().unwrap(), "9", "9", "--backend", "software"],
    );
    assert!(outside.status.success());
    assert_eq!(String::from_utf8(outside.stdout).unwrap().trim(), "#000000ff");
}

#[test]
fn failing_file_sets_non_zero_exit_but_reports_the_rest() {
    let temp = TempDir::new().unwrap();
    let good = temp.path().join("good.png");
    RgbImage::from_pixel(1, 1, Rgb([1, 2, 3])).save(&good).unwrap();
    let bad = temp.path().join("bad.png");
    std::fs::write(&bad, b"not an image").unwrap();

    let output = texlens(
        temp.path(),
        &[
            "--backend",
            "software",
            good.to_str().unwrap(),
            bad.to_str().unwrap(),
        ],
    );
    assert!(!output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1);
    assert!(stdout.contains("good.png"));
    assert!(stdout.contains("1x1"));
}

#[test]
fn config_file_in_config_dir_is_honoured() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("config.toml"),
        "backend = \"software\"\nmax_textures = 4\n",
    )
    .unwrap();
    let path = temp.path().join("flat.png");
    RgbImage::from_pixel(2, 2, Rgb([9, 9, 9])).save(&path).unwrap();

    let output = texlens(temp.path(), &["--json", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    // An explicit wgpu backend conflicts with the software-only texture cap.
    let conflict = texlens(
        temp.path(),
        &["--backend", "wgpu", path.to_str().unwrap()],
    );
    assert!(!conflict.status.success());
}

#[test]
fn defaults_subcommand_prints_parseable_toml() {
    let temp = TempDir::new().unwrap();
    let output = texlens(temp.path(), &["defaults"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("backend = \"auto\""));
    assert!(stdout.contains("alt_image = false"));
}

#[test]
fn pixel_subcommand_starts_on_alt_image_when_configured() {
    let temp = TempDir::new().unwrap();
    let path = write_two_level_dds(temp.path());
    let file = path.to_str().unwrap();

    // (10, 0) lies past the base level but inside the second strip tile.
    let primary = texlens(temp.path(), &["pixel", file, "10", "0", "--backend", "software"]);
    assert!(primary.status.success());
    assert_eq!(String::from_utf8(primary.stdout).unwrap().trim(), "#000000ff");

    std::fs::write(
        temp.path().join("config.toml"),
        "backend = \"software\"\nalt_image = true\n",
    )
    .unwrap();
    let output = texlens(temp.path(), &["pixel", file, "10", "0"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), "#00ff00ff");
}
