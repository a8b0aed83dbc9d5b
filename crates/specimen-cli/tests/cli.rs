// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use assert_cmd::Command;
use predicates::prelude::*;
use std::{fs, path::Path};
use tempfile::TempDir;

const DATASET: &str = r#"{
    "images": [
        {
            "image_url": "https://cdn.example.org/slides/a.jpg",
            "image_width": 100,
            "image_height": 100,
            "segmentation_url": "https://cdn.example.org/seg/a.txt",
            "info": [
                {"index": 0, "species": "Navicula", "bbox": "0,0,10,10"},
                {"index": 1, "species": "Lyrella", "bbox": "20,20,30,30"}
            ]
        },
        {
            "image_url": "https://cdn.example.org/slides/b.jpg",
            "image_width": "",
            "info": []
        }
    ]
}"#;

const SEGMENTATION: &str = "1 0.01 0.01 0.05 0.05 0.08 0.08\n2 0.21 0.21 0.25 0.25\nbroken\n";

fn command(workspace: &Path) -> Result<Command, Box<dyn std::error::Error>> {
    let config = workspace.join("config.toml");
    if !config.exists() {
        fs::write(&config, "")?;
    }

    let mut cmd = Command::cargo_bin("specimen-align")?;
    cmd.env("RUST_LOG", "warn").arg("--config").arg(config);
    Ok(cmd)
}

fn workspace() -> Result<TempDir, Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("dataset.json"), DATASET)?;
    fs::create_dir(dir.path().join("seg"))?;
    fs::write(dir.path().join("seg").join("a.txt"), SEGMENTATION)?;
    Ok(dir)
}

#[test]
fn test_labels() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("specimen-align")?;
    cmd.arg("labels");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("0 Incomplete"))
        .stdout(predicate::str::contains("4 SideView"));
    Ok(())
}

#[test]
fn test_parse() -> Result<(), Box<dyn std::error::Error>> {
    let dir = workspace()?;
    let path = dir.path().join("seg").join("a.txt");

    let output = command(dir.path())?
        .arg("parse")
        .arg(&path)
        .args(["--width", "200", "--height", "100"])
        .output()?;
    assert!(output.status.success());

    let segments: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let segments = segments.as_array().ok_or("expected an array")?;
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0]["label_text"], "Complete");
    assert_eq!(segments[0]["points_count"], 3);
    assert_eq!(segments[1]["index"], 1);
    assert_eq!(segments[1]["points_denormalized"][0][0], 42.0);
    Ok(())
}

#[test]
fn test_parse_requires_both_dimensions() -> Result<(), Box<dyn std::error::Error>> {
    let dir = workspace()?;

    command(dir.path())?
        .arg("parse")
        .arg(dir.path().join("seg").join("a.txt"))
        .args(["--width", "200"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_align_all_to_output() -> Result<(), Box<dyn std::error::Error>> {
    let dir = workspace()?;
    let output = dir.path().join("aligned.json");

    command(dir.path())?
        .arg("align-all")
        .arg("--dataset")
        .arg(dir.path().join("dataset.json"))
        .arg("--segmentations")
        .arg(dir.path().join("seg"))
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Processed 1 image(s), 2 segment(s) matched",
        ));

    let aligned: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output)?)?;
    let image = &aligned["images"][0];
    let boxes = &image["info"];
    assert_eq!(boxes[0]["segmentation"], "1 0.01 0.01 0.05 0.05 0.08 0.08");
    assert_eq!(boxes[1]["segmentation"], "2 0.21 0.21 0.25 0.25");
    assert_eq!(boxes[0]["species"], "Navicula");
    assert_eq!(boxes[0]["bbox"], "0,0,10,10");
    assert_eq!(image["segmentation_url"], "https://cdn.example.org/seg/a.txt");
    assert_eq!(image["segmentation_indices_array"][1]["matched_box_index"], 1);
    assert!(image.get("boxes").is_none());

    // Images without a source keep their stored form.
    let untouched = &aligned["images"][1];
    assert_eq!(untouched["image_width"], "");
    assert!(untouched.get("segmentation_indices_array").is_none());

    // The input is left alone when --output is given.
    assert_eq!(fs::read_to_string(dir.path().join("dataset.json"))?, DATASET);
    Ok(())
}

#[test]
fn test_align_all_in_place_with_threshold() -> Result<(), Box<dyn std::error::Error>> {
    let dir = workspace()?;
    fs::write(
        dir.path().join("seg").join("a.txt"),
        "1 0.01 0.01 0.05 0.05 0.5 0.5\n",
    )?;

    command(dir.path())?
        .args(["--threshold", "0.9"])
        .arg("align-all")
        .arg("--dataset")
        .arg(dir.path().join("dataset.json"))
        .arg("--segmentations")
        .arg(dir.path().join("seg"))
        .assert()
        .success()
        .stdout(predicate::str::contains("0 segment(s) matched"));

    let aligned: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("dataset.json"))?)?;
    assert_eq!(aligned["images"][0]["info"][0]["segmentation"], "");
    assert_eq!(
        aligned["images"][0]["segmentation_indices_array"][0]["points_count"],
        3
    );
    Ok(())
}

#[test]
fn test_align_all_persistence_failure() -> Result<(), Box<dyn std::error::Error>> {
    let dir = workspace()?;
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "")?;

    command(dir.path())?
        .arg("align-all")
        .arg("--dataset")
        .arg(dir.path().join("dataset.json"))
        .arg("--segmentations")
        .arg(dir.path().join("seg"))
        .arg("--output")
        .arg(blocker.join("aligned.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("PersistenceFailure"));
    Ok(())
}

#[test]
fn test_align_single_image() -> Result<(), Box<dyn std::error::Error>> {
    let dir = workspace()?;

    let output = command(dir.path())?
        .arg("align")
        .arg("--dataset")
        .arg(dir.path().join("dataset.json"))
        .args(["--image", "https://cdn.example.org/slides/a.jpg"])
        .arg("--segmentation")
        .arg(dir.path().join("seg").join("a.txt"))
        .output()?;
    assert!(output.status.success());

    let record: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(record["image_url"], "https://cdn.example.org/slides/a.jpg");
    assert_eq!(
        record["info"][0]["segmentation"],
        "1 0.01 0.01 0.05 0.05 0.08 0.08"
    );
    assert_eq!(
        record["segmentation_indices_array"].as_array().map(Vec::len),
        Some(2)
    );
    Ok(())
}

#[test]
fn test_align_unknown_image() -> Result<(), Box<dyn std::error::Error>> {
    let dir = workspace()?;

    command(dir.path())?
        .arg("align")
        .arg("--dataset")
        .arg(dir.path().join("dataset.json"))
        .args(["--image", "missing.jpg"])
        .arg("--segmentation")
        .arg(dir.path().join("seg").join("a.txt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("MissingImage"));
    Ok(())
}

#[test]
fn test_invalid_threshold() -> Result<(), Box<dyn std::error::Error>> {
    let dir = workspace()?;

    command(dir.path())?
        .args(["--threshold", "1.5"])
        .arg("parse")
        .arg(dir.path().join("seg").join("a.txt"))
        .assert()
        .failure();
    Ok(())
}
