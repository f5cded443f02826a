//! Integration tests for the inference service.
//!
//! Tests cover:
//! - Refusing to start without model weights
//! - Running the detector on raw and base64 encoded images
//! - Rejecting undecodable input and failing detectors

#![cfg(unix)]

mod common;

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::*;
use platewatch::InferenceService;

/// Copies `--source` to `<project>/<name>/` the way the detector saves annotated images.
const FAKE_DETECTOR: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --source) source="$2"; shift 2 ;;
    --project) project="$2"; shift 2 ;;
    --name) name="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$project/$name"
cp "$source" "$project/$name/"
"#;

fn service(dir: &Path, detector: &str) -> InferenceService {
    let weights = dir.join("my_model.pt");
    fs::write(&weights, b"weights").unwrap();
    InferenceService::new(InferenceConfig {
        weights,
        program: "sh".to_string(),
        script: write_script(dir, "detect.sh", detector),
        ..InferenceConfig::default()
    })
    .unwrap()
}

#[test]
fn test_missing_weights_fail_at_startup() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;

    let err = InferenceService::new(InferenceConfig {
        weights: dir.path().join("absent.pt"),
        ..InferenceConfig::default()
    })
    .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Inference);
    assert!(err.message.contains("absent.pt"));
    Ok(())
}

#[test]
fn test_predict_bytes_returns_rendered_image() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let service = service(dir.path(), FAKE_DETECTOR);

    let rendered = service.predict_bytes(&png_bytes(16, 12))?;

    let img = image::load_from_memory(&rendered)?;
    assert_eq!((img.width(), img.height()), (16, 12));
    assert!(service.weights().is_absolute());
    Ok(())
}

#[test]
fn test_predict_base64_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let service = service(dir.path(), FAKE_DETECTOR);
    let encoded = STANDARD.encode(png_bytes(8, 8));

    let rendered = service.predict_base64(&encoded)?;

    let img = image::load_from_memory(&STANDARD.decode(rendered)?)?;
    assert_eq!((img.width(), img.height()), (8, 8));
    Ok(())
}

#[test]
fn test_invalid_input_is_rejected() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let service = service(dir.path(), FAKE_DETECTOR);

    let not_base64 = service.predict_base64("%%% not base64 %%%").unwrap_err();
    assert_eq!(not_base64.kind, ErrorKind::Inference);

    let not_an_image = service.predict_bytes(b"plain text").unwrap_err();
    assert_eq!(not_an_image.kind, ErrorKind::Inference);
    Ok(())
}

#[test]
fn test_failing_detector_is_reported() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let service = service(dir.path(), "echo 'model load failed' >&2\nexit 1\n");

    let err = service.predict_bytes(&png_bytes(4, 4)).unwrap_err();

    assert_eq!(err.kind, ErrorKind::Inference);
    assert!(err.message.contains("model load failed"));
    Ok(())
}
