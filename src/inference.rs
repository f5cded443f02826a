//! Plate detection on single images through the external detector.
//!
//! [`InferenceService`] owns the model for its whole lifetime: build it once
//! and share it by reference with whoever serves predictions.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::config::InferenceConfig;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::telemetry::TRACING_TARGET_INFERENCE;

const INPUT_FILE_NAME: &str = "input.jpg";
const OUTPUT_RUN_NAME: &str = "predict";

#[derive(Debug)]
pub struct InferenceService {
    config: InferenceConfig,
    weights: PathBuf,
}

impl InferenceService {
    /// Fails when the configured weights do not exist.
    pub fn new(config: InferenceConfig) -> Result<Self> {
        let weights = fs::canonicalize(&config.weights).with_kind(ErrorKind::Inference, || {
            format!("model weights not found: {}", config.weights.display())
        })?;
        if !weights.is_file() {
            return Err(Error::inference(format!(
                "model weights are not a file: {}",
                weights.display()
            )));
        }
        info!(
            target: TRACING_TARGET_INFERENCE,
            weights = %weights.display(),
            "inference service ready"
        );
        Ok(Self { config, weights })
    }

    pub fn weights(&self) -> &Path {
        &self.weights
    }

    /// Run detection on an encoded image and return the annotated image, JPEG encoded.
    pub fn predict_bytes(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let img = image::load_from_memory(image_bytes)
            .with_kind(ErrorKind::Inference, || "input is not a decodable image")?;

        let workdir = TempDir::new()
            .with_kind(ErrorKind::Inference, || "cannot create scratch directory")?;
        let input = workdir.path().join(INPUT_FILE_NAME);
        img.to_rgb8()
            .save_with_format(&input, ImageFormat::Jpeg)
            .with_kind(ErrorKind::Inference, || "cannot stage input image")?;

        let project = workdir.path().join("runs");
        let output = Command::new(&self.config.program)
            .arg(&self.config.script)
            .arg("--weights")
            .arg(&self.weights)
            .arg("--img")
            .arg(self.config.image_size.to_string())
            .arg("--conf")
            .arg(self.config.confidence.to_string())
            .arg("--source")
            .arg(&input)
            .arg("--project")
            .arg(&project)
            .arg("--name")
            .arg(OUTPUT_RUN_NAME)
            .output()
            .with_kind(ErrorKind::Inference, || {
                format!("cannot launch detector {:?}", self.config.program)
            })?;
        if !output.status.success() {
            return Err(Error::inference(format!(
                "detector exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let rendered = project.join(OUTPUT_RUN_NAME).join(INPUT_FILE_NAME);
        let bytes = fs::read(&rendered).with_kind(ErrorKind::Inference, || {
            format!("detector produced no output at {}", rendered.display())
        })?;
        debug!(target: TRACING_TARGET_INFERENCE, bytes = bytes.len(), "prediction rendered");
        Ok(bytes)
    }

    /// Base64 in, base64 out; the shape an HTTP `/predict` handler exchanges.
    pub fn predict_base64(&self, encoded: &str) -> Result<String> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .with_kind(ErrorKind::Inference, || "input is not valid base64")?;
        let rendered = self.predict_bytes(&bytes)?;
        Ok(STANDARD.encode(rendered))
    }
}
