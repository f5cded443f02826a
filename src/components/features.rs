use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageReader, Rgb32FImage};
use tracing::{debug, info, warn};

use crate::artifacts::{DataValidationArtifact, FeatureEngineeringArtifact};
use crate::config::FeatureEngineeringConfig;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::pipeline::{RunContext, Stage};
use crate::telemetry::TRACING_TARGET_FEATURES;

/// Resize to exactly `width`x`height`.
pub fn resize(img: &DynamicImage, width: u32, height: u32) -> Rgb32FImage {
    imageops::resize(&img.to_rgb32f(), width, height, FilterType::Triangle)
}

/// Clamp every channel into the unit range.
pub fn normalize(mut img: Rgb32FImage) -> Rgb32FImage {
    for pixel in img.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = channel.clamp(0.0, 1.0);
        }
    }
    img
}

/// Decode, resize, normalize and re-encode one image.
pub fn transform_file(
    source: &Path,
    destination: &Path,
    format: ImageFormat,
    width: u32,
    height: u32,
) -> Result<()> {
    let img = ImageReader::open(source)
        .with_kind(ErrorKind::FeatureEngineering, || {
            format!("cannot open image {}", source.display())
        })?
        .with_guessed_format()
        .with_kind(ErrorKind::FeatureEngineering, || {
            format!("cannot read image {}", source.display())
        })?
        .decode()
        .with_kind(ErrorKind::FeatureEngineering, || {
            format!("cannot decode image {}", source.display())
        })?;

    let normalized = normalize(resize(&img, width, height));
    // Encoders take 8-bit samples; the unit range maps back onto 0..=255.
    let encoded = DynamicImage::ImageRgb32F(normalized).to_rgb8();
    encoded
        .save_with_format(destination, format)
        .with_kind(ErrorKind::FeatureEngineering, || {
            format!("cannot write image {}", destination.display())
        })
}

/// Resizes and normalizes every image under the validated data path.
///
/// The directory tree is mirrored into the output directory: images are
/// transformed in place, every other file (labels, dataset descriptors) is
/// copied unchanged, so relative paths inside the dataset keep resolving.
pub struct FeatureEngineering {
    config: FeatureEngineeringConfig,
}

impl FeatureEngineering {
    pub fn new(config: FeatureEngineeringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureEngineeringConfig {
        &self.config
    }

    /// Transform the dataset under `data_path` into the configured output directory.
    ///
    /// Fails when no image could be written.
    pub fn transform_dir(
        &self,
        data_path: &Path,
        context: &RunContext,
    ) -> Result<FeatureEngineeringArtifact> {
        let output_dir = context.resolve(&self.config.transformed_dir);
        fs::create_dir_all(&output_dir).with_kind(ErrorKind::FeatureEngineering, || {
            format!("cannot create output directory {}", output_dir.display())
        })?;

        info!(
            target: TRACING_TARGET_FEATURES,
            source = %data_path.display(),
            output = %output_dir.display(),
            width = self.config.width,
            height = self.config.height,
            "starting feature engineering"
        );

        let mut processed = 0;
        let mut copied = 0;
        let mut skipped = Vec::new();
        for entry in dataset_files(data_path)? {
            let source = data_path.join(&entry);
            let destination = output_dir.join(&entry);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).with_kind(ErrorKind::FeatureEngineering, || {
                    format!("cannot create output directory {}", parent.display())
                })?;
            }

            let Ok(format) = ImageFormat::from_path(&source) else {
                fs::copy(&source, &destination).with_kind(ErrorKind::FeatureEngineering, || {
                    format!("cannot copy {}", source.display())
                })?;
                debug!(
                    target: TRACING_TARGET_FEATURES,
                    file = %entry.display(),
                    "copied unchanged"
                );
                copied += 1;
                continue;
            };

            let (width, height) = (self.config.width, self.config.height);
            match transform_file(&source, &destination, format, width, height) {
                Ok(()) => processed += 1,
                Err(err) if self.config.skip_invalid => {
                    warn!(
                        target: TRACING_TARGET_FEATURES,
                        file = %source.display(),
                        error = %err,
                        "skipping image"
                    );
                    skipped.push(entry.to_string_lossy().into_owned());
                }
                Err(err) => return Err(err),
            }
        }

        if processed == 0 {
            return Err(Error::feature_engineering(format!(
                "no images found under {}",
                data_path.display()
            )));
        }

        info!(
            target: TRACING_TARGET_FEATURES,
            processed,
            copied,
            skipped = skipped.len(),
            output = %output_dir.display(),
            "feature engineering completed"
        );
        Ok(FeatureEngineeringArtifact::new(output_dir, processed, skipped))
    }
}

impl Stage for FeatureEngineering {
    type Input = DataValidationArtifact;
    type Output = FeatureEngineeringArtifact;

    fn name(&self) -> &str {
        "Feature Engineering"
    }

    fn run(
        &self,
        input: &DataValidationArtifact,
        context: &RunContext,
    ) -> Result<FeatureEngineeringArtifact> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(Error::feature_engineering(format!(
                "target size must be positive, got {}x{}",
                self.config.width, self.config.height
            )));
        }
        self.transform_dir(input.validated_data_path(), context)
    }
}

/// Regular files anywhere under `root`, relative to it and sorted.
fn dataset_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![PathBuf::new()];
    while let Some(relative) = pending.pop() {
        let dir = root.join(&relative);
        let entries = fs::read_dir(&dir).with_kind(ErrorKind::FeatureEngineering, || {
            format!("cannot list validated data {}", dir.display())
        })?;
        for entry in entries {
            let entry = entry.with_kind(ErrorKind::FeatureEngineering, || {
                format!("cannot read entry of {}", dir.display())
            })?;
            let path = relative.join(entry.file_name());
            let file_type = entry.file_type().with_kind(ErrorKind::FeatureEngineering, || {
                format!("cannot stat {}", root.join(&path).display())
            })?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
