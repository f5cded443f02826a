//! Stage outputs.
//!
//! An artifact is built only after all of its stage's filesystem side effects
//! have succeeded, and is the only thing handed to the next stage. Fields are
//! private so nothing downstream can alter a finished stage's record.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Downloaded archive and the directory it was extracted into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataIngestionArtifact {
    archive_path: PathBuf,
    feature_store_path: PathBuf,
}

impl DataIngestionArtifact {
    pub fn new(archive_path: PathBuf, feature_store_path: PathBuf) -> Self {
        Self {
            archive_path,
            feature_store_path,
        }
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn feature_store_path(&self) -> &Path {
        &self.feature_store_path
    }
}

/// Outcome of the feature store checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataValidationArtifact {
    validation_status: bool,
    data_status: bool,
    validated_data_path: PathBuf,
    feature_store_path: PathBuf,
    archive_path: PathBuf,
    status_file_path: PathBuf,
}

impl DataValidationArtifact {
    pub fn new(
        validation_status: bool,
        data_status: bool,
        validated_data_path: PathBuf,
        ingestion: &DataIngestionArtifact,
        status_file_path: PathBuf,
    ) -> Self {
        Self {
            validation_status,
            data_status,
            validated_data_path,
            feature_store_path: ingestion.feature_store_path().to_path_buf(),
            archive_path: ingestion.archive_path().to_path_buf(),
            status_file_path,
        }
    }

    /// Top-level entries match the required list.
    pub fn validation_status(&self) -> bool {
        self.validation_status
    }

    /// No top-level entry is empty.
    pub fn data_status(&self) -> bool {
        self.data_status
    }

    /// Both checks passed; the training gate.
    pub fn is_valid(&self) -> bool {
        self.validation_status && self.data_status
    }

    /// Directory the next stage should read images from.
    pub fn validated_data_path(&self) -> &Path {
        &self.validated_data_path
    }

    pub fn feature_store_path(&self) -> &Path {
        &self.feature_store_path
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn status_file_path(&self) -> &Path {
        &self.status_file_path
    }
}

/// Directory of resized, normalized images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureEngineeringArtifact {
    transformed_data_path: PathBuf,
    processed: usize,
    skipped: Vec<String>,
}

impl FeatureEngineeringArtifact {
    pub fn new(transformed_data_path: PathBuf, processed: usize, skipped: Vec<String>) -> Self {
        Self {
            transformed_data_path,
            processed,
            skipped,
        }
    }

    pub fn transformed_data_path(&self) -> &Path {
        &self.transformed_data_path
    }

    /// Number of images written.
    pub fn processed(&self) -> usize {
        self.processed
    }

    /// Undecodable images left out when skipping is enabled.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }
}

/// Everything the trainer needs from earlier stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainingInput {
    /// Images the model is trained on (engineered, or validated when feature
    /// engineering is skipped).
    pub dataset_path: PathBuf,
    /// Extracted dataset, holding the class descriptor.
    pub feature_store_path: PathBuf,
}

/// Location of the trained weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelTrainerArtifact {
    trained_model_path: PathBuf,
}

impl ModelTrainerArtifact {
    pub fn new(trained_model_path: PathBuf) -> Self {
        Self { trained_model_path }
    }

    pub fn trained_model_path(&self) -> &Path {
        &self.trained_model_path
    }
}
