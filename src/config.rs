//! Pipeline configuration.
//!
//! ```text
//! PipelineConfig
//! ├── ingestion: DataIngestionConfig        # source URL, archive location
//! ├── validation: DataValidationConfig      # required entries, status file
//! ├── features: FeatureEngineeringConfig    # target image size
//! └── trainer: ModelTrainerConfig           # external trainer invocation
//! ```
//!
//! Every option can be given as a CLI flag or an environment variable. Relative
//! paths are resolved under the per-run directory `<artifacts_dir>/<run_id>`,
//! absolute paths are used as given. Configuration is built once per run and
//! never mutated afterwards.

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_SOURCE_URL: &str =
    "https://drive.google.com/file/d/1ECUyJb7tUfM4Sl7Z0sl8ib7pwMC3pZkv/view?usp=sharing";
pub const DEFAULT_ARCHIVE_FILE_NAME: &str = "data.zip";
pub const DEFAULT_REQUIRED_ENTRIES: [&str; 3] = ["train", "valid", "data.yaml"];

/// Complete configuration of one training run.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory holding one sub-directory per run.
    #[arg(long, env = "PLATEWATCH_ARTIFACTS_DIR", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Name of the run directory. Generated from the clock and a random suffix when absent.
    #[arg(long, env = "PLATEWATCH_RUN_ID")]
    pub run_id: Option<String>,

    /// Hand the validated data straight to the trainer.
    #[arg(long, env = "PLATEWATCH_SKIP_FEATURE_ENGINEERING")]
    #[serde(default)]
    pub skip_feature_engineering: bool,

    #[clap(flatten)]
    pub ingestion: DataIngestionConfig,

    #[clap(flatten)]
    pub validation: DataValidationConfig,

    #[clap(flatten)]
    pub features: FeatureEngineeringConfig,

    #[clap(flatten)]
    pub trainer: ModelTrainerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            run_id: None,
            skip_feature_engineering: false,
            ingestion: DataIngestionConfig::default(),
            validation: DataValidationConfig::default(),
            features: FeatureEngineeringConfig::default(),
            trainer: ModelTrainerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject configurations no stage could run with.
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.source_url.trim().is_empty() {
            return Err(Error::config("source URL must not be empty"));
        }
        if self.ingestion.archive_file_name.as_os_str().is_empty() {
            return Err(Error::config("archive file name must not be empty"));
        }
        if self.validation.required_entries.is_empty() {
            return Err(Error::config("required entry list must not be empty"));
        }
        if self.features.width == 0 || self.features.height == 0 {
            return Err(Error::config(format!(
                "feature dimensions must be positive, got {}x{}",
                self.features.width, self.features.height
            )));
        }
        if self.trainer.batch_size == 0 {
            return Err(Error::config("batch size must be positive"));
        }
        if self.trainer.epochs == 0 {
            return Err(Error::config("epoch count must be positive"));
        }
        self.trainer.model_stem()?;
        Ok(())
    }
}

/// Where the dataset comes from and where it lands.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct DataIngestionConfig {
    /// Dataset archive location: http(s) URL, Google Drive share link, file:// URL or local path.
    #[arg(long = "source-url", env = "PLATEWATCH_SOURCE_URL", default_value = DEFAULT_SOURCE_URL)]
    pub source_url: String,

    /// Directory receiving the downloaded archive.
    #[arg(long, env = "PLATEWATCH_INGESTION_DIR", default_value = "data_ingestion")]
    pub data_ingestion_dir: PathBuf,

    /// Directory the archive is extracted into, relative to the ingestion directory.
    #[arg(long, env = "PLATEWATCH_FEATURE_STORE_DIR", default_value = "feature_store")]
    pub feature_store_dir: PathBuf,

    /// File name of the downloaded archive.
    #[arg(long, env = "PLATEWATCH_ARCHIVE_FILE_NAME", default_value = DEFAULT_ARCHIVE_FILE_NAME)]
    pub archive_file_name: PathBuf,
}

impl Default for DataIngestionConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            data_ingestion_dir: PathBuf::from("data_ingestion"),
            feature_store_dir: PathBuf::from("feature_store"),
            archive_file_name: PathBuf::from(DEFAULT_ARCHIVE_FILE_NAME),
        }
    }
}

/// How top-level feature store entries are matched against the required list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPolicy {
    /// Every entry present must be in the required list.
    #[default]
    Subset,
    /// Entries present and the required list must be the same set.
    Exact,
}

/// Expected shape of the extracted dataset.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct DataValidationConfig {
    /// Directory receiving the validation status file.
    #[arg(long, env = "PLATEWATCH_VALIDATION_DIR", default_value = "data_validation")]
    pub data_validation_dir: PathBuf,

    /// Name of the validation status file.
    #[arg(long, env = "PLATEWATCH_STATUS_FILE_NAME", default_value = "status.txt")]
    pub status_file_name: PathBuf,

    /// Names allowed at the top level of the feature store.
    #[arg(
        long = "required-entry",
        env = "PLATEWATCH_REQUIRED_ENTRIES",
        value_delimiter = ',',
        default_values_t = DEFAULT_REQUIRED_ENTRIES.map(String::from)
    )]
    pub required_entries: Vec<String>,

    /// Matching policy for the required list.
    #[arg(long, env = "PLATEWATCH_ENTRY_POLICY", value_enum, default_value_t = EntryPolicy::Subset)]
    #[serde(default)]
    pub entry_policy: EntryPolicy,

    /// Sub-directory of the feature store holding the images to engineer.
    #[arg(long, env = "PLATEWATCH_IMAGES_SUBDIR")]
    pub images_subdir: Option<PathBuf>,
}

impl Default for DataValidationConfig {
    fn default() -> Self {
        Self {
            data_validation_dir: PathBuf::from("data_validation"),
            status_file_name: PathBuf::from("status.txt"),
            required_entries: DEFAULT_REQUIRED_ENTRIES.map(String::from).to_vec(),
            entry_policy: EntryPolicy::Subset,
            images_subdir: None,
        }
    }
}

/// Image preprocessing parameters.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct FeatureEngineeringConfig {
    /// Output directory for transformed images.
    #[arg(long, env = "PLATEWATCH_TRANSFORMED_DIR", default_value = "transformed_data")]
    pub transformed_dir: PathBuf,

    /// Target width in pixels.
    #[arg(long, env = "PLATEWATCH_FEATURE_WIDTH", default_value_t = 416)]
    pub width: u32,

    /// Target height in pixels.
    #[arg(long, env = "PLATEWATCH_FEATURE_HEIGHT", default_value_t = 416)]
    pub height: u32,

    /// Log and skip undecodable images instead of aborting the stage.
    #[arg(long, env = "PLATEWATCH_SKIP_INVALID_IMAGES")]
    #[serde(default)]
    pub skip_invalid: bool,
}

impl Default for FeatureEngineeringConfig {
    fn default() -> Self {
        Self {
            transformed_dir: PathBuf::from("transformed_data"),
            width: 416,
            height: 416,
            skip_invalid: false,
        }
    }
}

/// External trainer invocation.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct ModelTrainerConfig {
    /// Interpreter or executable running the training script.
    #[arg(
        long = "trainer-program",
        env = "PLATEWATCH_TRAINER_PROGRAM",
        default_value = "python"
    )]
    pub program: String,

    /// Training script handed to the program.
    #[arg(
        long = "trainer-script",
        env = "PLATEWATCH_TRAINER_SCRIPT",
        default_value = "yolov8/train.py"
    )]
    pub script: PathBuf,

    /// Directory holding `<weight stem>.yaml` model definitions.
    #[arg(long, env = "PLATEWATCH_MODELS_DIR", default_value = "yolov8/models")]
    pub models_dir: PathBuf,

    /// Directory holding pretrained weights.
    #[arg(long, env = "PLATEWATCH_WEIGHTS_DIR", default_value = "yolov8/weights")]
    pub weights_dir: PathBuf,

    /// Pretrained weight file name; its stem selects the model definition.
    #[arg(long, env = "PLATEWATCH_MODEL_WEIGHT_NAME", default_value = "yolov8s.pt")]
    pub model_weight_name: String,

    /// Dataset descriptor inside the feature store carrying the class count `nc`.
    #[arg(long, env = "PLATEWATCH_DATASET_DESCRIPTOR", default_value = "data.yaml")]
    pub dataset_descriptor: PathBuf,

    /// Square training image size.
    #[arg(long, env = "PLATEWATCH_TRAIN_IMAGE_SIZE", default_value_t = 416)]
    pub image_size: u32,

    #[arg(long, env = "PLATEWATCH_BATCH_SIZE", default_value_t = 16)]
    pub batch_size: u32,

    #[arg(long, env = "PLATEWATCH_EPOCHS", default_value_t = 1)]
    pub epochs: u32,

    /// Location of the trained weights relative to the trainer's project directory.
    #[arg(long, env = "PLATEWATCH_TRAINED_MODEL_PATH", default_value = "exp/weights/best.pt")]
    pub trained_model_path: PathBuf,
}

impl Default for ModelTrainerConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            script: PathBuf::from("yolov8/train.py"),
            models_dir: PathBuf::from("yolov8/models"),
            weights_dir: PathBuf::from("yolov8/weights"),
            model_weight_name: "yolov8s.pt".to_string(),
            dataset_descriptor: PathBuf::from("data.yaml"),
            image_size: 416,
            batch_size: 16,
            epochs: 1,
            trained_model_path: PathBuf::from("exp/weights/best.pt"),
        }
    }
}

impl ModelTrainerConfig {
    /// Model definition name derived from the weight file, e.g. `yolov8s`.
    pub fn model_stem(&self) -> Result<&str> {
        Path::new(&self.model_weight_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "model weight name has no usable stem: {:?}",
                    self.model_weight_name
                ))
            })
    }
}

/// External detector used by the inference service.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Trained weights loaded by the detector.
    #[arg(long, env = "PLATEWATCH_WEIGHTS", default_value = "yolov8/my_model.pt")]
    pub weights: PathBuf,

    /// Interpreter or executable running the detection script.
    #[arg(long = "detector-program", env = "PLATEWATCH_DETECTOR_PROGRAM", default_value = "python")]
    pub program: String,

    /// Detection script handed to the program.
    #[arg(
        long = "detector-script",
        env = "PLATEWATCH_DETECTOR_SCRIPT",
        default_value = "yolov8/detect.py"
    )]
    pub script: PathBuf,

    #[arg(long = "detect-image-size", env = "PLATEWATCH_DETECT_IMAGE_SIZE", default_value_t = 416)]
    pub image_size: u32,

    /// Minimum detection confidence.
    #[arg(long, env = "PLATEWATCH_CONFIDENCE", default_value_t = 0.5)]
    pub confidence: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("yolov8/my_model.pt"),
            program: "python".to_string(),
            script: PathBuf::from("yolov8/detect.py"),
            image_size: 416,
            confidence: 0.5,
        }
    }
}
