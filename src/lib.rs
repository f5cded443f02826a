pub mod archive;
pub mod artifacts;
pub mod components;
pub mod config;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod telemetry;

pub use artifacts::{
    DataIngestionArtifact, DataValidationArtifact, FeatureEngineeringArtifact,
    ModelTrainerArtifact, TrainingInput,
};
pub use config::PipelineConfig;
pub use error::{Error, ErrorKind, Result};
pub use inference::InferenceService;
pub use pipeline::{PipelineState, RunContext, Stage, TrainingPipeline, run_pipeline};
