#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from platewatch for tests
pub use platewatch::components::{
    DataIngestion, DataSource, DataValidation, ExternalTrainer, FeatureEngineering,
    check_entries_with_policy, check_non_empty, check_required_entries,
};
pub use platewatch::config::{
    DataIngestionConfig, DataValidationConfig, EntryPolicy, FeatureEngineeringConfig,
    InferenceConfig, ModelTrainerConfig, PipelineConfig,
};
pub use platewatch::{
    DataIngestionArtifact, DataValidationArtifact, ErrorKind, PipelineState, RunContext, Stage,
    TrainingInput, TrainingPipeline,
};
