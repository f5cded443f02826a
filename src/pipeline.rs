use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{error, info};
use uuid::Uuid;

use crate::artifacts::{
    DataIngestionArtifact, DataValidationArtifact, FeatureEngineeringArtifact,
    ModelTrainerArtifact, TrainingInput,
};
use crate::components::{DataIngestion, DataValidation, ExternalTrainer, FeatureEngineering};
use crate::config::PipelineConfig;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::telemetry::TRACING_TARGET_PIPELINE;

/// Name of the summary written into the run directory after a successful run.
pub const RUN_SUMMARY_FILE_NAME: &str = "run.yaml";

/// Per-run working directory shared by all stages.
///
/// Relative paths from the configuration resolve under `root`, so concurrent
/// runs with distinct run ids never touch the same files.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    root: PathBuf,
}

impl RunContext {
    /// Create the run directory `<artifacts_dir>/<run_id>`.
    pub fn new(artifacts_dir: &Path, run_id: Option<&str>) -> Result<Self> {
        let run_id = match run_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            Some(_) => return Err(Error::config("run id must not be blank")),
            None => generate_run_id()?,
        };
        let root = artifacts_dir.join(&run_id);
        fs::create_dir_all(&root).with_kind(ErrorKind::Config, || {
            format!("cannot create run directory {}", root.display())
        })?;
        Ok(Self { run_id, root })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a configured path against the run directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

fn generate_run_id() -> Result<String> {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]T[hour][minute][second]"))
        .with_kind(ErrorKind::Config, || "cannot format run timestamp")?;
    let suffix = Uuid::new_v4().simple().to_string();
    Ok(format!("{stamp}_{}", &suffix[..8]))
}

/// One step of the training pipeline.
///
/// A stage consumes the previous stage's artifact and either produces its own
/// artifact or fails; it never hands on partial results.
pub trait Stage {
    type Input;
    type Output;

    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    fn run(&self, input: &Self::Input, context: &RunContext) -> Result<Self::Output>;
}

/// Position of a run in the stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Ingest,
    Validate,
    FeatureEngineer,
    Train,
    Done,
    Failed,
}

/// Artifacts of a completed run, written to the run directory as YAML.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub ingestion: DataIngestionArtifact,
    pub validation: DataValidationArtifact,
    pub features: Option<FeatureEngineeringArtifact>,
    pub model: ModelTrainerArtifact,
}

/// Runs ingestion, validation, feature engineering and training in order.
///
/// Training only starts when both validation checks pass. The trainer is a
/// type parameter so callers can substitute their own implementation.
pub struct TrainingPipeline<T = ExternalTrainer> {
    config: PipelineConfig,
    trainer: T,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl TrainingPipeline<ExternalTrainer> {
    /// Pipeline driving the configured external trainer.
    pub fn new(config: PipelineConfig) -> Self {
        let trainer = ExternalTrainer::new(config.trainer.clone());
        Self::with_trainer(config, trainer)
    }
}

impl<T> TrainingPipeline<T>
where
    T: Stage<Input = TrainingInput, Output = ModelTrainerArtifact>,
{
    pub fn with_trainer(config: PipelineConfig, trainer: T) -> Self {
        Self {
            config,
            trainer,
            state: PipelineState::Pending,
            history: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn trainer(&self) -> &T {
        &self.trainer
    }

    /// Current state; `Done` or `Failed` once `run_pipeline` returned.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// States entered during the last run, in order.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Run every stage and return the trained model artifact.
    pub fn run_pipeline(&mut self) -> Result<ModelTrainerArtifact> {
        self.history.clear();
        self.state = PipelineState::Pending;

        match self.run_stages() {
            Ok(summary) => {
                self.enter(PipelineState::Done);
                info!(
                    target: TRACING_TARGET_PIPELINE,
                    run_id = %summary.run_id,
                    model = %summary.model.trained_model_path().display(),
                    "training pipeline completed"
                );
                Ok(summary.model)
            }
            Err(err) => {
                let failed_in = self.state;
                self.enter(PipelineState::Failed);
                error!(
                    target: TRACING_TARGET_PIPELINE,
                    stage = ?failed_in,
                    error = %err,
                    "training pipeline failed"
                );
                Err(err)
            }
        }
    }

    fn run_stages(&mut self) -> Result<RunSummary> {
        self.config.validate()?;
        let context = RunContext::new(&self.config.artifacts_dir, self.config.run_id.as_deref())?;
        info!(
            target: TRACING_TARGET_PIPELINE,
            run_id = %context.run_id(),
            root = %context.root().display(),
            "starting training pipeline"
        );

        let ingestion_stage = DataIngestion::new(self.config.ingestion.clone());
        self.begin(PipelineState::Ingest, ingestion_stage.name());
        let ingestion = ingestion_stage.run(&(), &context)?;

        let validation_stage = DataValidation::new(self.config.validation.clone());
        self.begin(PipelineState::Validate, validation_stage.name());
        let validation = validation_stage.run(&ingestion, &context)?;
        if !validation.is_valid() {
            return Err(Error::validation(format!(
                "data is not valid (validation_status={}, data_status={})",
                validation.validation_status(),
                validation.data_status()
            )));
        }

        let features = if self.config.skip_feature_engineering {
            None
        } else {
            let features_stage = FeatureEngineering::new(self.config.features.clone());
            self.begin(PipelineState::FeatureEngineer, features_stage.name());
            Some(features_stage.run(&validation, &context)?)
        };

        let dataset_path = match &features {
            Some(artifact) => artifact.transformed_data_path().to_path_buf(),
            None => validation.validated_data_path().to_path_buf(),
        };
        let input = TrainingInput {
            dataset_path,
            feature_store_path: validation.feature_store_path().to_path_buf(),
        };

        let trainer_name = self.trainer.name().to_string();
        self.begin(PipelineState::Train, &trainer_name);
        let model = self.trainer.run(&input, &context)?;

        let summary = RunSummary {
            run_id: context.run_id().to_string(),
            ingestion,
            validation,
            features,
            model,
        };
        write_summary(&summary, &context)?;
        Ok(summary)
    }

    /// Enter `state` and announce the stage about to run in it.
    fn begin(&mut self, state: PipelineState, stage: &str) {
        self.enter(state);
        info!(target: TRACING_TARGET_PIPELINE, stage, "running stage");
    }

    fn enter(&mut self, state: PipelineState) {
        info!(target: TRACING_TARGET_PIPELINE, from = ?self.state, to = ?state, "stage transition");
        self.state = state;
        self.history.push(state);
    }
}

fn write_summary(summary: &RunSummary, context: &RunContext) -> Result<()> {
    let path = context.root().join(RUN_SUMMARY_FILE_NAME);
    let yaml = serde_yaml::to_string(summary)
        .with_kind(ErrorKind::Training, || "cannot serialize run summary")?;
    fs::write(&path, yaml).with_kind(ErrorKind::Training, || {
        format!("cannot write run summary {}", path.display())
    })
}

/// Run the default pipeline with the given configuration.
///
/// This is the single entry point offered to outer layers such as an HTTP
/// `/train` handler.
pub fn run_pipeline(config: PipelineConfig) -> Result<ModelTrainerArtifact> {
    TrainingPipeline::new(config).run_pipeline()
}
