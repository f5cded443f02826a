//! Hand-off to the external model trainer.
//!
//! The learning itself happens in a separate process. This stage prepares the
//! dataset descriptor and model definition the trainer expects, launches it
//! and checks that trained weights came out the other end.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

use crate::artifacts::{ModelTrainerArtifact, TrainingInput};
use crate::config::ModelTrainerConfig;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::pipeline::{RunContext, Stage};
use crate::telemetry::TRACING_TARGET_TRAINER;

/// Run-local directory holding everything the trainer reads and writes.
pub const TRAINER_DIR: &str = "model_trainer";

const STDERR_TAIL_LINES: usize = 20;

fn read_yaml(path: &Path) -> Result<Mapping> {
    let raw = fs::read_to_string(path)
        .with_kind(ErrorKind::Training, || format!("cannot read {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&raw)
        .with_kind(ErrorKind::Training, || format!("invalid YAML in {}", path.display()))?;
    match value {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(Error::training(format!(
            "expected a YAML mapping in {}",
            path.display()
        ))),
    }
}

fn write_yaml(path: &Path, mapping: &Mapping) -> Result<()> {
    let raw = serde_yaml::to_string(mapping)
        .with_kind(ErrorKind::Training, || format!("cannot serialize {}", path.display()))?;
    fs::write(path, raw)
        .with_kind(ErrorKind::Training, || format!("cannot write {}", path.display()))
}

/// Number of classes declared by a dataset descriptor.
///
/// Reads `nc`, falling back to the length of `names`.
pub fn class_count(descriptor: &Mapping) -> Result<u64> {
    if let Some(nc) = descriptor.get("nc") {
        return nc
            .as_u64()
            .ok_or_else(|| Error::training(format!("`nc` is not a non-negative integer: {nc:?}")));
    }
    match descriptor.get("names") {
        Some(Value::Sequence(names)) => Ok(names.len() as u64),
        Some(Value::Mapping(names)) => Ok(names.len() as u64),
        _ => Err(Error::training("dataset descriptor declares neither `nc` nor `names`")),
    }
}

/// Trains by spawning `<program> <script> ...` in a child process.
pub struct ExternalTrainer {
    config: ModelTrainerConfig,
}

impl ExternalTrainer {
    pub fn new(config: ModelTrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelTrainerConfig {
        &self.config
    }

    /// Copy the dataset descriptor into `dir`, pointing it at the dataset to train on.
    fn prepare_descriptor(&self, input: &TrainingInput, dir: &Path) -> Result<(PathBuf, u64)> {
        let source = input.feature_store_path.join(&self.config.dataset_descriptor);
        let mut descriptor = read_yaml(&source)?;
        let classes = class_count(&descriptor)?;
        descriptor.insert(
            Value::from("path"),
            Value::from(input.dataset_path.to_string_lossy().into_owned()),
        );

        let path = dir.join("data.yaml");
        write_yaml(&path, &descriptor)?;
        Ok((path, classes))
    }

    /// Write `custom_<stem>.yaml` with the dataset's class count merged in.
    fn prepare_model_config(&self, stem: &str, classes: u64, dir: &Path) -> Result<PathBuf> {
        let source = self.config.models_dir.join(format!("{stem}.yaml"));
        let mut model = read_yaml(&source)?;
        model.insert(Value::from("nc"), Value::from(classes));

        let path = dir.join(format!("custom_{stem}.yaml"));
        write_yaml(&path, &model)?;
        Ok(path)
    }

    fn command(&self, data: &Path, cfg: &Path, project: &Path) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .arg(&self.config.script)
            .arg("--img")
            .arg(self.config.image_size.to_string())
            .arg("--batch")
            .arg(self.config.batch_size.to_string())
            .arg("--epochs")
            .arg(self.config.epochs.to_string())
            .arg("--data")
            .arg(data)
            .arg("--cfg")
            .arg(cfg)
            .arg("--weights")
            .arg(self.config.weights_dir.join(&self.config.model_weight_name))
            .arg("--project")
            .arg(project);
        command
    }
}

impl Stage for ExternalTrainer {
    type Input = TrainingInput;
    type Output = ModelTrainerArtifact;

    fn name(&self) -> &str {
        "Model Trainer"
    }

    fn run(&self, input: &TrainingInput, context: &RunContext) -> Result<ModelTrainerArtifact> {
        let stem = self
            .config
            .model_stem()
            .map_err(|err| Error::training(err.message))?;
        let dir = context.root().join(TRAINER_DIR);
        fs::create_dir_all(&dir).with_kind(ErrorKind::Training, || {
            format!("cannot create trainer directory {}", dir.display())
        })?;

        let (data, classes) = self.prepare_descriptor(input, &dir)?;
        let cfg = self.prepare_model_config(stem, classes, &dir)?;
        let project = dir.join("runs");

        let mut command = self.command(&data, &cfg, &project);
        info!(
            target: TRACING_TARGET_TRAINER,
            program = %self.config.program,
            script = %self.config.script.display(),
            classes,
            batch_size = self.config.batch_size,
            epochs = self.config.epochs,
            "starting external trainer"
        );

        let output = command.output().with_kind(ErrorKind::Training, || {
            format!("cannot launch trainer {:?}", self.config.program)
        })?;
        debug!(
            target: TRACING_TARGET_TRAINER,
            stdout = %String::from_utf8_lossy(&output.stdout),
            "trainer output"
        );
        if !output.status.success() {
            return Err(Error::training(format!(
                "trainer exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        let trained_model = project.join(&self.config.trained_model_path);
        if !trained_model.is_file() {
            return Err(Error::training(format!(
                "trainer finished without producing {}",
                trained_model.display()
            )));
        }

        info!(
            target: TRACING_TARGET_TRAINER,
            model = %trained_model.display(),
            "model training completed"
        );
        Ok(ModelTrainerArtifact::new(trained_model))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
