use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::artifacts::{DataIngestionArtifact, DataValidationArtifact};
use crate::config::{DataValidationConfig, EntryPolicy};
use crate::error::{ErrorKind, Result, ResultExt};
use crate::pipeline::{RunContext, Stage};
use crate::telemetry::TRACING_TARGET_VALIDATION;

/// Names of the top-level entries of `dir`, sorted.
pub fn list_entries(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).with_kind(ErrorKind::Validation, || {
        format!("cannot list feature store {}", dir.display())
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_kind(ErrorKind::Validation, || {
            format!("cannot read entry of {}", dir.display())
        })?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Every top-level entry of the feature store appears in `required`.
pub fn check_required_entries(feature_store: &Path, required: &[String]) -> Result<bool> {
    check_entries_with_policy(feature_store, required, EntryPolicy::Subset)
}

/// Match the top-level entries of the feature store against `required`.
///
/// An empty feature store never matches.
pub fn check_entries_with_policy(
    feature_store: &Path,
    required: &[String],
    policy: EntryPolicy,
) -> Result<bool> {
    let present = list_entries(feature_store)?;
    if present.is_empty() {
        warn!(
            target: TRACING_TARGET_VALIDATION,
            feature_store = %feature_store.display(),
            "feature store is empty"
        );
        return Ok(false);
    }

    let required: BTreeSet<&str> = required.iter().map(String::as_str).collect();
    let unexpected: Vec<&str> = present
        .iter()
        .map(String::as_str)
        .filter(|name| !required.contains(name))
        .collect();
    let missing: Vec<&str> = match policy {
        EntryPolicy::Subset => Vec::new(),
        EntryPolicy::Exact => {
            let present: BTreeSet<&str> = present.iter().map(String::as_str).collect();
            required.difference(&present).copied().collect()
        }
    };

    let status = unexpected.is_empty() && missing.is_empty();
    debug!(
        target: TRACING_TARGET_VALIDATION,
        ?policy,
        ?unexpected,
        ?missing,
        status,
        "required entry check"
    );
    Ok(status)
}

/// Every top-level entry of the feature store has real contents.
///
/// A directory needs at least two sub-entries, one of which holds data; a
/// regular file needs a nonzero size. An empty feature store fails.
pub fn check_non_empty(feature_store: &Path) -> Result<bool> {
    let entries = list_entries(feature_store)?;
    if entries.is_empty() {
        info!(target: TRACING_TARGET_VALIDATION, "the feature store has zero contents");
        return Ok(false);
    }

    let mut status = true;
    for name in &entries {
        let path = feature_store.join(name);
        if entry_has_contents(&path)? {
            debug!(target: TRACING_TARGET_VALIDATION, entry = %name, "entry is not empty");
        } else {
            info!(target: TRACING_TARGET_VALIDATION, entry = %name, "entry is empty");
            status = false;
        }
    }
    Ok(status)
}

fn entry_has_contents(path: &Path) -> Result<bool> {
    let metadata = fs::metadata(path)
        .with_kind(ErrorKind::Validation, || format!("cannot stat {}", path.display()))?;
    if !metadata.is_dir() {
        return Ok(metadata.len() > 0);
    }

    let children = list_entries(path)?;
    if children.len() <= 1 {
        return Ok(false);
    }
    for child in &children {
        if content_size(&path.join(child))? > 0 {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Bytes stored under `path`, following directories.
fn content_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path)
        .with_kind(ErrorKind::Validation, || format!("cannot stat {}", path.display()))?;
    if !metadata.is_dir() {
        return Ok(metadata.len());
    }

    let mut total = 0u64;
    for child in list_entries(path)? {
        total = total.saturating_add(content_size(&path.join(child))?);
    }
    Ok(total)
}

/// Checks the extracted dataset and records the outcome in a status file.
pub struct DataValidation {
    config: DataValidationConfig,
}

impl DataValidation {
    pub fn new(config: DataValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DataValidationConfig {
        &self.config
    }

    fn write_status(
        &self,
        context: &RunContext,
        validation_status: bool,
        data_status: bool,
    ) -> Result<PathBuf> {
        let dir = context.resolve(&self.config.data_validation_dir);
        fs::create_dir_all(&dir).with_kind(ErrorKind::Validation, || {
            format!("cannot create validation directory {}", dir.display())
        })?;
        let path = dir.join(&self.config.status_file_name);
        let contents =
            format!("Validation Status: {validation_status}\nData Status: {data_status}\n");
        fs::write(&path, contents).with_kind(ErrorKind::Validation, || {
            format!("cannot write validation status {}", path.display())
        })?;
        Ok(path)
    }
}

impl Stage for DataValidation {
    type Input = DataIngestionArtifact;
    type Output = DataValidationArtifact;

    fn name(&self) -> &str {
        "Data Validation"
    }

    fn run(
        &self,
        input: &DataIngestionArtifact,
        context: &RunContext,
    ) -> Result<DataValidationArtifact> {
        let feature_store = input.feature_store_path();
        let validation_status = check_entries_with_policy(
            feature_store,
            &self.config.required_entries,
            self.config.entry_policy,
        )?;
        let data_status = check_non_empty(feature_store)?;
        let status_file = self.write_status(context, validation_status, data_status)?;

        let validated_data_path = match &self.config.images_subdir {
            Some(subdir) => feature_store.join(subdir),
            None => feature_store.to_path_buf(),
        };

        info!(
            target: TRACING_TARGET_VALIDATION,
            validation_status,
            data_status,
            status_file = %status_file.display(),
            "validation finished"
        );

        Ok(DataValidationArtifact::new(
            validation_status,
            data_status,
            validated_data_path,
            input,
            status_file,
        ))
    }
}
