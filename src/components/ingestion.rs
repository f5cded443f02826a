use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::archive::{self, ArchiveFormat};
use crate::artifacts::DataIngestionArtifact;
use crate::config::DataIngestionConfig;
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::pipeline::{RunContext, Stage};
use crate::telemetry::TRACING_TARGET_INGESTION;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a dataset archive is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Fetched over HTTP(S).
    Remote(String),
    /// Copied from the local filesystem.
    Local(PathBuf),
}

impl DataSource {
    /// Interpret a configured source identifier.
    ///
    /// Google Drive share links (`.../file/d/<id>/view`) are rewritten to
    /// their direct-download form.
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(Error::ingestion("source identifier is empty"));
        }

        if let Some(path) = source.strip_prefix("file://") {
            return Ok(DataSource::Local(PathBuf::from(path)));
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            if let Some(id) = google_drive_file_id(source) {
                return Ok(DataSource::Remote(format!(
                    "https://drive.google.com/uc?export=download&confirm=t&id={id}"
                )));
            }
            return Ok(DataSource::Remote(source.to_string()));
        }

        if source.contains("://") {
            return Err(Error::ingestion(format!("unsupported source scheme: {source}")));
        }

        Ok(DataSource::Local(PathBuf::from(source)))
    }
}

fn google_drive_file_id(url: &str) -> Option<&str> {
    if !url.contains("drive.google.com") {
        return None;
    }
    let (_, rest) = url.split_once("/file/d/")?;
    let id = rest.split(['/', '?', '#']).next()?;
    (!id.is_empty()).then_some(id)
}

/// Fetches the dataset archive and extracts it into the feature store.
pub struct DataIngestion {
    config: DataIngestionConfig,
}

impl DataIngestion {
    pub fn new(config: DataIngestionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DataIngestionConfig {
        &self.config
    }

    /// Download (or copy) the archive to `<ingestion_dir>/<archive_file_name>`.
    ///
    /// The archive only appears at its final path once it has been fully
    /// written and recognised as a supported format.
    pub fn fetch(&self, context: &RunContext) -> Result<PathBuf> {
        let source = DataSource::parse(&self.config.source_url)?;
        let ingestion_dir = context.resolve(&self.config.data_ingestion_dir);
        fs::create_dir_all(&ingestion_dir).with_kind(ErrorKind::Ingestion, || {
            format!("cannot create ingestion directory {}", ingestion_dir.display())
        })?;
        let archive_path = ingestion_dir.join(&self.config.archive_file_name);

        info!(
            target: TRACING_TARGET_INGESTION,
            source = ?source,
            archive = %archive_path.display(),
            "fetching dataset archive"
        );

        let mut staging = NamedTempFile::new_in(&ingestion_dir).with_kind(ErrorKind::Ingestion, || {
            format!("cannot create staging file in {}", ingestion_dir.display())
        })?;
        let bytes = match &source {
            DataSource::Remote(url) => download(url, staging.as_file_mut())?,
            DataSource::Local(path) => copy_local(path, staging.as_file_mut())?,
        };
        staging
            .as_file_mut()
            .flush()
            .with_kind(ErrorKind::Ingestion, || "cannot flush downloaded archive")?;

        let format = ArchiveFormat::detect(staging.path())?;
        staging
            .persist(&archive_path)
            .map_err(|err| err.error)
            .with_kind(ErrorKind::Ingestion, || {
                format!("cannot move archive into place at {}", archive_path.display())
            })?;

        info!(
            target: TRACING_TARGET_INGESTION,
            archive = %archive_path.display(),
            bytes,
            ?format,
            "dataset archive fetched"
        );
        Ok(archive_path)
    }

    /// Extract `archive_path` into the feature store and return its path.
    ///
    /// Extracting the same archive again overwrites the files in place.
    pub fn extract(&self, archive_path: &Path, context: &RunContext) -> Result<PathBuf> {
        let feature_store = self.feature_store_path(context);
        if !archive_path.is_file() {
            return Err(Error::ingestion(format!(
                "archive does not exist: {}",
                archive_path.display()
            )));
        }
        archive::extract(archive_path, &feature_store)?;
        info!(
            target: TRACING_TARGET_INGESTION,
            feature_store = %feature_store.display(),
            "archive extracted into feature store"
        );
        Ok(feature_store)
    }

    /// `<ingestion_dir>/<feature_store_dir>` resolved against the run directory.
    pub fn feature_store_path(&self, context: &RunContext) -> PathBuf {
        context
            .resolve(&self.config.data_ingestion_dir)
            .join(&self.config.feature_store_dir)
    }
}

impl Stage for DataIngestion {
    type Input = ();
    type Output = DataIngestionArtifact;

    fn name(&self) -> &str {
        "Data Ingestion"
    }

    fn run(&self, _input: &(), context: &RunContext) -> Result<DataIngestionArtifact> {
        let archive_path = self.fetch(context)?;
        let feature_store_path = self.extract(&archive_path, context)?;
        Ok(DataIngestionArtifact::new(archive_path, feature_store_path))
    }
}

fn download(url: &str, out: &mut File) -> Result<u64> {
    let client = reqwest::blocking::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(None::<Duration>)
        .build()
        .with_kind(ErrorKind::Ingestion, || "cannot build HTTP client")?;

    let mut response = client
        .get(url)
        .send()
        .with_kind(ErrorKind::Ingestion, || format!("request to {url} failed"))?
        .error_for_status()
        .with_kind(ErrorKind::Ingestion, || format!("download from {url} was rejected"))?;

    debug!(
        target: TRACING_TARGET_INGESTION,
        url,
        status = %response.status(),
        content_length = ?response.content_length(),
        "download started"
    );

    response
        .copy_to(out)
        .with_kind(ErrorKind::Ingestion, || format!("download from {url} was interrupted"))
}

fn copy_local(path: &Path, out: &mut File) -> Result<u64> {
    let mut source = File::open(path).with_kind(ErrorKind::Ingestion, || {
        format!("cannot open local archive {}", path.display())
    })?;
    io::copy(&mut source, out)
        .with_kind(ErrorKind::Ingestion, || format!("cannot copy local archive {}", path.display()))
}
