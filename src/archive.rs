//! Dataset archive formats.
//!
//! Archives are recognised by their leading bytes so a mislabelled download is
//! caught before extraction. ZIP is what dataset exports ship as; zstd-framed
//! tar is accepted for locally packed datasets.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path};

use tracing::debug;

use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::telemetry::TRACING_TARGET_INGESTION;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarZstd,
}

impl ArchiveFormat {
    /// Identify the format from the first bytes of a file.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.len() < 4 {
            return None;
        }
        match [header[0], header[1], header[2], header[3]] {
            ZIP_MAGIC | ZIP_EMPTY_MAGIC => Some(ArchiveFormat::Zip),
            ZSTD_MAGIC => Some(ArchiveFormat::TarZstd),
            _ => None,
        }
    }

    /// Identify the format of the archive at `path`.
    pub fn detect(path: &Path) -> Result<Self> {
        let mut header = [0u8; 4];
        let mut file = File::open(path).with_kind(ErrorKind::Ingestion, || {
            format!("cannot open archive {}", path.display())
        })?;
        let read = file
            .read(&mut header)
            .with_kind(ErrorKind::Ingestion, || format!("cannot read archive {}", path.display()))?;
        Self::sniff(&header[..read]).ok_or_else(|| {
            Error::ingestion(format!("unsupported archive format: {}", path.display()))
        })
    }
}

/// Extract every entry of `archive` into `target`, overwriting files already present.
pub fn extract(archive: &Path, target: &Path) -> Result<ArchiveFormat> {
    let format = ArchiveFormat::detect(archive)?;
    fs::create_dir_all(target).with_kind(ErrorKind::Ingestion, || {
        format!("cannot create feature store {}", target.display())
    })?;

    match format {
        ArchiveFormat::Zip => extract_zip(archive, target)?,
        ArchiveFormat::TarZstd => extract_tar_zstd(archive, target)?,
    }

    debug!(
        target: TRACING_TARGET_INGESTION,
        archive = %archive.display(),
        target_dir = %target.display(),
        ?format,
        "archive extracted"
    );
    Ok(format)
}

fn extract_zip(archive: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_kind(ErrorKind::Ingestion, || format!("cannot open archive {}", archive.display()))?;
    let mut zip = zip::ZipArchive::new(BufReader::new(file))
        .with_kind(ErrorKind::Ingestion, || format!("corrupt zip archive {}", archive.display()))?;
    // ZipArchive::extract rejects entries that would escape `target`.
    zip.extract(target)
        .with_kind(ErrorKind::Ingestion, || {
            format!("cannot extract {} into {}", archive.display(), target.display())
        })
}

fn extract_tar_zstd(archive: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive)
        .with_kind(ErrorKind::Ingestion, || format!("cannot open archive {}", archive.display()))?;
    let decoder = zstd::Decoder::new(file)
        .with_kind(ErrorKind::Ingestion, || format!("corrupt zstd stream {}", archive.display()))?;
    let mut tar = tar::Archive::new(decoder);
    tar.set_overwrite(true);

    let entries = tar.entries().with_kind(ErrorKind::Ingestion, || {
        format!("corrupt tar archive {}", archive.display())
    })?;
    for entry in entries {
        let mut entry = entry.with_kind(ErrorKind::Ingestion, || {
            format!("corrupt tar entry in {}", archive.display())
        })?;
        let path = entry
            .path()
            .with_kind(ErrorKind::Ingestion, || {
                format!("invalid tar entry path in {}", archive.display())
            })?
            .into_owned();
        if !is_contained(&path) {
            return Err(Error::ingestion(format!(
                "archive entry escapes the feature store: {}",
                path.display()
            )));
        }
        entry.unpack_in(target).with_kind(ErrorKind::Ingestion, || {
            format!("cannot unpack {} into {}", path.display(), target.display())
        })?;
    }
    Ok(())
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
