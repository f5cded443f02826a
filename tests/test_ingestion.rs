//! Integration tests for data ingestion.
//!
//! Tests cover:
//! - Source identifier parsing (local paths, file:// URLs, Google Drive links)
//! - Fetching a local archive into the ingestion directory
//! - Rejecting missing sources and unsupported formats without leaving files behind
//! - Extracting zip and tar.zst archives, and re-extracting idempotently

mod common;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use common::*;

fn ingestion_for(source: &Path) -> DataIngestion {
    DataIngestion::new(DataIngestionConfig {
        source_url: source.to_string_lossy().into_owned(),
        ..DataIngestionConfig::default()
    })
}

fn file_set(root: &Path) -> BTreeSet<PathBuf> {
    let mut files = BTreeSet::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.insert(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    files
}

#[test]
fn test_parse_sources() -> anyhow::Result<()> {
    assert_eq!(
        DataSource::parse("/data/plates.zip")?,
        DataSource::Local(PathBuf::from("/data/plates.zip"))
    );
    assert_eq!(
        DataSource::parse("file:///data/plates.zip")?,
        DataSource::Local(PathBuf::from("/data/plates.zip"))
    );
    assert_eq!(
        DataSource::parse("https://example.com/dataset.zip")?,
        DataSource::Remote("https://example.com/dataset.zip".to_string())
    );
    assert_eq!(
        DataSource::parse("https://drive.google.com/file/d/abc123/view?usp=sharing")?,
        DataSource::Remote(
            "https://drive.google.com/uc?export=download&confirm=t&id=abc123".to_string()
        )
    );
    Ok(())
}

#[test]
fn test_parse_rejects_bad_sources() {
    let empty = DataSource::parse("   ").unwrap_err();
    assert_eq!(empty.kind, ErrorKind::Ingestion);

    let scheme = DataSource::parse("ftp://example.com/data.zip").unwrap_err();
    assert_eq!(scheme.kind, ErrorKind::Ingestion);
    assert!(scheme.message.contains("unsupported source scheme"));
}

#[test]
fn test_fetch_local_archive() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let archive = valid_plate_archive(dir.path());
    let context = test_context(&dir.path().join("artifacts"));

    let ingestion = ingestion_for(&archive);
    let archive_path = ingestion.fetch(&context)?;

    assert_eq!(
        archive_path,
        context.root().join("data_ingestion").join("data.zip")
    );
    assert!(archive_path.is_file());
    assert_eq!(std::fs::read(&archive_path)?, std::fs::read(&archive)?);
    Ok(())
}

#[test]
fn test_fetch_missing_source_fails_without_archive() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let context = test_context(&dir.path().join("artifacts"));

    let ingestion = ingestion_for(&dir.path().join("does-not-exist.zip"));
    let err = ingestion.fetch(&context).unwrap_err();

    assert_eq!(err.kind, ErrorKind::Ingestion);
    let ingestion_dir = context.root().join("data_ingestion");
    assert!(!ingestion_dir.join("data.zip").exists());
    assert_eq!(std::fs::read_dir(&ingestion_dir)?.count(), 0, "staging file left behind");
    Ok(())
}

#[test]
fn test_fetch_unsupported_format_fails() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let not_an_archive = dir.path().join("data.txt");
    std::fs::write(&not_an_archive, "just some text")?;
    let context = test_context(&dir.path().join("artifacts"));

    let err = ingestion_for(&not_an_archive).fetch(&context).unwrap_err();

    assert_eq!(err.kind, ErrorKind::Ingestion);
    assert!(err.message.contains("unsupported archive format"));
    assert!(!context.root().join("data_ingestion").join("data.zip").exists());
    Ok(())
}

#[test]
fn test_run_produces_existing_paths() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let archive = valid_plate_archive(dir.path());
    let context = test_context(&dir.path().join("artifacts"));

    let artifact = ingestion_for(&archive).run(&(), &context)?;

    assert!(artifact.archive_path().is_file());
    assert!(artifact.feature_store_path().is_dir());
    assert!(artifact.feature_store_path().join("plates").join("car_1.png").is_file());
    assert!(artifact.feature_store_path().join("plates").join("car_2.png").is_file());
    Ok(())
}

#[test]
fn test_extract_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let archive = valid_plate_archive(dir.path());
    let context = test_context(&dir.path().join("artifacts"));
    let ingestion = ingestion_for(&archive);

    let first = ingestion.extract(&archive, &context)?;
    let files_after_first = file_set(&first);
    let second = ingestion.extract(&archive, &context)?;
    let files_after_second = file_set(&second);

    assert_eq!(first, second);
    assert_eq!(files_after_first, files_after_second);
    assert_eq!(files_after_first.len(), 2);
    Ok(())
}

#[test]
fn test_extract_tar_zst_archive() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let archive = dir.path().join("plates.tar.zst");
    write_tar_zst(
        &archive,
        &[("train/a.txt", b"label a"), ("valid/b.txt", b"label b")],
    );
    let context = test_context(&dir.path().join("artifacts"));

    let store = ingestion_for(&archive).extract(&archive, &context)?;

    assert_eq!(std::fs::read_to_string(store.join("train").join("a.txt"))?, "label a");
    assert_eq!(std::fs::read_to_string(store.join("valid").join("b.txt"))?, "label b");
    Ok(())
}

#[test]
fn test_extract_missing_or_corrupt_archive_fails() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let context = test_context(&dir.path().join("artifacts"));
    let ingestion = ingestion_for(&dir.path().join("unused.zip"));

    let missing = ingestion
        .extract(&dir.path().join("missing.zip"), &context)
        .unwrap_err();
    assert_eq!(missing.kind, ErrorKind::Ingestion);

    // Valid zip signature followed by garbage.
    let corrupt = dir.path().join("corrupt.zip");
    std::fs::write(&corrupt, [0x50, 0x4B, 0x03, 0x04, 0xFF, 0xFF, 0x00, 0x01])?;
    let err = ingestion.extract(&corrupt, &context).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Ingestion);
    Ok(())
}
