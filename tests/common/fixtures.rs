use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use platewatch::artifacts::{ModelTrainerArtifact, TrainingInput};
use platewatch::config::PipelineConfig;
use platewatch::{Result, RunContext, Stage};

/// Encodes a `width`x`height` gradient as PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 20 % 256) as u8, (y * 20 % 256) as u8, 128u8])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes
}

/// Writes a PNG test image to `path`.
pub fn create_test_image(path: &Path, width: u32, height: u32) {
    fs::write(path, png_bytes(width, height)).expect("Failed to write test image");
}

/// Writes a zip archive. Names ending in `/` become directory entries.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("Failed to create zip file");
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, data) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).expect("Failed to add directory");
        } else {
            zip.start_file(*name, options).expect("Failed to start zip entry");
            zip.write_all(data).expect("Failed to write zip entry");
        }
    }
    zip.finish().expect("Failed to finish zip file");
}

/// Writes a zstd-compressed tar archive of regular files.
pub fn write_tar_zst(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("Failed to create tar.zst file");
    let encoder = zstd::Encoder::new(file, 0).expect("Failed to create zstd encoder");
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *data)
            .expect("Failed to append tar entry");
    }
    let encoder = builder.into_inner().expect("Failed to finish tar stream");
    encoder.finish().expect("Failed to finish zstd stream");
}

/// Run context rooted in `artifacts_dir` with a fixed run id.
pub fn test_context(artifacts_dir: &Path) -> RunContext {
    RunContext::new(artifacts_dir, Some("test-run")).expect("Failed to create run context")
}

/// Pipeline configuration reading a local archive and writing under `artifacts_dir`.
pub fn local_config(artifacts_dir: &Path, archive: &Path, required: &[&str]) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.artifacts_dir = artifacts_dir.to_path_buf();
    config.run_id = Some("test-run".to_string());
    config.ingestion.source_url = archive.to_string_lossy().into_owned();
    config.validation.required_entries = required.iter().map(|s| s.to_string()).collect();
    config.features.width = 4;
    config.features.height = 4;
    config
}

/// Archive with one top-level folder holding two small PNGs.
pub fn valid_plate_archive(dir: &Path) -> PathBuf {
    let path = dir.join("plates.zip");
    let image = png_bytes(10, 10);
    write_zip(
        &path,
        &[
            ("plates/", b""),
            ("plates/car_1.png", image.as_slice()),
            ("plates/car_2.png", image.as_slice()),
        ],
    );
    path
}

/// Archive in the usual detection-dataset layout: `train/` and `valid/`
/// splits with `images/` and `labels/`, plus a `data.yaml` descriptor.
pub fn split_dataset_archive(dir: &Path) -> PathBuf {
    let path = dir.join("dataset.zip");
    let image = png_bytes(10, 10);
    let label: &[u8] = b"0 0.5 0.5 0.2 0.1\n";
    write_zip(
        &path,
        &[
            ("train/images/a.png", image.as_slice()),
            ("train/labels/a.txt", label),
            ("valid/images/b.png", image.as_slice()),
            ("valid/labels/b.txt", label),
            (
                "data.yaml",
                b"train: train/images\nval: valid/images\nnc: 1\nnames: [plate]\n",
            ),
        ],
    );
    path
}

/// Archive with one top-level folder and nothing in it.
pub fn empty_folder_archive(dir: &Path) -> PathBuf {
    let path = dir.join("empty.zip");
    write_zip(&path, &[("plates/", b"")]);
    path
}

/// Writes a shell script and returns its path.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("Failed to write script");
    path
}

/// Trainer double recording every invocation.
#[derive(Default)]
pub struct SpyTrainer {
    pub calls: RefCell<Vec<TrainingInput>>,
}

impl SpyTrainer {
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Stage for SpyTrainer {
    type Input = TrainingInput;
    type Output = ModelTrainerArtifact;

    fn name(&self) -> &str {
        "Spy Trainer"
    }

    fn run(&self, input: &TrainingInput, context: &RunContext) -> Result<ModelTrainerArtifact> {
        self.calls.borrow_mut().push(input.clone());
        let model = context.root().join("spy_model.pt");
        fs::write(&model, b"weights").expect("Failed to write spy model");
        Ok(ModelTrainerArtifact::new(model))
    }
}
