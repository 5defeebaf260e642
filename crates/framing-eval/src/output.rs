//! Batch persistence: one pretty-printed JSON document and one CSV table,
//! both written from the same record slice.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use framing_core::error::{OutputError, Result};

use crate::record::ResultRecord;

/// Header row of the CSV artifact.
pub const CSV_COLUMNS: [&str; 8] = [
    "prompt_id",
    "category",
    "base_question",
    "framing_type",
    "full_prompt",
    "response",
    "timestamp",
    "model",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    /// Run stamp, `YYYYMMDD_HHMMSS`.
    pub timestamp: String,
    /// Model identifier. Serialized as `model`, the key earlier result
    /// files already use.
    pub model: String,
    /// Number of prompts sent, i.e. number of records.
    pub total_prompts: usize,
}

/// The structured artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDocument {
    pub metadata: BatchMetadata,
    pub results: Vec<ResultRecord>,
}

#[derive(Serialize)]
struct BatchDocumentRef<'a> {
    metadata: BatchMetadata,
    results: &'a [ResultRecord],
}

/// Where a batch was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchArtifacts {
    pub json_path: PathBuf,
    pub csv_path: PathBuf,
}

impl BatchArtifacts {
    pub fn for_stamp(dir: &Path, stamp: &str) -> Self {
        Self {
            json_path: dir.join(format!("evaluation_{stamp}.json")),
            csv_path: dir.join(format!("evaluation_{stamp}.csv")),
        }
    }
}

/// Create `dir` if needed and check that it is a writable directory.
pub fn prepare_dir(dir: &Path) -> Result<()> {
    let write_err = |source: std::io::Error| OutputError::Write {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(write_err)?;
    if !dir.is_dir() {
        return Err(write_err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            "not a directory",
        ))
        .into());
    }
    tempfile::tempfile_in(dir).map_err(write_err)?;
    Ok(())
}

/// Write both artifacts for a batch, creating `dir` if needed.
///
/// Both files are staged under a `.partial` suffix and renamed into place
/// only once both are complete. On failure neither artifact is left behind.
pub fn write_batch(
    dir: &Path,
    stamp: &str,
    model: &str,
    records: &[ResultRecord],
) -> Result<BatchArtifacts> {
    prepare_dir(dir)?;

    let artifacts = BatchArtifacts::for_stamp(dir, stamp);
    let metadata = BatchMetadata {
        timestamp: stamp.to_string(),
        model: model.to_string(),
        total_prompts: records.len(),
    };
    let json_staged = staged(&artifacts.json_path);
    let csv_staged = staged(&artifacts.csv_path);

    let written = write_json(&json_staged, metadata, records)
        .and_then(|()| write_csv(&csv_staged, records))
        .and_then(|()| publish(&json_staged, &artifacts.json_path))
        .and_then(|()| {
            publish(&csv_staged, &artifacts.csv_path).inspect_err(|_| {
                let _ = fs::remove_file(&artifacts.json_path);
            })
        });
    if let Err(e) = written {
        let _ = fs::remove_file(&json_staged);
        let _ = fs::remove_file(&csv_staged);
        return Err(e);
    }

    tracing::debug!(
        json = %artifacts.json_path.display(),
        csv = %artifacts.csv_path.display(),
        records = records.len(),
        "wrote batch artifacts"
    );
    Ok(artifacts)
}

fn staged(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}

fn publish(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|source| OutputError::Write {
        path: to.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::new(file))
}

fn write_json(path: &Path, metadata: BatchMetadata, records: &[ResultRecord]) -> Result<()> {
    let mut writer = create(path)?;
    let doc = BatchDocumentRef {
        metadata,
        results: records,
    };
    serde_json::to_writer_pretty(&mut writer, &doc).map_err(|e| OutputError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|source| OutputError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}

fn write_csv(path: &Path, records: &[ResultRecord]) -> Result<()> {
    let csv_err = |e: csv::Error| OutputError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    // Header is written explicitly so an empty batch still gets one.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(create(path)?);
    writer.write_record(CSV_COLUMNS).map_err(csv_err)?;
    for record in records {
        writer.serialize(record).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Load a structured artifact back.
pub fn read_json(path: impl AsRef<Path>) -> Result<BatchDocument> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| OutputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = serde_json::from_str(&text).map_err(|e| OutputError::Json {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(doc)
}

/// Load a tabular artifact back into records.
pub fn read_csv(path: impl AsRef<Path>) -> Result<Vec<ResultRecord>> {
    let path = path.as_ref();
    let csv_err = |e: csv::Error| OutputError::Csv {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader.headers().map_err(csv_err)?;
    if headers.iter().ne(CSV_COLUMNS) {
        return Err(OutputError::Csv {
            path: path.to_path_buf(),
            message: format!("unexpected header row: {headers:?}"),
        }
        .into());
    }

    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row.map_err(csv_err)?);
    }
    Ok(records)
}
