//! Spreadsheet file sink
//!
//! Writes one ZIP archive per export holding a CSV per entity.

use crate::core::transform::Table;
use crate::domain::{EntityKind, ExporterError, Result};
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A finished export archive
#[derive(Debug, Clone, Serialize)]
pub struct ExportArchive {
    pub path: PathBuf,
    pub file_name: String,
    /// Hex SHA-256 of the archive bytes
    pub sha256: String,
    pub size_bytes: u64,
    /// Data rows written per entity
    pub rows: BTreeMap<EntityKind, usize>,
}

pub struct FileExporter {
    export_dir: PathBuf,
}

impl FileExporter {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
        }
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Write `crm_export_<timestamp>.zip` with one `{entity}.csv` per table
    ///
    /// # Errors
    ///
    /// Any I/O or encoding failure is `SinkUnavailable`.
    pub async fn write(&self, tables: Vec<(EntityKind, Table)>) -> Result<ExportArchive> {
        let export_dir = self.export_dir.clone();
        let file_name = format!("crm_export_{}.zip", Utc::now().format("%Y%m%d_%H%M%S"));

        let archive = tokio::task::spawn_blocking(move || write_archive(&export_dir, file_name, &tables))
            .await
            .map_err(|e| ExporterError::Other(format!("archive task failed: {e}")))??;

        tracing::info!(
            path = %archive.path.display(),
            size_bytes = archive.size_bytes,
            sha256 = %archive.sha256,
            "Export archive written"
        );
        Ok(archive)
    }
}

fn sink_error(context: &str, e: impl std::fmt::Display) -> ExporterError {
    ExporterError::SinkUnavailable(format!("{context}: {e}"))
}

fn write_archive(
    export_dir: &Path,
    file_name: String,
    tables: &[(EntityKind, Table)],
) -> Result<ExportArchive> {
    std::fs::create_dir_all(export_dir)
        .map_err(|e| sink_error("cannot create export directory", e))?;

    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut rows = BTreeMap::new();

    for (entity, table) in tables {
        let mut csv = csv::Writer::from_writer(Vec::new());
        csv.write_record(&table.headers)
            .map_err(|e| sink_error("csv encoding failed", e))?;
        for row in &table.rows {
            csv.write_record(row)
                .map_err(|e| sink_error("csv encoding failed", e))?;
        }
        let bytes = csv
            .into_inner()
            .map_err(|e| sink_error("csv encoding failed", e))?;

        zip.start_file(format!("{entity}.csv"), options)
            .map_err(|e| sink_error("zip encoding failed", e))?;
        zip.write_all(&bytes)
            .map_err(|e| sink_error("zip encoding failed", e))?;
        rows.insert(*entity, table.rows.len());
    }

    let bytes = zip
        .finish()
        .map_err(|e| sink_error("zip encoding failed", e))?
        .into_inner();
    let sha256 = format!("{:x}", Sha256::digest(&bytes));

    let mut temp = NamedTempFile::new_in(export_dir)
        .map_err(|e| sink_error("cannot create archive", e))?;
    temp.write_all(&bytes)
        .map_err(|e| sink_error("cannot write archive", e))?;
    let path = export_dir.join(&file_name);
    temp.persist(&path)
        .map_err(|e| sink_error("cannot persist archive", e.error))?;

    Ok(ExportArchive {
        path,
        file_name,
        sha256,
        size_bytes: bytes.len() as u64,
        rows,
    })
}
