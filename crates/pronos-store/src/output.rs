//! Record persistence: one file per (team, season, kind) and format.
//!
//! Layout under the environment data directory:
//!
//! ```text
//! raw/{kind}/{team_id}_{season}.{json,csv,parquet}
//! raw/wages/{team_id}_{season}_summary.json
//! raw/match_stats/.partial/{team_id}_{season}/{match_id}.json
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::{ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use pronos_core::{
    columns_for, Cell, CollectedRecord, ColumnKind, DataKind, MatchStatRecord, OutputFormat,
    Tabular, Target, WageSummary,
};

use crate::{tmp_path, write_atomic, StoreError};

/// The persist capability the orchestrator writes through.
pub trait RecordSink {
    /// Whether every configured output for `target` already exists.
    fn exists(&self, target: &Target) -> bool;

    /// Writes the complete record set for `target` in every configured
    /// format, replacing earlier output. Returns the files written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any file cannot be written.
    fn persist(
        &mut self,
        target: &Target,
        records: &[CollectedRecord],
    ) -> Result<Vec<PathBuf>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] if the summary cannot be written.
    fn persist_summary(&mut self, summary: &WageSummary) -> Result<PathBuf, StoreError>;

    /// Stores one match's records until the whole target is assembled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the staging file cannot be written.
    fn stage_match(
        &mut self,
        target: &Target,
        match_id: &str,
        records: &[MatchStatRecord],
    ) -> Result<(), StoreError>;

    /// Records staged for `match_id`, or `None` if nothing was staged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a staging file exists but cannot be read.
    fn load_staged_match(
        &self,
        target: &Target,
        match_id: &str,
    ) -> Result<Option<Vec<MatchStatRecord>>, StoreError>;

    /// # Errors
    ///
    /// Returns [`StoreError`] if the staging directory cannot be removed.
    fn clear_staging(&mut self, target: &Target) -> Result<(), StoreError>;
}

/// Writes records under `{data_dir}/raw` in the configured formats.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    raw_dir: PathBuf,
    formats: Vec<OutputFormat>,
}

impl OutputWriter {
    #[must_use]
    pub fn new(data_dir: &Path, formats: &[OutputFormat]) -> Self {
        Self {
            raw_dir: data_dir.join("raw"),
            formats: formats.to_vec(),
        }
    }

    #[must_use]
    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    #[must_use]
    pub fn path_for(&self, target: &Target, format: OutputFormat) -> PathBuf {
        self.raw_dir.join(target.data_kind.as_str()).join(format!(
            "{}.{}",
            file_stem(target),
            format.extension()
        ))
    }

    #[must_use]
    pub fn summary_path(&self, target: &Target) -> PathBuf {
        self.raw_dir
            .join(DataKind::Wages.as_str())
            .join(format!("{}_summary.json", file_stem(target)))
    }

    fn staging_dir(&self, target: &Target) -> PathBuf {
        self.raw_dir
            .join(target.data_kind.as_str())
            .join(".partial")
            .join(file_stem(target))
    }

    fn staging_path(&self, target: &Target, match_id: &str) -> PathBuf {
        self.staging_dir(target).join(format!("{match_id}.json"))
    }
}

impl RecordSink for OutputWriter {
    fn exists(&self, target: &Target) -> bool {
        self.formats
            .iter()
            .all(|format| self.path_for(target, *format).is_file())
    }

    fn persist(
        &mut self,
        target: &Target,
        records: &[CollectedRecord],
    ) -> Result<Vec<PathBuf>, StoreError> {
        let mut written = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            let path = self.path_for(target, *format);
            match format {
                OutputFormat::Json => write_json(&path, records)?,
                OutputFormat::Csv => write_csv(&path, target.data_kind, records)?,
                OutputFormat::Parquet => write_parquet(&path, target.data_kind, records)?,
            }
            tracing::debug!(path = %path.display(), records = records.len(), "wrote output");
            written.push(path);
        }
        Ok(written)
    }

    fn persist_summary(&mut self, summary: &WageSummary) -> Result<PathBuf, StoreError> {
        let target = Target::new(
            summary.team_id.clone(),
            summary.team_name.clone(),
            summary.season.clone(),
            DataKind::Wages,
        );
        let path = self.summary_path(&target);
        let json = serde_json::to_vec_pretty(summary).map_err(|e| StoreError::json(&path, e))?;
        write_atomic(&path, &json)?;
        Ok(path)
    }

    fn stage_match(
        &mut self,
        target: &Target,
        match_id: &str,
        records: &[MatchStatRecord],
    ) -> Result<(), StoreError> {
        let path = self.staging_path(target, match_id);
        let json = serde_json::to_vec(records).map_err(|e| StoreError::json(&path, e))?;
        write_atomic(&path, &json)
    }

    fn load_staged_match(
        &self,
        target: &Target,
        match_id: &str,
    ) -> Result<Option<Vec<MatchStatRecord>>, StoreError> {
        let path = self.staging_path(target, match_id);
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| StoreError::json(&path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn clear_staging(&mut self, target: &Target) -> Result<(), StoreError> {
        let dir = self.staging_dir(target);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&dir, e)),
        }
    }
}

fn file_stem(target: &Target) -> String {
    format!("{}_{}", target.team_id, target.season)
}

// ---------------------------------------------------------------------------
// Format writers
// ---------------------------------------------------------------------------

fn write_json(path: &Path, records: &[CollectedRecord]) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(records).map_err(|e| StoreError::json(path, e))?;
    write_atomic(path, &json)
}

fn write_csv(path: &Path, kind: DataKind, records: &[CollectedRecord]) -> Result<(), StoreError> {
    let mut out = csv::Writer::from_writer(Vec::new());
    out.write_record(columns_for(kind).iter().map(|column| column.name))?;
    for record in records {
        out.write_record(record.row().iter().map(Cell::render))?;
    }
    let bytes = out
        .into_inner()
        .map_err(|e| StoreError::io(path, e.into_error()))?;
    write_atomic(path, &bytes)
}

fn write_parquet(path: &Path, kind: DataKind, records: &[CollectedRecord]) -> Result<(), StoreError> {
    let batch = record_batch(kind, records)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let tmp = tmp_path(path);
    let file = File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    std::fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))
}

/// Builds a columnar batch from the flat rows of `records`.
fn record_batch(kind: DataKind, records: &[CollectedRecord]) -> Result<RecordBatch, StoreError> {
    let columns = columns_for(kind);
    let rows: Vec<Vec<Cell>> = records.iter().map(Tabular::row).collect();

    let fields: Vec<Field> = columns
        .iter()
        .map(|column| {
            let data_type = match column.kind {
                ColumnKind::Text => DataType::Utf8,
                ColumnKind::Int => DataType::Int64,
                ColumnKind::Float => DataType::Float64,
            };
            Field::new(column.name, data_type, column.nullable)
        })
        .collect();

    let arrays: Vec<ArrayRef> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| -> ArrayRef {
            let cells = rows.iter().map(|row| row.get(index).unwrap_or(&Cell::Null));
            match column.kind {
                ColumnKind::Text => Arc::new(StringArray::from(
                    cells
                        .map(|cell| match cell {
                            Cell::Text(s) => Some(s.clone()),
                            Cell::Null => None,
                            other => Some(other.render()),
                        })
                        .collect::<Vec<_>>(),
                )),
                ColumnKind::Int => Arc::new(Int64Array::from(
                    cells
                        .map(|cell| match cell {
                            Cell::Int(i) => Some(*i),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
                ColumnKind::Float => Arc::new(Float64Array::from(
                    cells
                        .map(|cell| match cell {
                            Cell::Float(f) => Some(*f),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            }
        })
        .collect();

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}
