//! Parquet snapshots of a merged table.
//!
//! A snapshot is a single ZSTD-compressed Parquet file. The embedded Arrow
//! schema keeps the dictionary and timestamp column types; the load timestamp
//! and join report ride along as key/value metadata.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::array::RecordBatch;
use arrow::compute::concat_batches;
use chrono::NaiveDateTime;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use tracing::info;

use crate::table::{JoinReport, MergedTable, schema};
use crate::{Error, HealthCheck};

pub const DEFAULT_HISTORY_DIR: &str = "history";

const CREATED_KEY: &str = "healthcheck.created";
const DROPPED_SAMPLES_KEY: &str = "healthcheck.dropped_samples";
const CASES_WITHOUT_SAMPLES_KEY: &str = "healthcheck.cases_without_samples";

impl HealthCheck {
    /// Writes a snapshot and returns the path written.
    ///
    /// With no `path` the snapshot goes to `history/<timestamp>.parquet` under the
    /// working directory. A `path` naming an existing directory gets the canonical
    /// name appended; anything else is used as the file path. Refuses to replace an
    /// existing file unless `overwrite` is set.
    pub fn save(&self, path: Option<&Path>, overwrite: bool) -> Result<PathBuf, Error> {
        let path = match path {
            Some(path) if path.is_dir() => path.join(self.snapshot_file_name()?),
            Some(path) => path.to_path_buf(),
            None => return self.save_to_history(Path::new(DEFAULT_HISTORY_DIR), overwrite),
        };
        self.write_snapshot(path, overwrite)
    }

    /// Writes the snapshot into `history_dir` under its canonical name, creating
    /// the directory when needed.
    pub fn save_to_history(&self, history_dir: &Path, overwrite: bool) -> Result<PathBuf, Error> {
        fs::create_dir_all(history_dir)?;
        self.write_snapshot(history_dir.join(self.snapshot_file_name()?), overwrite)
    }

    fn write_snapshot(&self, path: PathBuf, overwrite: bool) -> Result<PathBuf, Error> {
        if path.exists() && !overwrite {
            return Err(Error::SnapshotExists(path));
        }

        let table = self.table();
        let mut metadata = vec![
            KeyValue::new(
                DROPPED_SAMPLES_KEY.to_string(),
                table.join_report().dropped_samples.to_string(),
            ),
            KeyValue::new(
                CASES_WITHOUT_SAMPLES_KEY.to_string(),
                serde_json::to_string(&table.join_report().cases_without_samples)?,
            ),
        ];
        if let Some(created) = table.created() {
            metadata.push(KeyValue::new(
                CREATED_KEY.to_string(),
                created.and_utc().timestamp_micros().to_string(),
            ));
        }
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .set_key_value_metadata(Some(metadata))
            .build();

        let file = File::create(&path)?;
        let mut writer = ArrowWriter::try_new(file, schema(), Some(props))?;
        writer.write(table.batch())?;
        writer.close()?;
        info!(path = %path.display(), rows = table.num_rows(), "saved snapshot");
        Ok(path)
    }

    /// Like [`HealthCheck::save_to_history`], but an existing archive of the same
    /// load is kept.
    pub fn archive(&self, history_dir: &Path) -> Result<PathBuf, Error> {
        match self.save_to_history(history_dir, false) {
            Err(Error::SnapshotExists(path)) => {
                info!(path = %path.display(), "snapshot already archived");
                Ok(path)
            }
            res => res,
        }
    }
}

/// Reads a snapshot written by [`HealthCheck::save`].
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<HealthCheck, Error> {
    let path = path.as_ref();
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let mut created: Option<NaiveDateTime> = None;
    let mut join_report = JoinReport::default();
    if let Some(kvs) = builder.metadata().file_metadata().key_value_metadata() {
        for kv in kvs {
            let Some(value) = kv.value.as_deref() else {
                continue;
            };
            match kv.key.as_str() {
                CREATED_KEY => {
                    let micros: i64 = value
                        .parse()
                        .map_err(|_| Error::MalformedSnapshot(format!("{CREATED_KEY}={value}")))?;
                    let datetime = chrono::DateTime::from_timestamp_micros(micros)
                        .ok_or(Error::InvalidTimestamp(micros))?;
                    created = Some(datetime.naive_utc());
                }
                DROPPED_SAMPLES_KEY => {
                    join_report.dropped_samples = value.parse().map_err(|_| {
                        Error::MalformedSnapshot(format!("{DROPPED_SAMPLES_KEY}={value}"))
                    })?;
                }
                CASES_WITHOUT_SAMPLES_KEY => {
                    join_report.cases_without_samples = serde_json::from_str(value)?;
                }
                _ => {}
            }
        }
    }

    let schema = schema();
    let mut batches = Vec::new();
    for batch in builder.build()? {
        batches.push(RecordBatch::try_new(schema.clone(), batch?.columns().to_vec())?);
    }
    let batch = concat_batches(&schema, &batches)?;
    let mut table = MergedTable::from_batch(batch)?.with_join_report(join_report);
    if let Some(created) = created {
        table = table.with_created(created);
    }
    info!(path = %path.display(), rows = table.num_rows(), "loaded snapshot");
    Ok(HealthCheck::from(table))
}
