//! JSON file storage backend
//!
//! Layout under the data directory:
//! - `checkpoints.json`: entity name → checkpoint
//! - `records/{entity}.json`: record id → record
//!
//! Every write replaces the whole file through a temp file and rename, so a
//! crash leaves either the old or the new content. The read-modify-write runs
//! on a blocking thread that owns the file's lock: a caller whose future is
//! dropped mid-write still keeps later writers out until its rename lands.

use crate::adapters::database::traits::{CheckpointStorage, RecordStore, UpsertResult};
use crate::core::state::ExportCheckpoint;
use crate::domain::{EntityKind, ExporterError, Record, Result, StorageError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const CHECKPOINTS_FILE: &str = "checkpoints.json";
const RECORDS_DIR: &str = "records";

type CheckpointMap = BTreeMap<String, ExportCheckpoint>;
type RecordMap = BTreeMap<String, Record>;

/// File-backed [`RecordStore`] and [`CheckpointStorage`]
pub struct FileStore {
    root: PathBuf,
    checkpoints_lock: Arc<Mutex<()>>,
    records_lock: Arc<Mutex<()>>,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
            checkpoints_lock: Arc::new(Mutex::new(())),
            records_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn checkpoints_path(&self) -> PathBuf {
        self.root.join(CHECKPOINTS_FILE)
    }

    fn records_path(&self, entity: EntityKind) -> PathBuf {
        self.root
            .join(RECORDS_DIR)
            .join(format!("{}.json", entity.as_str()))
    }

    async fn read_checkpoints(&self) -> Result<CheckpointMap> {
        let path = self.checkpoints_path();
        blocking(move || read_json(&path)).await
    }

    async fn read_records(&self, entity: EntityKind) -> Result<RecordMap> {
        let path = self.records_path(entity);
        blocking(move || read_json(&path)).await
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn test_connection(&self) -> Result<()> {
        let root = self.root.clone();
        blocking(move || {
            std::fs::create_dir_all(&root).map_err(|e| unavailable(&root, e))?;
            // Fails unless the directory is writable
            tempfile::NamedTempFile::new_in(&root).map_err(|e| unavailable(&root, e))?;
            Ok(())
        })
        .await
    }

    async fn ensure_schema(&self) -> Result<()> {
        let records = self.root.join(RECORDS_DIR);
        blocking(move || std::fs::create_dir_all(&records).map_err(|e| unavailable(&records, e)))
            .await?;
        tracing::info!(path = %self.root.display(), "File store initialized");
        Ok(())
    }

    async fn upsert_records(&self, entity: EntityKind, records: &[Record]) -> Result<UpsertResult> {
        let records = records.to_vec();
        let count = update_json(&self.records_lock, self.records_path(entity), move |table: &mut RecordMap| {
            let count = records.len();
            for record in records {
                table.insert(record.id().to_string(), record);
            }
            count
        })
        .await?;

        Ok(UpsertResult::all_succeeded(count))
    }

    async fn delete_records(&self, entity: EntityKind, ids: &[String]) -> Result<usize> {
        let ids = ids.to_vec();
        update_json(&self.records_lock, self.records_path(entity), move |table: &mut RecordMap| {
            ids.iter().filter(|id| table.remove(id.as_str()).is_some()).count()
        })
        .await
    }

    async fn fetch_records(&self, entity: EntityKind) -> Result<Vec<Record>> {
        Ok(self.read_records(entity).await?.into_values().collect())
    }

    async fn count_records(&self, entity: EntityKind) -> Result<u64> {
        Ok(self.read_records(entity).await?.len() as u64)
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

#[async_trait]
impl CheckpointStorage for FileStore {
    async fn load_checkpoint(&self, entity: EntityKind) -> Result<Option<ExportCheckpoint>> {
        Ok(self.read_checkpoints().await?.remove(entity.as_str()))
    }

    async fn save_checkpoint(&self, checkpoint: &ExportCheckpoint) -> Result<()> {
        let checkpoint = checkpoint.clone();
        update_json(&self.checkpoints_lock, self.checkpoints_path(), move |all: &mut CheckpointMap| {
            all.insert(checkpoint.entity.as_str().to_string(), checkpoint);
            1
        })
        .await?;
        Ok(())
    }

    async fn delete_checkpoint(&self, entity: EntityKind) -> Result<()> {
        update_json(&self.checkpoints_lock, self.checkpoints_path(), move |all: &mut CheckpointMap| {
            usize::from(all.remove(entity.as_str()).is_some())
        })
        .await?;
        Ok(())
    }

    async fn list_checkpoints(&self) -> Result<Vec<ExportCheckpoint>> {
        Ok(self.read_checkpoints().await?.into_values().collect())
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Unavailable(format!("file task failed: {e}")))?
}

/// Apply `update` to the map stored at `path`
///
/// `update` returns how many entries it changed; zero skips the write.
async fn update_json<T, F>(lock: &Arc<Mutex<()>>, path: PathBuf, update: F) -> Result<usize>
where
    T: Serialize + DeserializeOwned + Default + Send + 'static,
    F: FnOnce(&mut T) -> usize + Send + 'static,
{
    let guard = lock.clone().lock_owned().await;
    blocking(move || {
        let _guard = guard;
        let mut value: T = read_json(&path)?;
        let changed = update(&mut value);
        if changed > 0 {
            write_json_atomic(&path, &value)?;
        }
        Ok(changed)
    })
    .await
}

fn unavailable(path: &Path, e: std::io::Error) -> ExporterError {
    StorageError::Unavailable(format!("{}: {}", path.display(), e)).into()
}

/// Missing files read as an empty map
fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(unavailable(path, e)),
    };

    serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::Serialization(format!("{}: {}", path.display(), e)).into()
    })
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| unavailable(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| unavailable(dir, e))?;
    serde_json::to_writer_pretty(&mut tmp, value)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    tmp.flush().map_err(|e| unavailable(path, e))?;
    tmp.persist(path).map_err(|e| unavailable(path, e.error))?;
    Ok(())
}
