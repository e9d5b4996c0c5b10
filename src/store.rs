use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::model::{Record, Snapshot};

const PEOPLE_DIR: &str = "people";

static UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s/\\]").unwrap());

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no stored data at {0}")]
    NotFound(PathBuf),
    #[error("stored data at {path} is unreadable: {source}")]
    CorruptData {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("i/o failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Location of one person's file, relative to the storage root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(PathBuf);

impl RecordKey {
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Written after directory sync.
    Directory,
    /// Written after content enrichment.
    Enriched,
}

impl SnapshotKind {
    fn file_name(self) -> &'static str {
        match self {
            SnapshotKind::Directory => "directory.json",
            SnapshotKind::Enriched => "directory_enriched.json",
        }
    }
}

/// Whitespace and path separators become `_`. A segment that would name the
/// current or parent directory becomes `_` as well.
pub fn sanitize(segment: &str) -> String {
    let clean = UNSAFE_RE.replace_all(segment.trim(), "_");
    if matches!(&*clean, "" | "." | "..") {
        return "_".to_string();
    }
    clean.into_owned()
}

/// One JSON file per person plus the two aggregate snapshots.
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn key_for(&self, group: &str, name: &str) -> RecordKey {
        let mut path = PathBuf::from(PEOPLE_DIR);
        path.push(sanitize(group));
        path.push(format!("{}.json", sanitize(name)));
        RecordKey(path)
    }

    pub fn exists(&self, key: &RecordKey) -> bool {
        self.root.join(key.as_path()).is_file()
    }

    pub fn load(&self, key: &RecordKey) -> Result<Record, StoreError> {
        read_json(&self.root.join(key.as_path()))
    }

    pub fn save(&self, record: &Record, key: &RecordKey) -> Result<(), StoreError> {
        write_json(&self.root.join(key.as_path()), record)?;
        info!(key = %key, "Saved record for {}", record.name);
        Ok(())
    }

    pub fn snapshot_exists(&self, kind: SnapshotKind) -> bool {
        self.root.join(kind.file_name()).is_file()
    }

    pub fn load_snapshot(&self, kind: SnapshotKind) -> Result<Snapshot, StoreError> {
        read_json(&self.root.join(kind.file_name()))
    }

    pub fn save_snapshot(&self, kind: SnapshotKind, snapshot: &Snapshot) -> Result<(), StoreError> {
        write_json(&self.root.join(kind.file_name()), snapshot)?;
        info!(
            key = kind.file_name(),
            "Saved snapshot ({} groups, {} records)",
            snapshot.groups.len(),
            snapshot.len()
        );
        Ok(())
    }

    /// Every per-person file currently on disk, sorted.
    pub fn list_keys(&self) -> Result<Vec<RecordKey>, StoreError> {
        let people = self.root.join(PEOPLE_DIR);
        let mut keys = Vec::new();
        if !people.is_dir() {
            return Ok(keys);
        }
        for group in read_dir(&people)? {
            if !group.is_dir() {
                continue;
            }
            for file in read_dir(&group)? {
                if file.extension().is_some_and(|e| e == "json") {
                    if let Ok(rel) = file.strip_prefix(&self.root) {
                        keys.push(RecordKey(rel.to_path_buf()));
                    }
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    entries
        .map(|entry| entry.map(|e| e.path()).map_err(|e| io_err(dir, e)))
        .collect()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(io_err(path, e)),
    };
    serde_json::from_str(&text).map_err(|source| StoreError::CorruptData {
        path: path.to_path_buf(),
        source,
    })
}

/// Write next to the target, then rename over it.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let mut body = serde_json::to_string_pretty(value).map_err(|source| StoreError::CorruptData {
        path: path.to_path_buf(),
        source,
    })?;
    body.push('\n');

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, source: io::Error) -> StoreError {
    StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ── Tests ──
