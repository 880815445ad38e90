//! Record store contract and JSON snapshot implementation.
//!
//! # Responsibility
//! - Hold live records keyed by `"<kind>.<id>"`.
//! - Write the whole registry to one JSON file and rebuild it from that file.
//! - Dispatch reloaded entries through the kind catalog.
//!
//! # Invariants
//! - `save()` rewrites the full file (truncate-and-write); it is not
//!   crash-atomic.
//! - `reload()` treats a missing or zero-length file as an empty snapshot.
//! - `reload()` stages every entry before touching the registry.
//! - Unknown discriminators fail closed with `UnknownKind`.

use crate::model::kind::KindCatalog;
use crate::model::record::{composite_key, Record, RecordError, RecordMapping, CLASS_KEY};
use indexmap::IndexMap;
use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Backing file name used when the caller does not choose one.
pub const DEFAULT_STORE_FILE: &str = "saved_objects.json";

pub type StoreResult<T> = Result<T, StoreError>;

/// Store error for registry lookups and snapshot persistence.
#[derive(Debug)]
pub enum StoreError {
    /// Discriminator is not registered in the kind catalog.
    UnknownKind(String),
    /// No record lives under the requested composite key.
    NotFound { kind: String, id: String },
    Io { path: PathBuf, source: io::Error },
    Json { path: PathBuf, source: serde_json::Error },
    /// Snapshot entry is structurally unusable.
    MalformedEntry { key: String, reason: String },
    /// Snapshot key does not match the entry's own `__class__` and `id`.
    KeyMismatch { key: String, expected: String },
    /// Snapshot entry failed record reconstruction.
    Record { key: String, source: RecordError },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKind(kind) => write!(f, "unknown record kind: {kind}"),
            Self::NotFound { kind, id } => write!(f, "record not found: {kind}.{id}"),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "{}: invalid snapshot JSON: {source}", path.display())
            }
            Self::MalformedEntry { key, reason } => {
                write!(f, "malformed snapshot entry `{key}`: {reason}")
            }
            Self::KeyMismatch { key, expected } => {
                write!(f, "snapshot key `{key}` does not match its entry `{expected}`")
            }
            Self::Record { key, source } => write!(f, "snapshot entry `{key}`: {source}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Record { source, .. } => Some(source),
            Self::UnknownKind(_)
            | Self::NotFound { .. }
            | Self::MalformedEntry { .. }
            | Self::KeyMismatch { .. } => None,
        }
    }
}

/// Registry interface for live records.
///
/// Implementations own the kind catalog so creation and reload can dispatch
/// on discriminators without global state.
pub trait RecordStore {
    fn catalog(&self) -> &KindCatalog;

    /// Registers a record under its composite key.
    ///
    /// An existing entry under the same key is replaced (last write wins)
    /// and handed back to the caller.
    fn insert(&mut self, record: Record) -> Option<Record>;

    /// Live registry map, in insertion order.
    fn all(&self) -> &IndexMap<String, Record>;

    /// Mutable access to the live registry map.
    ///
    /// Escape hatch: edits made here skip identity generation, key checks
    /// and dirty tracking. Callers must keep keys equal to `Record::key()`
    /// and call `save()` themselves.
    fn all_mut(&mut self) -> &mut IndexMap<String, Record>;

    fn get(&self, kind: &str, id: &str) -> StoreResult<&Record>;

    fn get_mut(&mut self, kind: &str, id: &str) -> StoreResult<&mut Record>;

    /// Removes one record. Does not save.
    fn delete(&mut self, kind: &str, id: &str) -> StoreResult<Record>;

    /// Writes the full registry snapshot.
    fn save(&mut self) -> StoreResult<()>;

    /// Merges the persisted snapshot into the registry.
    ///
    /// Returns the number of records loaded.
    fn reload(&mut self) -> StoreResult<usize>;

    /// Builds and registers a fresh record of `kind`, returning its id.
    fn create(&mut self, kind: &str) -> StoreResult<String> {
        let record = self
            .catalog()
            .get(kind)
            .ok_or_else(|| StoreError::UnknownKind(kind.to_string()))?
            .instantiate();
        let id = record.id().to_string();
        self.insert(record);
        Ok(id)
    }

    /// Records whose key starts with `"<kind>."`, in insertion order.
    fn all_of_kind(&self, kind: &str) -> Vec<&Record> {
        let prefix = composite_key(kind, "");
        self.all()
            .iter()
            .filter(|(key, _)| key.starts_with(prefix.as_str()))
            .map(|(_, record)| record)
            .collect()
    }

    /// Advances the record's `updated_at` and saves the whole registry.
    fn persist(&mut self, kind: &str, id: &str) -> StoreResult<()> {
        self.get_mut(kind, id)?.touch();
        self.save()
    }
}

/// Registry backed by a single JSON snapshot file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    catalog: KindCatalog,
    objects: IndexMap<String, Record>,
    dirty: bool,
}

impl JsonFileStore {
    /// Creates an empty store for `path` without reading it.
    pub fn new(path: impl Into<PathBuf>, catalog: KindCatalog) -> Self {
        Self {
            path: path.into(),
            catalog,
            objects: IndexMap::new(),
            dirty: false,
        }
    }

    /// Creates a store for `path` and loads its snapshot.
    pub fn open(path: impl Into<PathBuf>, catalog: KindCatalog) -> StoreResult<Self> {
        let mut store = Self::new(path, catalog);
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether the registry changed since the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn not_found(kind: &str, id: &str) -> StoreError {
        StoreError::NotFound {
            kind: kind.to_string(),
            id: id.to_string(),
        }
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn read_snapshot(&self) -> StoreResult<Option<RecordMapping>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        if raw.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })
    }
}

impl RecordStore for JsonFileStore {
    fn catalog(&self) -> &KindCatalog {
        &self.catalog
    }

    fn insert(&mut self, record: Record) -> Option<Record> {
        let key = record.key();
        let previous = self.objects.insert(key.clone(), record);
        self.dirty = true;
        if previous.is_some() {
            warn!("event=store_new module=store status=overwrite key={key}");
        } else {
            debug!("event=store_new module=store status=ok key={key}");
        }
        previous
    }

    fn all(&self) -> &IndexMap<String, Record> {
        &self.objects
    }

    fn all_mut(&mut self) -> &mut IndexMap<String, Record> {
        &mut self.objects
    }

    fn get(&self, kind: &str, id: &str) -> StoreResult<&Record> {
        self.objects
            .get(&composite_key(kind, id))
            .ok_or_else(|| Self::not_found(kind, id))
    }

    fn get_mut(&mut self, kind: &str, id: &str) -> StoreResult<&mut Record> {
        let record = self
            .objects
            .get_mut(&composite_key(kind, id))
            .ok_or_else(|| Self::not_found(kind, id))?;
        self.dirty = true;
        Ok(record)
    }

    fn delete(&mut self, kind: &str, id: &str) -> StoreResult<Record> {
        let key = composite_key(kind, id);
        let removed = self
            .objects
            .shift_remove(&key)
            .ok_or_else(|| Self::not_found(kind, id))?;
        self.dirty = true;
        debug!("event=store_delete module=store status=ok key={key}");
        Ok(removed)
    }

    fn save(&mut self) -> StoreResult<()> {
        let started_at = Instant::now();

        let snapshot: RecordMapping = self
            .objects
            .iter()
            .map(|(key, record)| (key.clone(), Value::Object(record.to_mapping())))
            .collect();
        let bytes = encode_snapshot(&snapshot).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
            }
        }

        if let Err(err) = fs::write(&self.path, bytes) {
            error!(
                "event=store_save module=store status=error path={} duration_ms={} error={}",
                self.path.display(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(self.io_error(err));
        }

        self.dirty = false;
        info!(
            "event=store_save module=store status=ok path={} records={} duration_ms={}",
            self.path.display(),
            self.objects.len(),
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    fn reload(&mut self) -> StoreResult<usize> {
        let started_at = Instant::now();

        let snapshot = match self.read_snapshot()? {
            Some(snapshot) => snapshot,
            None => {
                info!(
                    "event=store_reload module=store status=skipped path={} reason=missing_or_empty",
                    self.path.display()
                );
                return Ok(0);
            }
        };

        let staged = match decode_snapshot(&self.catalog, snapshot) {
            Ok(staged) => staged,
            Err(err) => {
                error!(
                    "event=store_reload module=store status=error path={} duration_ms={} error={}",
                    self.path.display(),
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err);
            }
        };

        let loaded = staged.len();
        self.objects.extend(staged);
        info!(
            "event=store_reload module=store status=ok path={} records={} duration_ms={}",
            self.path.display(),
            loaded,
            started_at.elapsed().as_millis()
        );
        Ok(loaded)
    }
}

fn encode_snapshot(snapshot: &RecordMapping) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut bytes, PrettyFormatter::with_indent(b"\t"));
    snapshot.serialize(&mut serializer)?;
    Ok(bytes)
}

fn decode_snapshot(
    catalog: &KindCatalog,
    snapshot: RecordMapping,
) -> StoreResult<Vec<(String, Record)>> {
    snapshot
        .into_iter()
        .map(|(key, value)| {
            let record = decode_entry(catalog, &key, value)?;
            Ok((key, record))
        })
        .collect()
}

fn decode_entry(catalog: &KindCatalog, key: &str, value: Value) -> StoreResult<Record> {
    let malformed = |reason: &str| StoreError::MalformedEntry {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let Value::Object(mapping) = value else {
        return Err(malformed("entry is not a JSON object"));
    };
    let kind = match mapping.get(CLASS_KEY) {
        Some(Value::String(kind)) => kind.clone(),
        Some(_) => return Err(malformed("`__class__` is not a string")),
        None => return Err(malformed("missing `__class__`")),
    };

    let spec = catalog
        .get(&kind)
        .ok_or_else(|| StoreError::UnknownKind(kind.clone()))?;
    let record = spec
        .reconstruct(mapping)
        .map_err(|source| StoreError::Record {
            key: key.to_string(),
            source,
        })?;

    let expected = record.key();
    if expected != key {
        return Err(StoreError::KeyMismatch {
            key: key.to_string(),
            expected,
        });
    }
    Ok(record)
}
