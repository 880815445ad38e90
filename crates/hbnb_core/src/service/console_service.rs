//! Console use-case service.
//!
//! # Responsibility
//! - Expose create/show/destroy/list/count/update to the line interpreter.
//! - Coerce textual update values using kind field descriptors.
//!
//! # Invariants
//! - Every mutating call ends with a full store save.
//! - A failed save rolls the in-memory change back, so the registry never
//!   holds a change the console reported as failed.
//! - Reserved fields (`id`, timestamps, `__class__`) are never updated.
//! - Undeclared fields that are absent from the record are rejected, not
//!   silently created.

use crate::model::kind::{coerce, coerce_like, CoerceError};
use crate::model::record::{composite_key, RESERVED_KEYS};
use crate::repo::record_store::{RecordStore, StoreError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for console use-cases.
#[derive(Debug)]
pub enum ServiceError {
    UnknownKind(String),
    NotFound {
        kind: String,
        id: String,
    },
    /// Field is neither declared for the kind nor present on the record.
    UnknownAttribute {
        kind: String,
        field: String,
    },
    /// Field is owned by the record itself.
    ProtectedAttribute(String),
    InvalidValue {
        field: String,
        source: CoerceError,
    },
    /// Persistence-layer failure.
    Store(StoreError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownKind(kind) => write!(f, "unknown record kind: {kind}"),
            Self::NotFound { kind, id } => write!(f, "record not found: {kind}.{id}"),
            Self::UnknownAttribute { kind, field } => {
                write!(f, "{kind} does not contain attribute `{field}`")
            }
            Self::ProtectedAttribute(field) => write!(f, "attribute `{field}` is read-only"),
            Self::InvalidValue { field, source } => {
                write!(f, "invalid value for `{field}`: {source}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidValue { source, .. } => Some(source),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::UnknownKind(kind) => Self::UnknownKind(kind),
            StoreError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Store(other),
        }
    }
}

/// Console facade over a record store.
pub struct ConsoleService<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> ConsoleService<S> {
    /// Creates a service using the provided store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Whether `kind` is registered in the store's catalog.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.store.catalog().contains(kind)
    }

    /// Whether a record lives under `kind.id`.
    pub fn exists(&self, kind: &str, id: &str) -> bool {
        self.store.get(kind, id).is_ok()
    }

    /// Creates and persists a fresh record, returning its id.
    ///
    /// A failed save unregisters the new record again.
    pub fn create(&mut self, kind: &str) -> ServiceResult<String> {
        let id = self.store.create(kind)?;
        if let Err(err) = self.store.persist(kind, &id) {
            match self.store.delete(kind, &id) {
                Ok(_) => warn!(
                    "event=console_create module=service status=rolled_back kind={kind} id={id}"
                ),
                Err(rollback) => error!(
                    "event=console_create module=service status=error kind={kind} id={id} error={rollback}"
                ),
            }
            return Err(err.into());
        }
        info!("event=console_create module=service status=ok kind={kind} id={id}");
        Ok(id)
    }

    /// Renders one record.
    pub fn show(&self, kind: &str, id: &str) -> ServiceResult<String> {
        self.require_kind(kind)?;
        Ok(self.store.get(kind, id)?.to_string())
    }

    /// Deletes one record and saves the store.
    ///
    /// A failed save puts the record back at its previous position.
    pub fn destroy(&mut self, kind: &str, id: &str) -> ServiceResult<()> {
        self.require_kind(kind)?;
        let key = composite_key(kind, id);
        let index = self.store.all().get_index_of(&key);
        let removed = self.store.delete(kind, id)?;
        if let Err(err) = self.store.save() {
            let objects = self.store.all_mut();
            match index {
                Some(index) => objects.shift_insert(index, key, removed),
                None => objects.insert(key, removed),
            };
            warn!("event=console_destroy module=service status=rolled_back kind={kind} id={id}");
            return Err(err.into());
        }
        info!("event=console_destroy module=service status=ok kind={kind} id={id}");
        Ok(())
    }

    /// Renders every record, or every record of one kind, in insertion order.
    pub fn list(&self, kind: Option<&str>) -> ServiceResult<Vec<String>> {
        match kind {
            Some(kind) => {
                self.require_kind(kind)?;
                Ok(self
                    .store
                    .all_of_kind(kind)
                    .into_iter()
                    .map(ToString::to_string)
                    .collect())
            }
            None => Ok(self.store.all().values().map(ToString::to_string).collect()),
        }
    }

    /// Counts every record, or every record of one kind.
    pub fn count(&self, kind: Option<&str>) -> ServiceResult<usize> {
        match kind {
            Some(kind) => {
                self.require_kind(kind)?;
                Ok(self.store.all_of_kind(kind).len())
            }
            None => Ok(self.store.all().len()),
        }
    }

    /// Sets one attribute from console text and persists the record.
    ///
    /// # Contract
    /// - Declared field: value is coerced to the declared type.
    /// - Undeclared field already on the record: value follows the existing
    ///   JSON type.
    /// - Any other field: `UnknownAttribute`.
    pub fn update(&mut self, kind: &str, id: &str, field: &str, value: &str) -> ServiceResult<()> {
        self.require_kind(kind)?;
        if RESERVED_KEYS.contains(&field) {
            return Err(ServiceError::ProtectedAttribute(field.to_string()));
        }

        let declared = self
            .store
            .catalog()
            .get(kind)
            .and_then(|spec| spec.declared(field))
            .map(|spec| spec.field_type);
        let record = self.store.get(kind, id)?;
        let coerced = match (declared, record.attribute(field)) {
            (Some(field_type), _) => coerce(field_type, value),
            (None, Some(existing)) => coerce_like(existing, value),
            (None, None) => {
                return Err(ServiceError::UnknownAttribute {
                    kind: kind.to_string(),
                    field: field.to_string(),
                })
            }
        }
        .map_err(|source| ServiceError::InvalidValue {
            field: field.to_string(),
            source,
        })?;

        let before = record.clone();
        self.store
            .get_mut(kind, id)?
            .set_attribute(field, coerced)
            .map_err(|_| ServiceError::ProtectedAttribute(field.to_string()))?;
        if let Err(err) = self.store.persist(kind, id) {
            // Restores the attribute and `updated_at` together.
            if let Ok(slot) = self.store.get_mut(kind, id) {
                *slot = before;
            }
            warn!("event=console_update module=service status=rolled_back kind={kind} id={id} field={field}");
            return Err(err.into());
        }
        info!("event=console_update module=service status=ok kind={kind} id={id} field={field}");
        Ok(())
    }

    fn require_kind(&self, kind: &str) -> ServiceResult<()> {
        if self.has_kind(kind) {
            Ok(())
        } else {
            Err(ServiceError::UnknownKind(kind.to_string()))
        }
    }
}
