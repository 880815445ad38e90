//! Core object store for hbnb.
//! Records, the kind catalog and the JSON snapshot registry live here.

pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::kind::{
    coerce, coerce_like, CatalogError, CoerceError, FieldSpec, FieldType, KindCatalog, KindSpec,
};
pub use model::record::{composite_key, Record, RecordError, RecordMapping};
pub use repo::record_store::{
    JsonFileStore, RecordStore, StoreError, StoreResult, DEFAULT_STORE_FILE,
};
pub use service::console_service::{ConsoleService, ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
