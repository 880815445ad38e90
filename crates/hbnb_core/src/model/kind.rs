//! Record kinds, field descriptors and the discriminator table.
//!
//! # Responsibility
//! - Declare the fields each record kind knows about (name, type, default).
//! - Map serialized `__class__` discriminators to kind descriptors.
//! - Coerce console text into typed attribute values.
//!
//! # Invariants
//! - Kind names are non-empty ASCII alphanumerics/underscore (no `.`), so
//!   the composite key `"<kind>.<id>"` always splits at its first dot.
//! - A catalog never holds two kinds with the same name.

use crate::model::record::{Record, RecordError, RecordMapping, RESERVED_KEYS};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Declared type of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Float,
    /// List of strings, e.g. `Place.amenity_ids`.
    StringList,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::StringList => "string list",
        }
    }

    /// Zero value used when a field spec does not name its own default.
    pub fn zero_value(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Integer => Value::from(0_i64),
            Self::Float => Value::from(0.0_f64),
            Self::StringList => Value::Array(Vec::new()),
        }
    }
}

/// Descriptor for one declared attribute of a kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub default: Value,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            default: field_type.zero_value(),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

/// Descriptor for one record kind; acts as its constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct KindSpec {
    name: String,
    fields: Vec<FieldSpec>,
}

impl KindSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Declares a field with the type's zero value as default.
    pub fn field(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field_spec(FieldSpec::new(name, field_type))
    }

    pub fn field_spec(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks up a declared field by name.
    pub fn declared(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.name == field)
    }

    /// Builds a fresh record of this kind with every declared default set.
    pub fn instantiate(&self) -> Record {
        let mut record = Record::new(self.name.as_str());
        self.apply_defaults(&mut record);
        record
    }

    /// Like [`KindSpec::instantiate`] with a caller-provided id.
    pub fn instantiate_with_id(&self, id: impl Into<String>) -> Result<Record, RecordError> {
        let mut record = Record::with_id(id, self.name.as_str())?;
        self.apply_defaults(&mut record);
        Ok(record)
    }

    /// Rebuilds a serialized record of this kind.
    ///
    /// Attributes are copied verbatim; declared defaults are not back-filled,
    /// so the rebuilt record serializes to exactly its input. The mapping's
    /// `__class__` must name this kind.
    pub fn reconstruct(&self, mapping: RecordMapping) -> Result<Record, RecordError> {
        let record = Record::from_mapping(mapping)?;
        if record.kind() != self.name {
            return Err(RecordError::KindMismatch {
                expected: self.name.clone(),
                found: record.kind().to_string(),
            });
        }
        Ok(record)
    }

    fn apply_defaults(&self, record: &mut Record) {
        for spec in &self.fields {
            // Declared names never collide with reserved keys; see `KindCatalog::register`.
            let applied = record.set_attribute(spec.name.as_str(), spec.default.clone());
            debug_assert!(applied.is_ok(), "reserved field declared on {}", self.name);
        }
    }
}

/// Catalog registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    InvalidKindName(String),
    DuplicateKind(String),
    ReservedFieldName { kind: String, field: String },
}

impl Display for CatalogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKindName(name) => write!(f, "kind name is invalid: `{name}`"),
            Self::DuplicateKind(name) => write!(f, "kind already registered: {name}"),
            Self::ReservedFieldName { kind, field } => {
                write!(f, "kind {kind} declares reserved field `{field}`")
            }
        }
    }
}

impl Error for CatalogError {}

/// Discriminator → kind table consulted when records are created or reloaded.
#[derive(Debug, Clone, Default)]
pub struct KindCatalog {
    kinds: BTreeMap<String, KindSpec>,
}

impl KindCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in kinds.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for spec in builtin_kinds() {
            catalog.register(spec).expect("valid builtin kind");
        }
        catalog
    }

    /// Registers one kind.
    pub fn register(&mut self, spec: KindSpec) -> Result<(), CatalogError> {
        if !is_valid_kind_name(&spec.name) {
            return Err(CatalogError::InvalidKindName(spec.name));
        }
        if let Some(field) = spec
            .fields
            .iter()
            .find(|field| RESERVED_KEYS.contains(&field.name.as_str()))
        {
            return Err(CatalogError::ReservedFieldName {
                kind: spec.name.clone(),
                field: field.name.clone(),
            });
        }
        if self.kinds.contains_key(&spec.name) {
            return Err(CatalogError::DuplicateKind(spec.name));
        }

        self.kinds.insert(spec.name.clone(), spec);
        Ok(())
    }

    /// Builder form of [`KindCatalog::register`].
    pub fn with_kind(mut self, spec: KindSpec) -> Result<Self, CatalogError> {
        self.register(spec)?;
        Ok(self)
    }

    pub fn get(&self, kind: &str) -> Option<&KindSpec> {
        self.kinds.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Returns sorted kind names.
    pub fn names(&self) -> Vec<String> {
        self.kinds.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

fn is_valid_kind_name(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn builtin_kinds() -> Vec<KindSpec> {
    vec![
        KindSpec::new("BaseModel"),
        KindSpec::new("User")
            .field("email", FieldType::String)
            .field("password", FieldType::String)
            .field("first_name", FieldType::String)
            .field("last_name", FieldType::String),
        KindSpec::new("State").field("name", FieldType::String),
        KindSpec::new("City")
            .field("state_id", FieldType::String)
            .field("name", FieldType::String),
        KindSpec::new("Amenity").field("name", FieldType::String),
        KindSpec::new("Place")
            .field("city_id", FieldType::String)
            .field("user_id", FieldType::String)
            .field("name", FieldType::String)
            .field("description", FieldType::String)
            .field("number_rooms", FieldType::Integer)
            .field("number_bathrooms", FieldType::Integer)
            .field("max_guest", FieldType::Integer)
            .field("price_by_night", FieldType::Integer)
            .field("latitude", FieldType::Float)
            .field("longitude", FieldType::Float)
            .field("amenity_ids", FieldType::StringList),
        KindSpec::new("Review")
            .field("place_id", FieldType::String)
            .field("user_id", FieldType::String)
            .field("text", FieldType::String),
    ]
}

/// Text could not be converted to the target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoerceError {
    pub expected: &'static str,
    pub value: String,
}

impl Display for CoerceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {}, got `{}`", self.expected, self.value)
    }
}

impl Error for CoerceError {}

/// Converts console text into a value of the declared field type.
///
/// String lists accept either a JSON array of strings or a comma-separated
/// list (`a, b, c`); blank items are dropped.
pub fn coerce(field_type: FieldType, text: &str) -> Result<Value, CoerceError> {
    let invalid = || CoerceError {
        expected: field_type.as_str(),
        value: text.to_string(),
    };

    match field_type {
        FieldType::String => Ok(Value::String(text.to_string())),
        FieldType::Integer => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid()),
        FieldType::Float => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        FieldType::StringList => {
            let trimmed = text.trim();
            if trimmed.starts_with('[') {
                serde_json::from_str::<Vec<String>>(trimmed)
                    .map(Value::from)
                    .map_err(|_| invalid())
            } else {
                Ok(Value::from(
                    trimmed
                        .split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(str::to_string)
                        .collect::<Vec<_>>(),
                ))
            }
        }
    }
}

/// Converts console text to the JSON type of an existing undeclared value.
///
/// Strings, integers, floats and booleans keep their type; any other
/// existing type is replaced by the text as a plain string.
pub fn coerce_like(existing: &Value, text: &str) -> Result<Value, CoerceError> {
    match existing {
        Value::Number(number) if number.is_f64() => coerce(FieldType::Float, text),
        Value::Number(_) => coerce(FieldType::Integer, text),
        Value::Bool(_) => text
            .trim()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| CoerceError {
                expected: "boolean",
                value: text.to_string(),
            }),
        _ => Ok(Value::String(text.to_string())),
    }
}
