//! Record domain model.
//!
//! # Responsibility
//! - Define the persisted entity shared by every record kind.
//! - Convert records to and from their flat JSON mapping.
//!
//! # Invariants
//! - `id` and `created_at` never change after construction.
//! - `updated_at` only moves forward, and strictly on every `touch()`.
//! - Reserved keys never appear in the attribute bag.
//! - `from_mapping(to_mapping(r))` reproduces `r` exactly.

use chrono::{Local, NaiveDateTime, SubsecRound, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Flat JSON object form of one record, as stored in the snapshot file.
pub type RecordMapping = Map<String, Value>;

/// Discriminator key inside a serialized record.
pub const CLASS_KEY: &str = "__class__";
pub const ID_KEY: &str = "id";
pub const CREATED_AT_KEY: &str = "created_at";
pub const UPDATED_AT_KEY: &str = "updated_at";

/// Keys owned by the record itself; never stored in the attribute bag.
pub const RESERVED_KEYS: &[&str] = &[ID_KEY, CREATED_AT_KEY, UPDATED_AT_KEY, CLASS_KEY];

const TIMESTAMP_WRITE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
// `%.f` also accepts timestamps written without a fractional part.
const TIMESTAMP_READ_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Errors raised while building or mutating a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Record ids must contain at least one non-whitespace character.
    BlankId,
    /// A reserved field is absent from a serialized mapping.
    MissingField(&'static str),
    /// A reserved field has the wrong JSON type.
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    /// A timestamp field is not a valid ISO-8601 date-time.
    MalformedTimestamp { field: &'static str, value: String },
    /// Attempted to store a reserved key in the attribute bag.
    ReservedField(String),
    /// Serialized `__class__` names a different kind than the one rebuilding it.
    KindMismatch { expected: String, found: String },
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId => write!(f, "record id must not be blank"),
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
            Self::InvalidField { field, expected } => {
                write!(f, "field `{field}` must be a {expected}")
            }
            Self::MalformedTimestamp { field, value } => {
                write!(f, "field `{field}` is not an ISO-8601 timestamp: `{value}`")
            }
            Self::ReservedField(field) => {
                write!(f, "field `{field}` is reserved and cannot be set as an attribute")
            }
            Self::KindMismatch { expected, found } => {
                write!(f, "record kind `{found}` cannot be rebuilt as `{expected}`")
            }
        }
    }
}

impl Error for RecordError {}

/// Builds the composite registry key `"<kind>.<id>"`.
pub fn composite_key(kind: &str, id: &str) -> String {
    format!("{kind}.{id}")
}

/// Renders a timestamp in the canonical snapshot form (microsecond precision).
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_WRITE_FORMAT).to_string()
}

/// Parses a snapshot timestamp.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_READ_FORMAT).ok()
}

fn now_micros() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

/// One persisted entity: identity, timestamps and a free-form attribute bag.
///
/// Serde goes through [`RecordMapping`], so a `Record` serializes to exactly
/// the object written into the snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordMapping", into = "RecordMapping")]
pub struct Record {
    id: String,
    kind: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    attributes: RecordMapping,
}

impl Record {
    /// Creates a fresh record with a generated UUID and `created_at == updated_at`.
    ///
    /// The record is not registered anywhere; hand it to a store to make it live.
    pub fn new(kind: impl Into<String>) -> Self {
        Self::build(Uuid::new_v4().to_string(), kind.into())
    }

    /// Creates a fresh record with a caller-provided id.
    ///
    /// Used by imports and fixtures where identity already exists.
    pub fn with_id(id: impl Into<String>, kind: impl Into<String>) -> Result<Self, RecordError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RecordError::BlankId);
        }
        Ok(Self::build(id, kind.into()))
    }

    fn build(id: String, kind: String) -> Self {
        let now = now_micros();
        Self {
            id,
            kind,
            created_at: now,
            updated_at: now,
            attributes: RecordMapping::new(),
        }
    }

    /// Rebuilds a record from its serialized mapping.
    ///
    /// Identity and both timestamps come from the mapping; nothing is
    /// generated. Every non-reserved key lands in the attribute bag in input
    /// order.
    ///
    /// # Errors
    /// - `MissingField` / `InvalidField` for absent or mistyped reserved keys.
    /// - `MalformedTimestamp` when a timestamp does not parse.
    /// - `BlankId` when `id` is empty.
    pub fn from_mapping(mapping: RecordMapping) -> Result<Self, RecordError> {
        let mut id = None;
        let mut kind = None;
        let mut created_at = None;
        let mut updated_at = None;
        let mut attributes = RecordMapping::new();

        for (key, value) in mapping {
            match key.as_str() {
                ID_KEY => id = Some(value),
                CLASS_KEY => kind = Some(value),
                CREATED_AT_KEY => created_at = Some(value),
                UPDATED_AT_KEY => updated_at = Some(value),
                _ => {
                    attributes.insert(key, value);
                }
            }
        }

        let id = required_string(id, ID_KEY)?;
        if id.trim().is_empty() {
            return Err(RecordError::BlankId);
        }

        Ok(Self {
            id,
            kind: required_string(kind, CLASS_KEY)?,
            created_at: required_timestamp(created_at, CREATED_AT_KEY)?,
            updated_at: required_timestamp(updated_at, UPDATED_AT_KEY)?,
            attributes,
        })
    }

    /// Serializes this record: `id`, timestamps, attributes, then `__class__`.
    pub fn to_mapping(&self) -> RecordMapping {
        self.clone().into_mapping()
    }

    /// Consuming variant of [`Record::to_mapping`].
    pub fn into_mapping(self) -> RecordMapping {
        let mut mapping = RecordMapping::new();
        mapping.insert(ID_KEY.to_string(), Value::String(self.id));
        mapping.insert(
            CREATED_AT_KEY.to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        mapping.insert(
            UPDATED_AT_KEY.to_string(),
            Value::String(format_timestamp(&self.updated_at)),
        );
        mapping.extend(self.attributes);
        mapping.insert(CLASS_KEY.to_string(), Value::String(self.kind));
        mapping
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }

    /// Composite registry key for this record.
    pub fn key(&self) -> String {
        composite_key(&self.kind, &self.id)
    }

    /// Advances `updated_at` to now.
    ///
    /// If the clock has not moved past the previous value, the timestamp is
    /// bumped by one microsecond so consecutive touches stay strictly ordered.
    pub fn touch(&mut self) {
        let now = now_micros();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + TimeDelta::microseconds(1)
        };
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &RecordMapping {
        &self.attributes
    }

    /// Stores one attribute, returning the previous value if any.
    pub fn set_attribute(
        &mut self,
        name: impl Into<String>,
        value: Value,
    ) -> Result<Option<Value>, RecordError> {
        let name = name.into();
        if RESERVED_KEYS.contains(&name.as_str()) {
            return Err(RecordError::ReservedField(name));
        }
        Ok(self.attributes.insert(name, value))
    }

    /// Removes one attribute, keeping the order of the rest.
    pub fn remove_attribute(&mut self, name: &str) -> Option<Value> {
        self.attributes.shift_remove(name)
    }
}

impl TryFrom<RecordMapping> for Record {
    type Error = RecordError;

    fn try_from(value: RecordMapping) -> Result<Self, Self::Error> {
        Self::from_mapping(value)
    }
}

impl From<Record> for RecordMapping {
    fn from(value: Record) -> Self {
        value.into_mapping()
    }
}

/// Console rendering: `[Kind] (id) {"id": ..., "created_at": ..., ...}`.
impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] ({}) {{", self.kind, self.id)?;
        let mut mapping = self.to_mapping();
        mapping.shift_remove(CLASS_KEY);
        for (index, (key, value)) in mapping.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", Value::String(key.clone()), value)?;
        }
        f.write_str("}")
    }
}

fn required_string(value: Option<Value>, field: &'static str) -> Result<String, RecordError> {
    match value {
        Some(Value::String(text)) => Ok(text),
        Some(_) => Err(RecordError::InvalidField {
            field,
            expected: "string",
        }),
        None => Err(RecordError::MissingField(field)),
    }
}

fn required_timestamp(
    value: Option<Value>,
    field: &'static str,
) -> Result<NaiveDateTime, RecordError> {
    let text = required_string(value, field)?;
    parse_timestamp(&text).ok_or(RecordError::MalformedTimestamp { field, value: text })
}
