//! Collection layout: where messages live and what a stored document must look like

pub mod indexes;

pub use indexes::{
    message_indexes, select_index, Direction, IndexKey, IndexSpec, PlannedBranch, QueryPlan,
    QueryShape, DEFAULT_MESSAGE_TTL,
};

use crate::error::{StoreError, StoreResult};
use crate::models::ContentType;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use validator::{ValidationError, ValidationErrors};

pub const DEFAULT_DATABASE: &str = "chat";
pub const DEFAULT_COLLECTION: &str = "messages";

const MAX_IDENTIFIER_LEN: usize = 63;

/// `database.collection` pair; a PostgreSQL schema and table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    database: String,
    collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> StoreResult<Self> {
        let database = database.into();
        let collection = collection.into();
        validate_identifier("database", &database)?;
        validate_identifier("collection", &collection)?;
        Ok(Self {
            database,
            collection,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Quoted `"schema"."table"` form for SQL
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.database, self.collection)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Identifiers are interpolated into DDL, so only `[a-z_][a-z0-9_]*` is accepted
pub fn validate_identifier(kind: &str, value: &str) -> StoreResult<()> {
    let mut chars = value.chars();
    let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_tail = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid_head || !valid_tail || value.len() > MAX_IDENTIFIER_LEN {
        return Err(StoreError::Config(format!(
            "invalid {kind} name {value:?}: expected [a-z_][a-z0-9_]*, \
             at most {MAX_IDENTIFIER_LEN} chars"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// RFC 3339 string on the wire, `TIMESTAMPTZ` in PostgreSQL
    Date,
    Bool,
    StringArray,
}

impl FieldKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Date => value
                .as_str()
                .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "a string",
            FieldKind::Date => "an RFC 3339 date",
            FieldKind::Bool => "a boolean",
            FieldKind::StringArray => "an array of strings",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Accepts an explicit `null`
    pub nullable: bool,
    pub allowed: Option<&'static [&'static str]>,
    pub unique_items: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            nullable: false,
            allowed: None,
            unique_items: false,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    const fn one_of(mut self, allowed: &'static [&'static str]) -> Self {
        self.allowed = Some(allowed);
        self
    }

    const fn unique(mut self) -> Self {
        self.unique_items = true;
        self
    }
}

const CONTENT_TYPES: &[&str] = &[
    ContentType::Text.as_str(),
    ContentType::Image.as_str(),
    ContentType::File.as_str(),
];

/// Document-level contract a collection enforces on every write
///
/// Unknown keys are tolerated. Mutual exclusion of `recipient_id` and
/// `group_id` is left to the typed [`crate::models::Message`] validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentValidator {
    fields: Vec<FieldSpec>,
}

impl DocumentValidator {
    pub fn message() -> Self {
        use FieldKind::{Bool, Date, StringArray, String as Text};
        Self {
            fields: vec![
                FieldSpec::new("id", Text).required(),
                FieldSpec::new("sender_id", Text).required(),
                FieldSpec::new("recipient_id", Text).nullable(),
                FieldSpec::new("group_id", Text).nullable(),
                FieldSpec::new("content", Text).required(),
                FieldSpec::new("content_type", Text)
                    .required()
                    .one_of(CONTENT_TYPES),
                FieldSpec::new("timestamp", Date).required(),
                FieldSpec::new("read_by", StringArray).unique(),
                FieldSpec::new("delivered_to", StringArray).unique(),
                FieldSpec::new("reply_to_id", Text).nullable(),
                FieldSpec::new("attachments", StringArray),
                FieldSpec::new("is_edited", Bool),
                FieldSpec::new("edit_timestamp", Date).nullable(),
            ],
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn validate(&self, document: &Value) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut failed = false;

        let Some(object) = document.as_object() else {
            errors.add(
                "__document__",
                error_with_message("type", "document must be a JSON object".into()),
            );
            return Err(errors);
        };

        for field in &self.fields {
            if let Some(err) = check_field(field, object) {
                errors.add(field.name, err);
                failed = true;
            }
        }

        if !failed {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn check_field(field: &FieldSpec, object: &Map<String, Value>) -> Option<ValidationError> {
    let value = match object.get(field.name) {
        None if field.required => {
            return Some(error_with_message(
                "required",
                format!("{} is required", field.name),
            ))
        }
        None => return None,
        Some(Value::Null) if field.nullable && !field.required => return None,
        Some(value) => value,
    };

    if !field.kind.matches(value) {
        let nullable = if field.nullable { " or null" } else { "" };
        return Some(error_with_message(
            "type",
            format!("{} must be {}{}", field.name, field.kind.describe(), nullable),
        ));
    }

    if let (Some(allowed), Some(s)) = (field.allowed, value.as_str()) {
        if !allowed.contains(&s) {
            let mut err = error_with_message(
                "enum",
                format!("{} must be one of: {}", field.name, allowed.join(", ")),
            );
            err.add_param("value".into(), &s);
            return Some(err);
        }
    }

    if field.unique_items {
        if let Some(items) = value.as_array() {
            let mut seen = HashSet::with_capacity(items.len());
            if !items.iter().filter_map(Value::as_str).all(|s| seen.insert(s)) {
                return Some(error_with_message(
                    "unique_items",
                    format!("{} must not contain duplicates", field.name),
                ));
            }
        }
    }

    None
}

fn error_with_message(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}
