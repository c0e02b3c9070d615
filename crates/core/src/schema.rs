#![forbid(unsafe_code)]

use crate::record::Record;
use std::collections::BTreeMap;

/// Discriminator naming one concrete entity kind in the registry.
///
/// Polymorphic references are stored as a tagged pair of this discriminator
/// plus a numeric identity, never as a runtime type lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityType(String);

impl EntityType {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, EntityTypeError> {
        let value = value.into();
        validate_entity_type(&value)?;
        Ok(Self(value))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityTypeError {
    Empty,
    TooLong,
    InvalidFirstChar,
    InvalidChar { ch: char, index: usize },
}

impl EntityTypeError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "entity type must not be empty",
            Self::TooLong => "entity type is too long",
            Self::InvalidFirstChar => "entity type must start with a lowercase letter",
            Self::InvalidChar { .. } => "entity type may contain only [a-z0-9_]",
        }
    }
}

fn validate_entity_type(value: &str) -> Result<(), EntityTypeError> {
    if value.is_empty() {
        return Err(EntityTypeError::Empty);
    }
    if value.len() > 128 {
        return Err(EntityTypeError::TooLong);
    }
    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(EntityTypeError::Empty);
    };
    if !first.is_ascii_lowercase() {
        return Err(EntityTypeError::InvalidFirstChar);
    }
    for (index, ch) in value.chars().enumerate() {
        if index == 0 {
            continue;
        }
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            continue;
        }
        return Err(EntityTypeError::InvalidChar { ch, index });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    /// A reference to another registered entity. `version_column` is the
    /// paired column holding the referenced entity's version identity.
    Relation {
        target: EntityType,
        version_column: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub column: String,
    pub kind: FieldKind,
    pub editable: bool,
}

impl FieldDef {
    pub fn scalar(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: FieldKind::Scalar,
            editable: true,
        }
    }

    /// A computed column excluded from diffs and patches.
    pub fn derived(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            kind: FieldKind::Scalar,
            editable: false,
        }
    }

    pub fn relation(
        column: impl Into<String>,
        target: EntityType,
        version_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            kind: FieldKind::Relation {
                target,
                version_column: version_column.into(),
            },
            editable: true,
        }
    }
}

/// A structural invariant checked when a committed entity is materialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaCheck {
    Required { column: String },
    Distinct { left: String, right: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchemaViolation {
    MissingRequired { column: String },
    NotDistinct { left: String, right: String },
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { column } => write!(f, "required column is missing: {column}"),
            Self::NotDistinct { left, right } => {
                write!(f, "columns must hold distinct values: {left}, {right}")
            }
        }
    }
}

impl std::error::Error for SchemaViolation {}

/// The statically-known shape of one entity kind: its columns, which of them
/// are editable, its relations, and the invariants checked at commit time.
#[derive(Clone, Debug)]
pub struct EntitySchema {
    entity_type: EntityType,
    version_type: EntityType,
    fields: Vec<FieldDef>,
    checks: Vec<SchemaCheck>,
}

impl EntitySchema {
    pub fn new(entity_type: EntityType, version_type: EntityType, fields: Vec<FieldDef>) -> Self {
        Self {
            entity_type,
            version_type,
            fields,
            checks: Vec::new(),
        }
    }

    pub fn with_checks(mut self, checks: Vec<SchemaCheck>) -> Self {
        self.checks = checks;
        self
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn version_type(&self) -> &EntityType {
        &self.version_type
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, column: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|field| field.column == column)
    }

    pub fn relation_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|field| field.editable && matches!(field.kind, FieldKind::Relation { .. }))
    }

    /// Whether `column` participates in diffs: an editable declared column,
    /// or the version companion of an editable relation.
    pub fn is_editable_column(&self, column: &str) -> bool {
        self.fields.iter().any(|field| {
            if !field.editable {
                return false;
            }
            if field.column == column {
                return true;
            }
            matches!(&field.kind, FieldKind::Relation { version_column, .. } if version_column == column)
        })
    }

    /// Projects `record` down to its editable columns. Derived and unknown
    /// columns never reach the patch engine.
    pub fn editable_snapshot(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(column, _)| self.is_editable_column(column))
            .map(|(column, value)| (column.to_string(), value.clone()))
            .collect()
    }

    pub fn validate(&self, record: &Record) -> Result<(), SchemaViolation> {
        for check in &self.checks {
            match check {
                SchemaCheck::Required { column } => match record.get(column) {
                    Some(value) if !value.is_null() => {}
                    _ => {
                        return Err(SchemaViolation::MissingRequired {
                            column: column.clone(),
                        });
                    }
                },
                SchemaCheck::Distinct { left, right } => {
                    if let (Some(a), Some(b)) = (record.get(left), record.get(right)) {
                        if !a.is_null() && a == b {
                            return Err(SchemaViolation::NotDistinct {
                                left: left.clone(),
                                right: right.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateType(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateType(entity_type) => {
                write!(f, "entity type registered twice: {entity_type}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Maps type discriminators to schemas. Built once, before any store is
/// opened; resolution never falls back to reflection.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: EntitySchema) -> Result<(), RegistryError> {
        let key = schema.entity_type().as_str().to_string();
        if self.schemas.contains_key(&key) {
            return Err(RegistryError::DuplicateType(key));
        }
        self.schemas.insert(key, schema);
        Ok(())
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.schemas.get(entity_type)
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }
}
