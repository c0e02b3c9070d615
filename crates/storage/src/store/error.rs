#![forbid(unsafe_code)]

use trove_core::{ChangeStatus, PatchError, SchemaViolation};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    Json(serde_json::Error),
    InvalidInput(&'static str),
    UnknownId,
    UnknownEntityType(String),
    SourceAlreadyExists,
    /// accept/reject was called on a request outside the Pending state and
    /// `force` did not apply.
    InvalidState {
        id: i64,
        status: ChangeStatus,
    },
    /// The named prerequisite has not been accepted. Enforced even under
    /// `force`.
    UnsatisfiedDependency {
        dependent_id: i64,
        prerequisite_id: i64,
    },
    Patch(PatchError),
    Validation(SchemaViolation),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::Json(err) => write!(f, "json: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UnknownId => write!(f, "unknown id"),
            Self::UnknownEntityType(entity_type) => {
                write!(f, "unknown entity type: {entity_type}")
            }
            Self::SourceAlreadyExists => write!(f, "source already exists"),
            Self::InvalidState { id, status } => {
                write!(f, "change request {id} is {status}, not pending")
            }
            Self::UnsatisfiedDependency {
                dependent_id,
                prerequisite_id,
            } => write!(
                f,
                "change request {dependent_id} requires change request {prerequisite_id} to be accepted first"
            ),
            Self::Patch(err) => write!(f, "patch: {err}"),
            Self::Validation(violation) => write!(f, "validation: {violation}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<PatchError> for StoreError {
    fn from(value: PatchError) -> Self {
        Self::Patch(value)
    }
}

impl From<SchemaViolation> for StoreError {
    fn from(value: SchemaViolation) -> Self {
        Self::Validation(value)
    }
}
