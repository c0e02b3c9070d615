#![forbid(unsafe_code)]

use trove_core::{ChangeStatus, Patch, Record};

/// An identified origin of data: an automated provider or a human principal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Provider,
    User,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "provider" => Some(Self::Provider),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRow {
    pub id: i64,
    pub name: String,
    pub kind: SourceKind,
    pub created_at_ms: i64,
}

/// Metadata of a content-addressed harvested document. The payload itself is
/// fetched separately via `document_payload`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDocumentRow {
    pub id: i64,
    pub source_id: i64,
    pub source_doc_id: String,
    pub content_hash: String,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingWorkRow {
    pub raw_document_id: i64,
    pub enqueued_at_ms: i64,
    pub source_id: i64,
    pub source_doc_id: String,
    pub content_hash: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeRequestRow {
    pub id: i64,
    pub status: ChangeStatus,
    pub patch: Patch,
    pub target_type: String,
    /// Null until a creation is accepted.
    pub target_id: Option<i64>,
    pub version_type: String,
    /// Row id of the version produced by acceptance.
    pub version_id: Option<i64>,
    /// Null when a principal submitted the request directly.
    pub raw_document_id: Option<i64>,
    pub submitted_by: i64,
    pub submitted_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeRequirementRow {
    pub dependent_id: i64,
    pub prerequisite_id: i64,
    pub field: String,
    pub version_field: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityRow {
    pub entity_type: String,
    pub id: i64,
    pub version_no: i64,
    pub record: Record,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityVersionRow {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: i64,
    pub version_no: i64,
    pub record: Record,
    pub change_request_id: i64,
    pub created_at_ms: i64,
}

/// Everything a successful accept produced, read back inside the same
/// transaction that committed it.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptedChange {
    pub request: ChangeRequestRow,
    pub entity: EntityRow,
    pub version: EntityVersionRow,
}
