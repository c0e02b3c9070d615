#![forbid(unsafe_code)]

use crate::store::types::SourceKind;
use trove_core::{Draft, EntityType, Record};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateSourceRequest {
    pub name: String,
    pub kind: SourceKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreDocumentRequest {
    pub source_id: i64,
    pub source_doc_id: String,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProposeCreateRequest {
    pub draft: Draft,
    pub submitted_by: i64,
    pub raw_document_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProposeUpdateRequest {
    pub entity_type: EntityType,
    pub entity_id: i64,
    /// The modified field set; diffed against the committed snapshot.
    pub draft: Record,
    pub submitted_by: i64,
    pub raw_document_id: Option<i64>,
}
