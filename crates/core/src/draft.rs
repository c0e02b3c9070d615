#![forbid(unsafe_code)]

use crate::record::Record;
use crate::schema::EntityType;
use serde_json::Value;
use std::collections::BTreeMap;

/// Where a relation column on a draft points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationTarget {
    /// A persisted entity: both the relation column and its version column
    /// get concrete values before the diff is taken.
    Existing { id: i64, version_id: i64 },
    /// Another in-flight change request in the same batch. The relation
    /// column is diffed as a null placeholder and a requirement edge is
    /// recorded so the resolver can substitute the real identity at commit.
    Pending { request_id: i64 },
}

/// An entity that does not exist yet: the input to a creation proposal.
#[derive(Clone, Debug, PartialEq)]
pub struct Draft {
    entity_type: EntityType,
    values: Record,
    relations: BTreeMap<String, RelationTarget>,
}

impl Draft {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            values: Record::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn values(&self) -> &Record {
        &self.values
    }

    pub fn relations(&self) -> impl Iterator<Item = (&str, RelationTarget)> {
        self.relations
            .iter()
            .map(|(column, target)| (column.as_str(), *target))
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.set(column, value);
    }

    pub fn relate_existing(&mut self, column: impl Into<String>, id: i64, version_id: i64) {
        self.relations
            .insert(column.into(), RelationTarget::Existing { id, version_id });
    }

    pub fn relate_pending(&mut self, column: impl Into<String>, request_id: i64) {
        self.relations
            .insert(column.into(), RelationTarget::Pending { request_id });
    }
}
