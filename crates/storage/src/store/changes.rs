#![forbid(unsafe_code)]

use super::documents::raw_document_exists_tx;
use super::entities::{ensure_entity_exists_tx, entity_tx, head_version_id_tx};
use super::sources::ensure_source_exists_tx;
use super::*;
use serde_json::Value;
use tracing::info;
use trove_core::{ChangeStatus, FieldKind, Patch, Record, RelationTarget};

/// A pending relation gathered off a draft: which columns to rewrite at
/// commit, and which request must land first.
struct PendingRelation {
    field: String,
    version_field: String,
    prerequisite_id: i64,
    expected_type: String,
}

impl SqliteStore {
    /// Proposes creating a new entity. Nothing is materialized: the draft is
    /// reduced to a patch against the blank record, relations to other
    /// in-flight requests become requirement edges, and everything waits for
    /// `accept`.
    pub fn propose_create(
        &mut self,
        request: ProposeCreateRequest,
    ) -> Result<ChangeRequestRow, StoreError> {
        let ProposeCreateRequest {
            draft,
            submitted_by,
            raw_document_id,
        } = request;

        let schema = self
            .registry
            .get(draft.entity_type().as_str())
            .ok_or_else(|| StoreError::UnknownEntityType(draft.entity_type().as_str().to_string()))?;

        let mut record = Record::new();
        for (column, value) in draft.values().iter() {
            let Some(field) = schema.field(column) else {
                return Err(StoreError::InvalidInput("unknown column on draft"));
            };
            if !field.editable {
                return Err(StoreError::InvalidInput("column is not editable"));
            }
            if matches!(field.kind, FieldKind::Relation { .. }) {
                return Err(StoreError::InvalidInput(
                    "relation columns must be set through draft relations",
                ));
            }
            record.set(column, value.clone());
        }

        let mut existing_refs: Vec<(String, i64)> = Vec::new();
        let mut pending_relations: Vec<PendingRelation> = Vec::new();
        for (column, target) in draft.relations() {
            let Some(field) = schema.field(column) else {
                return Err(StoreError::InvalidInput("unknown relation column on draft"));
            };
            if !field.editable {
                return Err(StoreError::InvalidInput("column is not editable"));
            }
            let FieldKind::Relation {
                target: target_type,
                version_column,
            } = &field.kind
            else {
                return Err(StoreError::InvalidInput(
                    "draft relation set on a non-relation column",
                ));
            };
            match target {
                RelationTarget::Existing { id, version_id } => {
                    record.set(column, Value::from(id));
                    record.set(version_column.clone(), Value::from(version_id));
                    existing_refs.push((target_type.as_str().to_string(), id));
                }
                RelationTarget::Pending { request_id } => {
                    record.set(column, Value::Null);
                    pending_relations.push(PendingRelation {
                        field: column.to_string(),
                        version_field: version_column.clone(),
                        prerequisite_id: request_id,
                        expected_type: target_type.as_str().to_string(),
                    });
                }
            }
        }

        let target_type = schema.entity_type().as_str().to_string();
        let version_type = schema.version_type().as_str().to_string();
        let patch = Patch::diff(None, &record);
        let patch_json = serde_json::to_string(&patch)?;
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        ensure_source_exists_tx(&tx, submitted_by)?;
        if let Some(raw_id) = raw_document_id {
            if !raw_document_exists_tx(&tx, raw_id)? {
                return Err(StoreError::UnknownId);
            }
        }
        for (entity_type, id) in &existing_refs {
            ensure_entity_exists_tx(&tx, entity_type, *id)?;
        }

        tx.execute(
            "INSERT INTO change_requests(status, patch_json, target_type, target_id, version_type, version_id, raw_document_id, submitted_by, submitted_at_ms) \
             VALUES (?1, ?2, ?3, NULL, ?4, NULL, ?5, ?6, ?7)",
            params![
                ChangeStatus::Pending.as_str(),
                patch_json,
                target_type,
                version_type,
                raw_document_id,
                submitted_by,
                now_ms
            ],
        )?;
        let id = tx.last_insert_rowid();

        for relation in &pending_relations {
            let Some(prerequisite) = change_request_tx(&tx, relation.prerequisite_id)? else {
                return Err(StoreError::UnknownId);
            };
            if prerequisite.target_type != relation.expected_type {
                return Err(StoreError::InvalidInput(
                    "prerequisite targets a different entity type",
                ));
            }
            tx.execute(
                "INSERT INTO change_requirements(dependent_id, prerequisite_id, field, version_field) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id,
                    relation.prerequisite_id,
                    relation.field,
                    relation.version_field
                ],
            )?;
        }

        tx.commit()?;
        info!(
            request = id,
            entity_type = %target_type,
            requirements = pending_relations.len(),
            "proposed entity creation"
        );
        Ok(ChangeRequestRow {
            id,
            status: ChangeStatus::Pending,
            patch,
            target_type,
            target_id: None,
            version_type,
            version_id: None,
            raw_document_id,
            submitted_by,
            submitted_at_ms: now_ms,
        })
    }

    /// Proposes updating an existing entity. The draft is projected down to
    /// the schema's editable columns before diffing, so derived columns can
    /// never leak into a patch.
    pub fn propose_update(
        &mut self,
        request: ProposeUpdateRequest,
    ) -> Result<ChangeRequestRow, StoreError> {
        let ProposeUpdateRequest {
            entity_type,
            entity_id,
            draft,
            submitted_by,
            raw_document_id,
        } = request;

        let schema = self
            .registry
            .get(entity_type.as_str())
            .ok_or_else(|| StoreError::UnknownEntityType(entity_type.as_str().to_string()))?;

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        ensure_source_exists_tx(&tx, submitted_by)?;
        if let Some(raw_id) = raw_document_id {
            if !raw_document_exists_tx(&tx, raw_id)? {
                return Err(StoreError::UnknownId);
            }
        }

        let Some(entity) = entity_tx(&tx, entity_type.as_str(), entity_id)? else {
            return Err(StoreError::UnknownId);
        };
        let Some(head_version_id) = head_version_id_tx(&tx, entity_type.as_str(), entity_id)?
        else {
            return Err(StoreError::UnknownId);
        };

        for column in draft.columns() {
            if schema.field(column).is_none() && !schema.is_editable_column(column) {
                return Err(StoreError::InvalidInput("unknown column on draft"));
            }
        }

        let before = schema.editable_snapshot(&entity.record);
        let after = schema.editable_snapshot(&draft);
        let patch = Patch::diff(Some(&before), &after);
        let patch_json = serde_json::to_string(&patch)?;

        let target_type = schema.entity_type().as_str().to_string();
        let version_type = schema.version_type().as_str().to_string();

        tx.execute(
            "INSERT INTO change_requests(status, patch_json, target_type, target_id, version_type, version_id, raw_document_id, submitted_by, submitted_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                ChangeStatus::Pending.as_str(),
                patch_json,
                target_type,
                entity_id,
                version_type,
                head_version_id,
                raw_document_id,
                submitted_by,
                now_ms
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(
            request = id,
            entity_type = %target_type,
            entity_id,
            ops = patch.len(),
            "proposed entity update"
        );
        Ok(ChangeRequestRow {
            id,
            status: ChangeStatus::Pending,
            patch,
            target_type,
            target_id: Some(entity_id),
            version_type,
            version_id: Some(head_version_id),
            raw_document_id,
            submitted_by,
            submitted_at_ms: now_ms,
        })
    }

    pub fn get_change_request(&self, id: i64) -> Result<Option<ChangeRequestRow>, StoreError> {
        let raw = self
            .conn
            .query_row(
                "SELECT id, status, patch_json, target_type, target_id, version_type, version_id, raw_document_id, submitted_by, submitted_at_ms \
                 FROM change_requests WHERE id=?1",
                params![id],
                read_raw_change_row,
            )
            .optional()?;
        raw.map(finish_change_row).transpose()
    }

    pub fn list_change_requests(
        &self,
        status: Option<ChangeStatus>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChangeRequestRow>, StoreError> {
        let limit = to_sqlite_i64(limit)?;
        let offset = to_sqlite_i64(offset)?;

        let mut out = Vec::new();
        match status {
            Some(status) => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, status, patch_json, target_type, target_id, version_type, version_id, raw_document_id, submitted_by, submitted_at_ms \
                     FROM change_requests WHERE status=?1 \
                     ORDER BY id ASC LIMIT ?2 OFFSET ?3",
                )?;
                let mut rows = stmt.query(params![status.as_str(), limit, offset])?;
                while let Some(row) = rows.next()? {
                    out.push(finish_change_row(read_raw_change_row(row)?)?);
                }
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, status, patch_json, target_type, target_id, version_type, version_id, raw_document_id, submitted_by, submitted_at_ms \
                     FROM change_requests \
                     ORDER BY id ASC LIMIT ?1 OFFSET ?2",
                )?;
                let mut rows = stmt.query(params![limit, offset])?;
                while let Some(row) = rows.next()? {
                    out.push(finish_change_row(read_raw_change_row(row)?)?);
                }
            }
        }
        Ok(out)
    }

    /// Requirement edges hanging off one dependent request, in field order.
    pub fn requirements_for(
        &self,
        dependent_id: i64,
    ) -> Result<Vec<ChangeRequirementRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT dependent_id, prerequisite_id, field, version_field \
             FROM change_requirements WHERE dependent_id=?1 \
             ORDER BY field ASC",
        )?;

        let mut rows = stmt.query(params![dependent_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(ChangeRequirementRow {
                dependent_id: row.get(0)?,
                prerequisite_id: row.get(1)?,
                field: row.get(2)?,
                version_field: row.get(3)?,
            });
        }
        Ok(out)
    }

    /// Pending requests that can never be accepted because at least one of
    /// their prerequisites was rejected. Rejection does not cascade, so this
    /// is how stuck work surfaces.
    pub fn list_blocked_requests(&self) -> Result<Vec<ChangeRequestRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT c.id, c.status, c.patch_json, c.target_type, c.target_id, c.version_type, c.version_id, c.raw_document_id, c.submitted_by, c.submitted_at_ms \
             FROM change_requests c \
             JOIN change_requirements q ON q.dependent_id = c.id \
             JOIN change_requests p ON p.id = q.prerequisite_id \
             WHERE c.status='pending' AND p.status='rejected' \
             ORDER BY c.id ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(finish_change_row(read_raw_change_row(row)?)?);
        }
        Ok(out)
    }
}

type RawChangeRow = (
    i64,
    String,
    String,
    String,
    Option<i64>,
    String,
    Option<i64>,
    Option<i64>,
    i64,
    i64,
);

fn read_raw_change_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChangeRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn finish_change_row(raw: RawChangeRow) -> Result<ChangeRequestRow, StoreError> {
    let (
        id,
        status,
        patch_json,
        target_type,
        target_id,
        version_type,
        version_id,
        raw_document_id,
        submitted_by,
        submitted_at_ms,
    ) = raw;

    let status =
        ChangeStatus::parse(&status).ok_or(StoreError::InvalidInput("invalid change status"))?;
    let patch: Patch = serde_json::from_str(&patch_json)?;

    Ok(ChangeRequestRow {
        id,
        status,
        patch,
        target_type,
        target_id,
        version_type,
        version_id,
        raw_document_id,
        submitted_by,
        submitted_at_ms,
    })
}

pub(super) fn change_request_tx(
    tx: &Transaction<'_>,
    id: i64,
) -> Result<Option<ChangeRequestRow>, StoreError> {
    let raw = tx
        .query_row(
            "SELECT id, status, patch_json, target_type, target_id, version_type, version_id, raw_document_id, submitted_by, submitted_at_ms \
             FROM change_requests WHERE id=?1",
            params![id],
            read_raw_change_row,
        )
        .optional()?;
    raw.map(finish_change_row).transpose()
}

pub(super) fn requirements_tx(
    tx: &Transaction<'_>,
    dependent_id: i64,
) -> Result<Vec<ChangeRequirementRow>, StoreError> {
    let mut stmt = tx.prepare(
        "SELECT dependent_id, prerequisite_id, field, version_field \
         FROM change_requirements WHERE dependent_id=?1 \
         ORDER BY field ASC",
    )?;

    let mut rows = stmt.query(params![dependent_id])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(ChangeRequirementRow {
            dependent_id: row.get(0)?,
            prerequisite_id: row.get(1)?,
            field: row.get(2)?,
            version_field: row.get(3)?,
        });
    }
    Ok(out)
}
