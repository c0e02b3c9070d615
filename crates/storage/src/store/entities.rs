#![forbid(unsafe_code)]

use super::*;
use trove_core::Record;

impl SqliteStore {
    pub fn get_entity(&self, entity_type: &str, id: i64) -> Result<Option<EntityRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT entity_type, id, version_no, record_json \
                 FROM entities WHERE entity_type=?1 AND id=?2",
                params![entity_type, id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((entity_type, id, version_no, record_json)) => Ok(Some(EntityRow {
                entity_type,
                id,
                version_no,
                record: serde_json::from_str::<Record>(&record_json)?,
            })),
            None => Ok(None),
        }
    }

    /// Every committed snapshot of one entity, oldest first.
    pub fn list_entity_versions(
        &self,
        entity_type: &str,
        entity_id: i64,
    ) -> Result<Vec<EntityVersionRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, entity_type, entity_id, version_no, record_json, change_request_id, created_at_ms \
             FROM entity_versions \
             WHERE entity_type=?1 AND entity_id=?2 \
             ORDER BY version_no ASC",
        )?;

        let mut rows = stmt.query(params![entity_type, entity_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let record_json: String = row.get(4)?;
            out.push(EntityVersionRow {
                id: row.get(0)?,
                entity_type: row.get(1)?,
                entity_id: row.get(2)?,
                version_no: row.get(3)?,
                record: serde_json::from_str::<Record>(&record_json)?,
                change_request_id: row.get(5)?,
                created_at_ms: row.get(6)?,
            });
        }
        Ok(out)
    }
}

pub(super) fn entity_tx(
    tx: &Transaction<'_>,
    entity_type: &str,
    id: i64,
) -> Result<Option<EntityRow>, StoreError> {
    let row = tx
        .query_row(
            "SELECT entity_type, id, version_no, record_json \
             FROM entities WHERE entity_type=?1 AND id=?2",
            params![entity_type, id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    match row {
        Some((entity_type, id, version_no, record_json)) => Ok(Some(EntityRow {
            entity_type,
            id,
            version_no,
            record: serde_json::from_str::<Record>(&record_json)?,
        })),
        None => Ok(None),
    }
}

pub(super) fn ensure_entity_exists_tx(
    tx: &Transaction<'_>,
    entity_type: &str,
    id: i64,
) -> Result<(), StoreError> {
    let exists = tx
        .query_row(
            "SELECT 1 FROM entities WHERE entity_type=?1 AND id=?2",
            params![entity_type, id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();

    if exists { Ok(()) } else { Err(StoreError::UnknownId) }
}

/// Row id of the entity's newest version.
pub(super) fn head_version_id_tx(
    tx: &Transaction<'_>,
    entity_type: &str,
    entity_id: i64,
) -> Result<Option<i64>, StoreError> {
    Ok(tx
        .query_row(
            "SELECT id FROM entity_versions \
             WHERE entity_type=?1 AND entity_id=?2 \
             ORDER BY version_no DESC LIMIT 1",
            params![entity_type, entity_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?)
}

pub(super) fn insert_version_tx(
    tx: &Transaction<'_>,
    entity_type: &str,
    entity_id: i64,
    version_no: i64,
    record_json: &str,
    change_request_id: i64,
    now_ms: i64,
) -> Result<i64, StoreError> {
    tx.execute(
        "INSERT INTO entity_versions(entity_type, entity_id, version_no, record_json, change_request_id, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entity_type,
            entity_id,
            version_no,
            record_json,
            change_request_id,
            now_ms
        ],
    )?;
    Ok(tx.last_insert_rowid())
}
