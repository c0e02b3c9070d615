#![forbid(unsafe_code)]

use super::*;

impl SqliteStore {
    /// Documents awaiting normalization, oldest first.
    pub fn pending_work(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PendingWorkRow>, StoreError> {
        let limit = to_sqlite_i64(limit)?;
        let offset = to_sqlite_i64(offset)?;

        let mut stmt = self.conn.prepare(
            "SELECT p.raw_document_id, p.enqueued_at_ms, r.source_id, r.source_doc_id, r.content_hash \
             FROM pending_work p \
             JOIN raw_documents r ON r.id = p.raw_document_id \
             ORDER BY p.enqueued_at_ms ASC, p.raw_document_id ASC \
             LIMIT ?1 OFFSET ?2",
        )?;

        let mut rows = stmt.query(params![limit, offset])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(PendingWorkRow {
                raw_document_id: row.get(0)?,
                enqueued_at_ms: row.get(1)?,
                source_id: row.get(2)?,
                source_doc_id: row.get(3)?,
                content_hash: row.get(4)?,
            });
        }
        Ok(out)
    }

    /// Called by the normalizer once a document has been turned into change
    /// requests. Deletes the marker and records the normalization; returns
    /// false when no marker existed.
    pub fn complete_work(&mut self, raw_document_id: i64) -> Result<bool, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let deleted = tx.execute(
            "DELETE FROM pending_work WHERE raw_document_id=?1",
            params![raw_document_id],
        )?;
        if deleted == 0 {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO normalizations(raw_document_id, normalized_at_ms) VALUES (?1, ?2)",
            params![raw_document_id, now_ms],
        )?;

        tx.commit()?;
        Ok(true)
    }
}
