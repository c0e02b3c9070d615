#![forbid(unsafe_code)]

use super::sources::ensure_source_exists_tx;
use super::*;
use sha2::Digest as _;
use std::fmt::Write as _;
use tracing::{debug, info};

const ZSTD_LEVEL: i32 = 3;

impl SqliteStore {
    /// Content-addressed intake. Identical bytes for the same
    /// (source, document id) only refresh `last_seen_ms`; new bytes insert a
    /// raw document plus its pending-work marker in one transaction.
    pub fn store_document(
        &mut self,
        request: StoreDocumentRequest,
    ) -> Result<RawDocumentRow, StoreError> {
        let source_doc_id = request.source_doc_id.trim();
        if source_doc_id.is_empty() {
            return Err(StoreError::InvalidInput("source_doc_id must not be empty"));
        }
        if request.payload.is_empty() {
            return Err(StoreError::InvalidInput("payload must not be empty"));
        }

        let content_hash = sha256_hex(&request.payload);
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        ensure_source_exists_tx(&tx, request.source_id)?;

        if let Some(row) = raw_document_tx(&tx, request.source_id, source_doc_id, &content_hash)? {
            touch_last_seen_tx(&tx, row.id, now_ms)?;
            tx.commit()?;
            debug!(
                source_id = request.source_id,
                doc = %source_doc_id,
                "saw exact copy of document"
            );
            return Ok(RawDocumentRow {
                last_seen_ms: now_ms,
                ..row
            });
        }

        let compressed = zstd::encode_all(request.payload.as_slice(), ZSTD_LEVEL)?;
        let insert = tx.execute(
            "INSERT INTO raw_documents(source_id, source_doc_id, content_hash, payload, first_seen_ms, last_seen_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.source_id,
                source_doc_id,
                content_hash,
                compressed,
                now_ms,
                now_ms
            ],
        );

        match insert {
            Ok(_) => {
                let id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO pending_work(raw_document_id, enqueued_at_ms) VALUES (?1, ?2)",
                    params![id, now_ms],
                )?;
                tx.commit()?;
                info!(
                    source_id = request.source_id,
                    doc = %source_doc_id,
                    "stored new raw document"
                );
                Ok(RawDocumentRow {
                    id,
                    source_id: request.source_id,
                    source_doc_id: source_doc_id.to_string(),
                    content_hash,
                    first_seen_ms: now_ms,
                    last_seen_ms: now_ms,
                })
            }
            Err(err) if is_constraint_violation(&err) => {
                // Lost the race against a concurrent identical insert; the
                // row exists now, so fall back to the lookup path.
                drop(tx);
                let tx = self.conn.transaction()?;
                let Some(row) =
                    raw_document_tx(&tx, request.source_id, source_doc_id, &content_hash)?
                else {
                    return Err(StoreError::Sql(err));
                };
                touch_last_seen_tx(&tx, row.id, now_ms)?;
                tx.commit()?;
                Ok(RawDocumentRow {
                    last_seen_ms: now_ms,
                    ..row
                })
            }
            Err(err) => Err(StoreError::Sql(err)),
        }
    }

    pub fn get_document(&self, id: i64) -> Result<Option<RawDocumentRow>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, source_id, source_doc_id, content_hash, first_seen_ms, last_seen_ms \
                 FROM raw_documents WHERE id=?1",
                params![id],
                |row| {
                    Ok(RawDocumentRow {
                        id: row.get(0)?,
                        source_id: row.get(1)?,
                        source_doc_id: row.get(2)?,
                        content_hash: row.get(3)?,
                        first_seen_ms: row.get(4)?,
                        last_seen_ms: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    /// Returns the stored payload, decompressed back to the harvested bytes.
    pub fn document_payload(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        let compressed = self
            .conn
            .query_row(
                "SELECT payload FROM raw_documents WHERE id=?1",
                params![id],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;

        match compressed {
            Some(bytes) => Ok(Some(zstd::decode_all(bytes.as_slice())?)),
            None => Ok(None),
        }
    }
}

pub(super) fn raw_document_exists_tx(tx: &Transaction<'_>, id: i64) -> Result<bool, StoreError> {
    Ok(tx
        .query_row(
            "SELECT 1 FROM raw_documents WHERE id=?1",
            params![id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

fn raw_document_tx(
    tx: &Transaction<'_>,
    source_id: i64,
    source_doc_id: &str,
    content_hash: &str,
) -> Result<Option<RawDocumentRow>, StoreError> {
    Ok(tx
        .query_row(
            "SELECT id, source_id, source_doc_id, content_hash, first_seen_ms, last_seen_ms \
             FROM raw_documents \
             WHERE source_id=?1 AND source_doc_id=?2 AND content_hash=?3",
            params![source_id, source_doc_id, content_hash],
            |row| {
                Ok(RawDocumentRow {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    source_doc_id: row.get(2)?,
                    content_hash: row.get(3)?,
                    first_seen_ms: row.get(4)?,
                    last_seen_ms: row.get(5)?,
                })
            },
        )
        .optional()?)
}

fn touch_last_seen_tx(tx: &Transaction<'_>, id: i64, now_ms: i64) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE raw_documents SET last_seen_ms=?2 WHERE id=?1",
        params![id, now_ms],
    )?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = sha2::Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();

    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}
