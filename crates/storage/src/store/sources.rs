#![forbid(unsafe_code)]

use super::*;

impl SqliteStore {
    pub fn create_source(&mut self, request: CreateSourceRequest) -> Result<SourceRow, StoreError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(StoreError::InvalidInput("source name must not be empty"));
        }

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let insert = tx.execute(
            "INSERT INTO sources(name, kind, created_at_ms) VALUES (?1, ?2, ?3)",
            params![name, request.kind.as_str(), now_ms],
        );
        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::SourceAlreadyExists);
            }
            return Err(StoreError::Sql(err));
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(SourceRow {
            id,
            name: name.to_string(),
            kind: request.kind,
            created_at_ms: now_ms,
        })
    }

    pub fn get_source(&self, id: i64) -> Result<Option<SourceRow>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, kind, created_at_ms FROM sources WHERE id=?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, name, kind, created_at_ms)) => {
                let kind = SourceKind::parse(&kind)
                    .ok_or(StoreError::InvalidInput("invalid source kind"))?;
                Ok(Some(SourceRow {
                    id,
                    name,
                    kind,
                    created_at_ms,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn list_sources(&self) -> Result<Vec<SourceRow>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, kind, created_at_ms FROM sources ORDER BY id ASC")?;

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(2)?;
            out.push(SourceRow {
                id: row.get(0)?,
                name: row.get(1)?,
                kind: SourceKind::parse(&kind)
                    .ok_or(StoreError::InvalidInput("invalid source kind"))?,
                created_at_ms: row.get(3)?,
            });
        }
        Ok(out)
    }
}

pub(super) fn ensure_source_exists_tx(tx: &Transaction<'_>, id: i64) -> Result<(), StoreError> {
    let exists = tx
        .query_row("SELECT 1 FROM sources WHERE id=?1", params![id], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?
        .is_some();

    if exists { Ok(()) } else { Err(StoreError::UnknownId) }
}
