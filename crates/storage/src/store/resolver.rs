#![forbid(unsafe_code)]

use super::changes::{change_request_tx, requirements_tx};
use super::entities::{entity_tx, insert_version_tx};
use super::*;
use serde_json::Value;
use tracing::info;
use trove_core::{ChangeStatus, PatchError, PatchOp, Record, column_path};

impl SqliteStore {
    /// Commits one change request. The whole resolution runs in a single
    /// transaction: dependency checks, placeholder substitution, patch
    /// application, schema validation, and the version write either all land
    /// or none do.
    ///
    /// `force` bypasses the pending-status gate (re-accepting a rejected
    /// request), never the dependency check: a request whose prerequisites
    /// have not been accepted cannot be forced through.
    pub fn accept(&mut self, id: i64, force: bool) -> Result<AcceptedChange, StoreError> {
        let now_ms = now_ms();
        let tx = self.conn.transaction()?;

        let Some(request) = change_request_tx(&tx, id)? else {
            return Err(StoreError::UnknownId);
        };
        if !force && request.status != ChangeStatus::Pending {
            return Err(StoreError::InvalidState {
                id,
                status: request.status,
            });
        }

        let mut resolved = Vec::new();
        for requirement in requirements_tx(&tx, id)? {
            let Some(prerequisite) = change_request_tx(&tx, requirement.prerequisite_id)? else {
                return Err(StoreError::UnknownId);
            };
            if prerequisite.status != ChangeStatus::Accepted {
                return Err(StoreError::UnsatisfiedDependency {
                    dependent_id: id,
                    prerequisite_id: requirement.prerequisite_id,
                });
            }
            let (Some(target_id), Some(version_id)) =
                (prerequisite.target_id, prerequisite.version_id)
            else {
                return Err(StoreError::UnsatisfiedDependency {
                    dependent_id: id,
                    prerequisite_id: requirement.prerequisite_id,
                });
            };
            resolved.push((requirement, target_id, version_id));
        }

        let schema = self
            .registry
            .get(&request.target_type)
            .ok_or_else(|| StoreError::UnknownEntityType(request.target_type.clone()))?;

        let accepted = match request.target_id {
            Some(entity_id) => {
                let Some(entity) = entity_tx(&tx, &request.target_type, entity_id)? else {
                    return Err(StoreError::UnknownId);
                };

                let record = request.patch.apply(&entity.record)?;
                schema.validate(&record)?;

                let version_no = entity.version_no + 1;
                let record_json = serde_json::to_string(&record)?;
                tx.execute(
                    "UPDATE entities SET record_json=?3, version_no=?4 \
                     WHERE entity_type=?1 AND id=?2",
                    params![request.target_type, entity_id, record_json, version_no],
                )?;
                let version_id = insert_version_tx(
                    &tx,
                    &request.target_type,
                    entity_id,
                    version_no,
                    &record_json,
                    id,
                    now_ms,
                )?;
                tx.execute(
                    "UPDATE change_requests SET status=?2, version_id=?3 WHERE id=?1",
                    params![id, ChangeStatus::Accepted.as_str(), version_id],
                )?;

                AcceptedChange {
                    request: ChangeRequestRow {
                        status: ChangeStatus::Accepted,
                        version_id: Some(version_id),
                        ..request
                    },
                    entity: EntityRow {
                        entity_type: entity.entity_type,
                        id: entity_id,
                        version_no,
                        record: record.clone(),
                    },
                    version: EntityVersionRow {
                        id: version_id,
                        entity_type: schema.entity_type().as_str().to_string(),
                        entity_id,
                        version_no,
                        record,
                        change_request_id: id,
                        created_at_ms: now_ms,
                    },
                }
            }
            None => {
                // Creation: rewrite each placeholder with the identity the
                // prerequisite produced, then append the version companion.
                let mut patch = request.patch.clone();
                for (requirement, target_id, version_id) in &resolved {
                    let path = column_path(&requirement.field);
                    if !patch.set_value_at(&path, Value::from(*target_id)) {
                        return Err(StoreError::Patch(PatchError::MissingPath { path }));
                    }
                    patch.push(PatchOp::Add {
                        path: column_path(&requirement.version_field),
                        value: Value::from(*version_id),
                    });
                }

                let record = patch.apply(&Record::new())?;
                schema.validate(&record)?;

                let entity_id =
                    next_counter_tx(&tx, &format!("{}_seq", request.target_type))?;
                let record_json = serde_json::to_string(&record)?;
                tx.execute(
                    "INSERT INTO entities(entity_type, id, record_json, version_no) \
                     VALUES (?1, ?2, ?3, 1)",
                    params![request.target_type, entity_id, record_json],
                )?;
                let version_id = insert_version_tx(
                    &tx,
                    &request.target_type,
                    entity_id,
                    1,
                    &record_json,
                    id,
                    now_ms,
                )?;
                tx.execute(
                    "UPDATE change_requests SET status=?2, target_id=?3, version_id=?4 WHERE id=?1",
                    params![id, ChangeStatus::Accepted.as_str(), entity_id, version_id],
                )?;

                AcceptedChange {
                    request: ChangeRequestRow {
                        status: ChangeStatus::Accepted,
                        target_id: Some(entity_id),
                        version_id: Some(version_id),
                        ..request
                    },
                    entity: EntityRow {
                        entity_type: schema.entity_type().as_str().to_string(),
                        id: entity_id,
                        version_no: 1,
                        record: record.clone(),
                    },
                    version: EntityVersionRow {
                        id: version_id,
                        entity_type: schema.entity_type().as_str().to_string(),
                        entity_id,
                        version_no: 1,
                        record,
                        change_request_id: id,
                        created_at_ms: now_ms,
                    },
                }
            }
        };

        tx.commit()?;
        info!(
            request = id,
            entity_type = %accepted.entity.entity_type,
            entity_id = accepted.entity.id,
            version_no = accepted.entity.version_no,
            "accepted change request"
        );
        Ok(accepted)
    }

    /// Marks a pending request rejected. Dependents are left pending; they
    /// surface through `list_blocked_requests`.
    pub fn reject(&mut self, id: i64) -> Result<ChangeRequestRow, StoreError> {
        let tx = self.conn.transaction()?;

        let Some(request) = change_request_tx(&tx, id)? else {
            return Err(StoreError::UnknownId);
        };
        if request.status != ChangeStatus::Pending {
            return Err(StoreError::InvalidState {
                id,
                status: request.status,
            });
        }

        tx.execute(
            "UPDATE change_requests SET status=?2 WHERE id=?1",
            params![id, ChangeStatus::Rejected.as_str()],
        )?;
        tx.commit()?;

        info!(request = id, "rejected change request");
        Ok(ChangeRequestRow {
            status: ChangeStatus::Rejected,
            ..request
        })
    }
}
