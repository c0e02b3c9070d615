#![forbid(unsafe_code)]

use serde_json::json;
use std::path::PathBuf;
use trove_core::{
    ChangeStatus, Draft, EntitySchema, EntityType, FieldDef, PatchOp, Record, SchemaRegistry,
};
use trove_storage::{
    CreateSourceRequest, ProposeCreateRequest, ProposeUpdateRequest, SourceKind, SqliteStore,
    StoreError,
};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let dir = base.join(format!("trove_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn work_type() -> EntityType {
    EntityType::try_new("work").expect("entity type")
}

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(EntitySchema::new(
            work_type(),
            EntityType::try_new("work_version").expect("entity type"),
            vec![
                FieldDef::scalar("title"),
                FieldDef::scalar("description"),
                FieldDef::derived("search_blob"),
            ],
        ))
        .expect("register work");
    registry
}

fn open_store(test_name: &str) -> SqliteStore {
    SqliteStore::open(temp_dir(test_name), registry()).expect("open store")
}

fn submitter(store: &mut SqliteStore) -> i64 {
    store
        .create_source(CreateSourceRequest {
            name: "curator".to_string(),
            kind: SourceKind::User,
        })
        .expect("create source")
        .id
}

#[test]
fn creation_proposal_holds_a_patch_against_the_blank_record() {
    let mut store = open_store("creation_proposal_holds_a_patch");
    let submitted_by = submitter(&mut store);

    let mut draft = Draft::new(work_type());
    draft.set("title", json!("Collected Works"));

    let request = store
        .propose_create(ProposeCreateRequest {
            draft,
            submitted_by,
            raw_document_id: None,
        })
        .expect("propose create");

    assert_eq!(request.status, ChangeStatus::Pending);
    assert_eq!(request.target_type, "work");
    assert_eq!(request.version_type, "work_version");
    assert_eq!(request.target_id, None);
    assert_eq!(request.version_id, None);
    assert_eq!(
        request.patch.ops(),
        &[PatchOp::Add {
            path: "/title".to_string(),
            value: json!("Collected Works"),
        }]
    );

    let loaded = store
        .get_change_request(request.id)
        .expect("load request")
        .expect("request exists");
    assert_eq!(loaded, request);
}

#[test]
fn accepted_creation_materializes_the_entity() {
    let mut store = open_store("accepted_creation_materializes_the_entity");
    let submitted_by = submitter(&mut store);

    let mut draft = Draft::new(work_type());
    draft.set("title", json!("Collected Works"));
    draft.set("description", json!("first edition"));

    let request = store
        .propose_create(ProposeCreateRequest {
            draft,
            submitted_by,
            raw_document_id: None,
        })
        .expect("propose create");
    let accepted = store.accept(request.id, false).expect("accept");

    assert_eq!(accepted.request.status, ChangeStatus::Accepted);
    assert_eq!(accepted.request.target_id, Some(accepted.entity.id));
    assert_eq!(accepted.request.version_id, Some(accepted.version.id));
    assert_eq!(accepted.entity.version_no, 1);
    assert_eq!(accepted.entity.record.get("title"), Some(&json!("Collected Works")));

    let entity = store
        .get_entity("work", accepted.entity.id)
        .expect("load entity")
        .expect("entity exists");
    assert_eq!(entity, accepted.entity);

    let versions = store
        .list_entity_versions("work", accepted.entity.id)
        .expect("list versions");
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0], accepted.version);
    assert_eq!(versions[0].change_request_id, request.id);
}

#[test]
fn single_field_update_diffs_to_one_replace() {
    let mut store = open_store("single_field_update_diffs_to_one_replace");
    let submitted_by = submitter(&mut store);

    let mut draft = Draft::new(work_type());
    draft.set("title", json!("Draft title"));
    draft.set("description", json!("unchanged"));
    let created = store
        .propose_create(ProposeCreateRequest {
            draft,
            submitted_by,
            raw_document_id: None,
        })
        .expect("propose create");
    let accepted = store.accept(created.id, false).expect("accept create");

    let mut revised = Record::new();
    revised.set("title", json!("Final title"));
    revised.set("description", json!("unchanged"));

    let update = store
        .propose_update(ProposeUpdateRequest {
            entity_type: work_type(),
            entity_id: accepted.entity.id,
            draft: revised,
            submitted_by,
            raw_document_id: None,
        })
        .expect("propose update");

    assert_eq!(
        update.patch.ops(),
        &[PatchOp::Replace {
            path: "/title".to_string(),
            value: json!("Final title"),
        }]
    );
    assert_eq!(update.target_id, Some(accepted.entity.id));
    assert_eq!(update.version_id, Some(accepted.version.id));

    let resolved = store.accept(update.id, false).expect("accept update");
    assert_eq!(resolved.entity.version_no, 2);
    assert_eq!(resolved.entity.record.get("title"), Some(&json!("Final title")));

    let versions = store
        .list_entity_versions("work", accepted.entity.id)
        .expect("list versions");
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[1].version_no, 2);
}

#[test]
fn update_requires_an_existing_entity() {
    let mut store = open_store("update_requires_an_existing_entity");
    let submitted_by = submitter(&mut store);

    let mut revised = Record::new();
    revised.set("title", json!("anything"));

    let result = store.propose_update(ProposeUpdateRequest {
        entity_type: work_type(),
        entity_id: 42,
        draft: revised,
        submitted_by,
        raw_document_id: None,
    });
    assert!(matches!(result, Err(StoreError::UnknownId)));
}

#[test]
fn drafts_are_checked_against_the_schema() {
    let mut store = open_store("drafts_are_checked_against_the_schema");
    let submitted_by = submitter(&mut store);

    let mut unknown_column = Draft::new(work_type());
    unknown_column.set("not_a_column", json!(1));
    let result = store.propose_create(ProposeCreateRequest {
        draft: unknown_column,
        submitted_by,
        raw_document_id: None,
    });
    assert!(matches!(result, Err(StoreError::InvalidInput(_))));

    let mut derived_column = Draft::new(work_type());
    derived_column.set("search_blob", json!("computed elsewhere"));
    let result = store.propose_create(ProposeCreateRequest {
        draft: derived_column,
        submitted_by,
        raw_document_id: None,
    });
    assert!(matches!(result, Err(StoreError::InvalidInput(_))));

    let unregistered = Draft::new(EntityType::try_new("preprint").expect("entity type"));
    let result = store.propose_create(ProposeCreateRequest {
        draft: unregistered,
        submitted_by,
        raw_document_id: None,
    });
    assert!(matches!(result, Err(StoreError::UnknownEntityType(_))));
}

#[test]
fn listing_filters_by_status() {
    let mut store = open_store("listing_filters_by_status");
    let submitted_by = submitter(&mut store);

    let mut ids = Vec::new();
    for title in ["one", "two", "three"] {
        let mut draft = Draft::new(work_type());
        draft.set("title", json!(title));
        ids.push(
            store
                .propose_create(ProposeCreateRequest {
                    draft,
                    submitted_by,
                    raw_document_id: None,
                })
                .expect("propose create")
                .id,
        );
    }
    store.accept(ids[0], false).expect("accept first");
    store.reject(ids[1]).expect("reject second");

    let pending = store
        .list_change_requests(Some(ChangeStatus::Pending), 10, 0)
        .expect("list pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, ids[2]);

    let all = store
        .list_change_requests(None, 10, 0)
        .expect("list all");
    assert_eq!(all.len(), 3);
}
