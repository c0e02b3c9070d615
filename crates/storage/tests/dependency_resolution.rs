#![forbid(unsafe_code)]

use serde_json::json;
use std::path::PathBuf;
use trove_core::{
    ChangeStatus, Draft, EntitySchema, EntityType, FieldDef, PatchOp, SchemaRegistry,
};
use trove_storage::{CreateSourceRequest, ProposeCreateRequest, SourceKind, SqliteStore, StoreError};

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

fn contribution_type() -> EntityType {
    EntityType::try_new("contribution").expect("entity type")
}

fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(EntitySchema::new(
            work_type(),
            EntityType::try_new("work_version").expect("entity type"),
            vec![FieldDef::scalar("title")],
        ))
        .expect("register work");
    registry
        .register(EntitySchema::new(
            contribution_type(),
            EntityType::try_new("contribution_version").expect("entity type"),
            vec![
                FieldDef::scalar("cited_as"),
                FieldDef::relation("work_id", work_type(), "work_version_id"),
            ],
        ))
        .expect("register contribution");
    registry
}

fn open_store(test_name: &str) -> SqliteStore {
    SqliteStore::open(temp_dir(test_name), registry()).expect("open store")
}

fn harvester(store: &mut SqliteStore) -> i64 {
    store
        .create_source(CreateSourceRequest {
            name: "harvester".to_string(),
            kind: SourceKind::Provider,
        })
        .expect("create source")
        .id
}

fn propose_work(store: &mut SqliteStore, submitted_by: i64, title: &str) -> i64 {
    let mut draft = Draft::new(work_type());
    draft.set("title", json!(title));
    store
        .propose_create(ProposeCreateRequest {
            draft,
            submitted_by,
            raw_document_id: None,
        })
        .expect("propose work")
        .id
}

fn propose_contribution(store: &mut SqliteStore, submitted_by: i64, work_request: i64) -> i64 {
    let mut draft = Draft::new(contribution_type());
    draft.set("cited_as", json!("Doe, J."));
    draft.relate_pending("work_id", work_request);
    store
        .propose_create(ProposeCreateRequest {
            draft,
            submitted_by,
            raw_document_id: None,
        })
        .expect("propose contribution")
        .id
}

#[test]
fn pending_relation_records_a_requirement_edge() {
    let mut store = open_store("pending_relation_records_a_requirement_edge");
    let submitted_by = harvester(&mut store);

    let work_request = propose_work(&mut store, submitted_by, "Collected Works");
    let contribution_request = propose_contribution(&mut store, submitted_by, work_request);

    let requirements = store
        .requirements_for(contribution_request)
        .expect("requirements");
    assert_eq!(requirements.len(), 1);
    assert_eq!(requirements[0].dependent_id, contribution_request);
    assert_eq!(requirements[0].prerequisite_id, work_request);
    assert_eq!(requirements[0].field, "work_id");
    assert_eq!(requirements[0].version_field, "work_version_id");

    // The placeholder is part of the stored patch, not resolved yet.
    let request = store
        .get_change_request(contribution_request)
        .expect("load request")
        .expect("request exists");
    assert_eq!(
        request.patch.ops(),
        &[
            PatchOp::Add {
                path: "/cited_as".to_string(),
                value: json!("Doe, J."),
            },
            PatchOp::Add {
                path: "/work_id".to_string(),
                value: json!(null),
            },
        ]
    );
}

#[test]
fn dependent_cannot_land_before_its_prerequisite() {
    let mut store = open_store("dependent_cannot_land_before_its_prerequisite");
    let submitted_by = harvester(&mut store);

    let work_request = propose_work(&mut store, submitted_by, "Collected Works");
    let contribution_request = propose_contribution(&mut store, submitted_by, work_request);

    let early = store.accept(contribution_request, false);
    assert!(matches!(
        early,
        Err(StoreError::UnsatisfiedDependency {
            dependent_id,
            prerequisite_id,
        }) if dependent_id == contribution_request && prerequisite_id == work_request
    ));

    // force bypasses the status gate, never the dependency check
    let forced = store.accept(contribution_request, true);
    assert!(matches!(forced, Err(StoreError::UnsatisfiedDependency { .. })));

    let request = store
        .get_change_request(contribution_request)
        .expect("load request")
        .expect("request exists");
    assert_eq!(request.status, ChangeStatus::Pending);
}

#[test]
fn acceptance_substitutes_identity_and_version() {
    let mut store = open_store("acceptance_substitutes_identity_and_version");
    let submitted_by = harvester(&mut store);

    let work_request = propose_work(&mut store, submitted_by, "Collected Works");
    let contribution_request = propose_contribution(&mut store, submitted_by, work_request);

    let work = store.accept(work_request, false).expect("accept work");
    let contribution = store
        .accept(contribution_request, false)
        .expect("accept contribution");

    assert_eq!(
        contribution.entity.record.get("work_id"),
        Some(&json!(work.entity.id))
    );
    assert_eq!(
        contribution.entity.record.get("work_version_id"),
        Some(&json!(work.version.id))
    );
    assert_eq!(
        contribution.entity.record.get("cited_as"),
        Some(&json!("Doe, J."))
    );

    // The stored patch still carries the placeholder; substitution happens
    // only on the resolver's working copy.
    let stored = store
        .get_change_request(contribution_request)
        .expect("load request")
        .expect("request exists");
    assert_eq!(stored.status, ChangeStatus::Accepted);
    assert!(stored.patch.ops().iter().any(|op| matches!(
        op,
        PatchOp::Add { path, value } if path == "/work_id" && value.is_null()
    )));
}

#[test]
fn chains_resolve_in_topological_order() {
    let mut store = open_store("chains_resolve_in_topological_order");
    let submitted_by = harvester(&mut store);

    let work_request = propose_work(&mut store, submitted_by, "Root work");
    let first = propose_contribution(&mut store, submitted_by, work_request);
    let second = propose_contribution(&mut store, submitted_by, work_request);

    assert!(matches!(
        store.accept(second, false),
        Err(StoreError::UnsatisfiedDependency { .. })
    ));

    let work = store.accept(work_request, false).expect("accept work");
    let a = store.accept(first, false).expect("accept first dependent");
    let b = store.accept(second, false).expect("accept second dependent");

    assert_ne!(a.entity.id, b.entity.id);
    for resolved in [&a, &b] {
        assert_eq!(
            resolved.entity.record.get("work_id"),
            Some(&json!(work.entity.id))
        );
        assert_eq!(
            resolved.entity.record.get("work_version_id"),
            Some(&json!(work.version.id))
        );
    }
}

#[test]
fn prerequisite_must_target_the_relation_type() {
    let mut store = open_store("prerequisite_must_target_the_relation_type");
    let submitted_by = harvester(&mut store);

    let work_request = propose_work(&mut store, submitted_by, "Collected Works");
    let contribution_request = propose_contribution(&mut store, submitted_by, work_request);

    // work_id must point at a work request, not a contribution request.
    let mut draft = Draft::new(contribution_type());
    draft.relate_pending("work_id", contribution_request);
    let mismatched = store.propose_create(ProposeCreateRequest {
        draft,
        submitted_by,
        raw_document_id: None,
    });
    assert!(matches!(mismatched, Err(StoreError::InvalidInput(_))));

    let unknown = {
        let mut draft = Draft::new(contribution_type());
        draft.relate_pending("work_id", 9999);
        store.propose_create(ProposeCreateRequest {
            draft,
            submitted_by,
            raw_document_id: None,
        })
    };
    assert!(matches!(unknown, Err(StoreError::UnknownId)));
}
