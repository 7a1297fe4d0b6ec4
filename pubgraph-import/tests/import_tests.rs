use pretty_assertions::assert_eq;
use pubgraph_import::{ImportError, Manifest, ensure_fields, run_import};
use pubgraph_ops::{EngineConfig, OpsError};
use pubgraph_storage::PubStore;
use pubgraph_types::{CommunityId, PubId, PubTypeId};
use serde_json::json;

fn make_manifest(community: CommunityId, pubs: serde_json::Value) -> Manifest {
    let doc = json!({
        "community_id": community,
        "pub_type_id": PubTypeId::new(),
        "fields": [
            { "slug": "title", "schema": "string" },
            { "slug": "cites", "schema": "relation", "relation_value": "string" },
        ],
        "pubs": pubs,
    });
    Manifest::from_json(&doc.to_string()).unwrap()
}

fn id_of(report: &pubgraph_import::ImportReport, key: &str) -> PubId {
    report
        .pubs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, id)| *id)
        .unwrap()
}

// ── Manifest ─────────────────────────────────────────────────────

#[test]
fn duplicate_keys_are_rejected() {
    let manifest = make_manifest(
        CommunityId::new(),
        json!([{ "key": "a" }, { "key": "a" }]),
    );
    assert!(matches!(
        manifest.assign_ids(),
        Err(ImportError::DuplicateKey(key)) if key == "a"
    ));
}

#[test]
fn unknown_relation_target_is_rejected() {
    let manifest = make_manifest(
        CommunityId::new(),
        json!([{ "key": "a", "relations": [{ "field": "cites", "to": "nowhere" }] }]),
    );
    assert!(matches!(
        manifest.plan(),
        Err(ImportError::UnknownTarget(to)) if to == "nowhere"
    ));
}

#[test]
fn pinned_ids_are_kept() {
    let pinned = PubId::new();
    let manifest = make_manifest(
        CommunityId::new(),
        json!([{ "key": "a", "id": pinned }, { "key": "b" }]),
    );
    let ids = manifest.assign_ids().unwrap();
    assert_eq!(ids["a"], pinned);
    assert_ne!(ids["b"], pinned);
}

#[test]
fn fields_are_registered_once() {
    let store = PubStore::open_in_memory().unwrap();
    let manifest = make_manifest(CommunityId::new(), json!([]));

    assert_eq!(ensure_fields(&store, &manifest).unwrap(), 2);
    assert_eq!(ensure_fields(&store, &manifest).unwrap(), 0);
}

#[test]
fn conflicting_field_definition_is_rejected() {
    let store = PubStore::open_in_memory().unwrap();
    let community = CommunityId::new();
    ensure_fields(&store, &make_manifest(community, json!([]))).unwrap();

    let doc = json!({
        "community_id": community,
        "pub_type_id": PubTypeId::new(),
        "fields": [{ "slug": "title", "schema": "number" }],
    });
    let changed = Manifest::from_json(&doc.to_string()).unwrap();
    assert!(matches!(
        ensure_fields(&store, &changed),
        Err(ImportError::FieldMismatch(slug)) if slug == "title"
    ));
}

// ── Import ───────────────────────────────────────────────────────

#[tokio::test]
async fn import_links_pubs_by_key() {
    let store = PubStore::open_in_memory().unwrap();
    let community = CommunityId::new();
    let manifest = make_manifest(
        community,
        json!([
            { "key": "paper", "values": { "title": "Paper" },
              "relations": [{ "field": "cites", "to": "source", "value": "p. 4" }] },
            { "key": "source", "values": { "title": "Source" } },
        ]),
    );

    let report = run_import(&store, &manifest, &EngineConfig::default())
        .await
        .unwrap();
    assert_eq!(report.fields_created, 2);
    assert_eq!(report.pubs_created, 2);

    let paper = store.project(id_of(&report, "paper"), 1).unwrap().unwrap();
    assert_eq!(paper.get_str("title"), Some("Paper"));
    let cite = paper.relations_for("cites").next().unwrap();
    assert_eq!(cite.value, json!("p. 4"));
    assert_eq!(cite.related_pub_id, id_of(&report, "source"));
}

#[tokio::test]
async fn reimport_with_pinned_ids_converges() {
    let store = PubStore::open_in_memory().unwrap();
    let community = CommunityId::new();
    let (a, b) = (PubId::new(), PubId::new());
    let pubs = json!([
        { "key": "a", "id": a, "values": { "title": "A" },
          "relations": [{ "field": "cites", "to": "b", "value": "x" }],
          "replace_relations": true },
        { "key": "b", "id": b, "values": { "title": "B" } },
    ]);
    let manifest = make_manifest(community, pubs);

    run_import(&store, &manifest, &EngineConfig::default()).await.unwrap();
    let again = run_import(&store, &manifest, &EngineConfig::default())
        .await
        .unwrap();

    assert_eq!(again.pubs_created, 0);
    assert_eq!(store.pub_ids(community).unwrap().len(), 2);
    assert_eq!(store.count_values(a).unwrap(), 2);
}

#[tokio::test]
async fn invalid_value_aborts_whole_import() {
    let dir = tempfile::tempdir().unwrap();
    let store = PubStore::open(dir.path().join("import.db")).unwrap();
    let community = CommunityId::new();
    let manifest = make_manifest(
        community,
        json!([
            { "key": "ok", "values": { "title": "Fine" } },
            { "key": "bad", "values": { "title": 42 } },
        ]),
    );

    let err = run_import(&store, &manifest, &EngineConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::Ops(OpsError::Validation(_))));
    assert!(store.pub_ids(community).unwrap().is_empty());
}

#[tokio::test]
async fn manifest_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    let community = CommunityId::new();
    let doc = json!({
        "community_id": community,
        "pub_type_id": PubTypeId::new(),
        "pubs": [{ "key": "solo" }],
    });
    std::fs::write(&path, doc.to_string()).unwrap();

    let manifest = Manifest::from_path(&path).unwrap();
    assert_eq!(manifest.community_id, community);
    assert!(manifest.fields.is_empty());
    assert_eq!(manifest.pubs[0].key, "solo");
}
