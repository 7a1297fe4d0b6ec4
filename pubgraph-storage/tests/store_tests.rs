use pretty_assertions::assert_eq;
use pubgraph_model::{FieldType, PubField, ValidationError};
use pubgraph_storage::{
    Edge, EdgeIndex, FieldFilter, NewPub, PendingValue, PubStore, StorageError, ValueStore,
};
use pubgraph_types::{CommunityId, PubId, PubTypeId, StageId};
use serde_json::json;

struct Fixture {
    store: PubStore,
    community: CommunityId,
    pub_type: PubTypeId,
}

fn make_fixture() -> Fixture {
    let store = PubStore::open_in_memory().unwrap();
    let community = CommunityId::new();
    store
        .create_field(&PubField::scalar(community, "title", FieldType::String))
        .unwrap();
    store
        .create_field(&PubField::scalar(community, "year", FieldType::Number))
        .unwrap();
    store
        .create_field(&PubField::relation(community, "cites", FieldType::String))
        .unwrap();
    store
        .create_field(&PubField::relation(community, "authors", FieldType::Json))
        .unwrap();
    Fixture {
        store,
        community,
        pub_type: PubTypeId::new(),
    }
}

impl Fixture {
    fn new_pub(&self, id: PubId) -> NewPub {
        NewPub {
            id,
            community_id: self.community,
            pub_type_id: self.pub_type,
            stage_id: None,
        }
    }

    fn seed_pubs(&self, n: usize) -> Vec<PubId> {
        let ids: Vec<PubId> = (0..n).map(|_| PubId::new()).collect();
        let rows: Vec<NewPub> = ids.iter().map(|id| self.new_pub(*id)).collect();
        self.store
            .with_transaction(|tx| tx.insert_pubs(&rows))
            .unwrap();
        ids
    }

    fn write(&self, pending: Vec<PendingValue>) {
        let community = self.community;
        self.store
            .with_transaction(|tx| -> Result<(), StorageError> {
                let validated = tx.validate_values(community, pending)?;
                let (relations, scalars): (Vec<_>, Vec<_>) =
                    validated.into_iter().partition(|v| v.is_relation());
                tx.upsert_scalar_values(&scalars)?;
                tx.upsert_relation_values(&relations)?;
                Ok(())
            })
            .unwrap();
    }
}

fn scalar(pub_id: PubId, slug: &str, value: serde_json::Value) -> PendingValue {
    PendingValue {
        pub_id,
        slug: slug.into(),
        value,
        related_pub_id: None,
    }
}

fn edge(pub_id: PubId, slug: &str, target: PubId, value: serde_json::Value) -> PendingValue {
    PendingValue {
        pub_id,
        slug: slug.into(),
        value,
        related_pub_id: Some(target),
    }
}

// ── Pubs ─────────────────────────────────────────────────────────

#[test]
fn insert_pubs_skips_existing_ids() {
    let fx = make_fixture();
    let existing = fx.seed_pubs(1)[0];
    let fresh = PubId::new();

    let inserted = fx
        .store
        .with_transaction(|tx| tx.insert_pubs(&[fx.new_pub(existing), fx.new_pub(fresh)]))
        .unwrap();

    assert_eq!(inserted, vec![fresh]);
    assert!(fx.store.pub_exists(fresh).unwrap());
}

#[test]
fn existing_pubs_returns_subset() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);
    let missing = PubId::new();

    let found = fx
        .store
        .with_transaction(|tx| tx.existing_pubs(fx.community, &[ids[0], missing, ids[1]]))
        .unwrap();

    assert_eq!(found.len(), 2);
    assert!(!found.contains(&missing));
}

#[test]
fn existing_pubs_is_scoped_to_community() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);

    let found = fx
        .store
        .with_transaction(|tx| tx.existing_pubs(CommunityId::new(), &ids))
        .unwrap();

    assert!(found.is_empty());
}

#[test]
fn set_stage_moves_pub() {
    let fx = make_fixture();
    let id = fx.seed_pubs(1)[0];
    let stage = StageId::new();

    fx.store.with_transaction(|tx| tx.set_stage(id, stage)).unwrap();

    assert_eq!(fx.store.get_pub(id).unwrap().unwrap().stage_id, Some(stage));
}

#[test]
fn set_stage_on_missing_pub_is_not_found() {
    let fx = make_fixture();
    let err = fx
        .store
        .with_transaction(|tx| tx.set_stage(PubId::new(), StageId::new()))
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

// ── Values ───────────────────────────────────────────────────────

#[test]
fn scalar_upsert_replaces_value() {
    let fx = make_fixture();
    let id = fx.seed_pubs(1)[0];

    fx.write(vec![scalar(id, "title", json!("First"))]);
    fx.write(vec![scalar(id, "title", json!("Second"))]);

    let projected = fx.store.project(id, 0).unwrap().unwrap();
    assert_eq!(projected.get_str("title"), Some("Second"));
    assert_eq!(fx.store.count_values(id).unwrap(), 1);
}

#[test]
fn relation_upsert_is_keyed_by_target() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(3);

    fx.write(vec![
        edge(ids[0], "cites", ids[1], json!("a")),
        edge(ids[0], "cites", ids[2], json!("b")),
    ]);
    fx.write(vec![edge(ids[0], "cites", ids[1], json!("c"))]);

    let projected = fx.store.project(ids[0], 0).unwrap().unwrap();
    let edges: Vec<_> = projected
        .relations_for("cites")
        .map(|r| (r.related_pub_id, r.value.clone()))
        .collect();
    assert_eq!(edges.len(), 2);
    assert!(edges.contains(&(ids[1], json!("c"))));
    assert!(edges.contains(&(ids[2], json!("b"))));
}

#[test]
fn find_pub_by_value_matches_scalar() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);
    fx.write(vec![
        scalar(ids[0], "title", json!("Alpha")),
        scalar(ids[1], "title", json!("Beta")),
    ]);

    let found = fx
        .store
        .with_transaction(|tx| tx.find_pub_by_value(fx.community, "title", &json!("Beta")))
        .unwrap();
    assert_eq!(found, Some(ids[1]));

    let missing = fx
        .store
        .with_transaction(|tx| tx.find_pub_by_value(fx.community, "title", &json!("Gamma")))
        .unwrap();
    assert_eq!(missing, None);
}

#[test]
fn find_pub_by_value_rejects_duplicates() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);
    fx.write(vec![
        scalar(ids[0], "year", json!(2020)),
        scalar(ids[1], "year", json!(2020)),
    ]);

    let err = fx
        .store
        .with_transaction(|tx| tx.find_pub_by_value(fx.community, "year", &json!(2020)))
        .unwrap_err();
    assert!(matches!(err, StorageError::Ambiguous(_)));
}

#[test]
fn delete_scalar_values_leaves_other_fields() {
    let fx = make_fixture();
    let id = fx.seed_pubs(1)[0];
    fx.write(vec![scalar(id, "title", json!("T")), scalar(id, "year", json!(1999))]);

    let deleted = fx
        .store
        .with_transaction(|tx| tx.delete_scalar_values(id, &["year".to_string()]))
        .unwrap();

    assert_eq!(deleted, 1);
    let projected = fx.store.project(id, 0).unwrap().unwrap();
    assert_eq!(projected.get_str("title"), Some("T"));
    assert_eq!(projected.value("year"), None);
}

// ── Validation ───────────────────────────────────────────────────

#[test]
fn validate_unknown_field() {
    let fx = make_fixture();
    let id = fx.seed_pubs(1)[0];
    let err = fx
        .store
        .with_transaction(|tx| tx.validate_values(fx.community, vec![scalar(id, "nope", json!(1))]))
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Validation(ValidationError::UnknownField { .. })
    ));
}

#[test]
fn validate_scalar_on_relation_field() {
    let fx = make_fixture();
    let id = fx.seed_pubs(1)[0];
    let err = fx
        .store
        .with_transaction(|tx| tx.validate_values(fx.community, vec![scalar(id, "cites", json!("x"))]))
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Validation(ValidationError::RelationRequired { .. })
    ));
}

#[test]
fn validate_edge_on_scalar_field() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);
    let err = fx
        .store
        .with_transaction(|tx| {
            tx.validate_values(fx.community, vec![edge(ids[0], "title", ids[1], json!("x"))])
        })
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Validation(ValidationError::NotARelation { .. })
    ));
}

#[test]
fn validate_type_mismatch() {
    let fx = make_fixture();
    let id = fx.seed_pubs(1)[0];
    let err = fx
        .store
        .with_transaction(|tx| tx.validate_values(fx.community, vec![scalar(id, "year", json!("1999"))]))
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Validation(ValidationError::TypeMismatch { .. })
    ));
}

#[test]
fn fields_are_scoped_per_community() {
    let fx = make_fixture();
    let other = CommunityId::new();
    assert!(fx.store.field(fx.community, "title").unwrap().is_some());
    assert!(fx.store.field(other, "title").unwrap().is_none());
    assert_eq!(fx.store.fields(fx.community).unwrap().len(), 4);
}

// ── Relations and edges ──────────────────────────────────────────

#[test]
fn load_existing_relations_filters_by_slug() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(3);
    fx.write(vec![
        edge(ids[0], "cites", ids[1], json!("c")),
        edge(ids[0], "authors", ids[2], json!(null)),
    ]);

    let (cites, all) = fx
        .store
        .with_transaction(|tx| -> Result<_, StorageError> {
            let slugs = vec!["cites".to_string()];
            let cites = tx.load_existing_relations(ids[0], FieldFilter::Slugs(&slugs))?;
            let all = tx.load_existing_relations(ids[0], FieldFilter::All)?;
            Ok((cites, all))
        })
        .unwrap();

    assert_eq!(cites.len(), 1);
    assert_eq!(cites[0].related_pub_id, ids[1]);
    assert_eq!(cites[0].field_slug, "cites");
    assert_eq!(all.len(), 2);
}

#[test]
fn empty_slug_filter_loads_nothing() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);
    fx.write(vec![edge(ids[0], "cites", ids[1], json!("c"))]);

    let loaded = fx
        .store
        .with_transaction(|tx| tx.load_existing_relations(ids[0], FieldFilter::Slugs(&[])))
        .unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn delete_values_by_id_unlinks_edge() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);
    fx.write(vec![edge(ids[0], "cites", ids[1], json!("c"))]);

    fx.store
        .with_transaction(|tx| -> Result<_, StorageError> {
            let existing = tx.load_existing_relations(ids[0], FieldFilter::All)?;
            let value_ids: Vec<_> = existing.iter().map(|r| r.value_id).collect();
            tx.delete_values_by_id(&value_ids)
        })
        .unwrap();

    assert!(fx.store.project(ids[0], 0).unwrap().unwrap().relations.is_empty());
    assert!(fx.store.pub_exists(ids[1]).unwrap());
}

#[test]
fn edge_index_walks_both_directions() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(3);
    fx.write(vec![
        edge(ids[0], "cites", ids[1], json!("a")),
        edge(ids[0], "authors", ids[1], json!(null)),
        edge(ids[1], "cites", ids[2], json!("b")),
    ]);

    let (out, inc) = fx
        .store
        .with_transaction(|tx| -> Result<_, StorageError> {
            Ok((tx.outgoing(&[ids[0]])?, tx.incoming(&[ids[2]])?))
        })
        .unwrap();

    assert_eq!(out, vec![Edge { source: ids[0], target: ids[1] }]);
    assert_eq!(inc, vec![Edge { source: ids[1], target: ids[2] }]);
}

#[test]
fn delete_pubs_cascades_values_and_inbound_edges() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);
    fx.write(vec![
        scalar(ids[1], "title", json!("Target")),
        edge(ids[0], "cites", ids[1], json!("c")),
    ]);

    fx.store.with_transaction(|tx| tx.delete_pubs(&[ids[1]])).unwrap();

    assert!(!fx.store.pub_exists(ids[1]).unwrap());
    assert_eq!(fx.store.count_values(ids[0]).unwrap(), 0);
}

// ── Transactions ─────────────────────────────────────────────────

#[test]
fn failed_transaction_rolls_back() {
    let fx = make_fixture();
    let id = PubId::new();

    let result = fx.store.with_transaction(|tx| -> Result<(), StorageError> {
        tx.insert_pubs(&[fx.new_pub(id)])?;
        Err(StorageError::InvalidData("abort".into()))
    });

    assert!(result.is_err());
    assert!(!fx.store.pub_exists(id).unwrap());
}

#[test]
fn many_rows_are_chunked() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(1_200);
    assert_eq!(fx.store.pub_ids(fx.community).unwrap().len(), 1_200);

    let found = fx.store.with_transaction(|tx| tx.existing_pubs(fx.community, &ids)).unwrap();
    assert_eq!(found.len(), 1_200);
}

// ── Projection ───────────────────────────────────────────────────

#[test]
fn projection_follows_cycles_to_depth() {
    let fx = make_fixture();
    let ids = fx.seed_pubs(2);
    fx.write(vec![
        edge(ids[0], "cites", ids[1], json!("ab")),
        edge(ids[1], "cites", ids[0], json!("ba")),
    ]);

    let projected = fx.store.project(ids[0], 2).unwrap().unwrap();
    let b = projected.relations[0].related.as_ref().unwrap();
    assert_eq!(b.id(), ids[1]);
    let a_again = b.relations[0].related.as_ref().unwrap();
    assert_eq!(a_again.id(), ids[0]);
    assert!(a_again.relations[0].related.is_none());
}

#[test]
fn projection_of_missing_pub_is_none() {
    let fx = make_fixture();
    assert!(fx.store.project(PubId::new(), 1).unwrap().is_none());
}

#[test]
fn file_backed_store_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pubs.db");
    let community = CommunityId::new();
    let id = PubId::new();

    {
        let store = PubStore::open(&path).unwrap();
        store
            .with_transaction(|tx| {
                tx.insert_pubs(&[NewPub {
                    id,
                    community_id: community,
                    pub_type_id: PubTypeId::new(),
                    stage_id: None,
                }])
            })
            .unwrap();
    }

    let reopened = PubStore::open(&path).unwrap();
    assert_eq!(reopened.pub_ids(community).unwrap(), vec![id]);
}
