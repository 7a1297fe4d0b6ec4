use proptest::prelude::*;
use pubgraph_types::{CommunityId, PubId, ValueId};
use std::collections::HashSet;
use std::str::FromStr;

// ── PubId ─────────────────────────────────────────────────────────

#[test]
fn pub_id_new_is_unique() {
    let ids: HashSet<PubId> = (0..1000).map(|_| PubId::new()).collect();
    assert_eq!(ids.len(), 1000);
}

#[test]
fn pub_id_display_and_parse() {
    let id = PubId::new();
    let parsed = PubId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn pub_id_parse_invalid() {
    assert!(PubId::parse("not-a-uuid").is_err());
    assert!(PubId::from_str("").is_err());
}

#[test]
fn pub_ids_sort_by_creation() {
    let a = PubId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = PubId::new();
    assert!(a < b);
}

#[test]
fn pub_id_serializes_as_plain_string() {
    let id = PubId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let back: PubId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

// ── Distinct id types ────────────────────────────────────────────

#[test]
fn ids_share_uuid_but_not_type() {
    let uuid = uuid::Uuid::now_v7();
    let community = CommunityId::from_uuid(uuid);
    let value = ValueId::from(uuid);
    assert_eq!(community.as_uuid(), value.as_uuid());
}

proptest! {
    #[test]
    fn any_uuid_survives_display(bytes in any::<[u8; 16]>()) {
        let id = PubId::from_uuid(uuid::Uuid::from_bytes(bytes));
        prop_assert_eq!(PubId::parse(&id.to_string()).unwrap(), id);
    }
}
