//! Membership events routed through the member handler

mod helpers;

use bcg_cluster::{Member, MemberObserver, NodeMeta};
use bcg_mgmt::{MemberHandler, ZoneStore};
use helpers::*;

fn handler(h: &Harness) -> MemberHandler {
    MemberHandler::new(h.store.clone(), h.service.clone())
}

#[tokio::test]
async fn test_management_join_adds_consensus_voter() {
    let h = Harness::leader();
    let events = handler(&h);

    events.notify_join(&mgmt("mgmt-2", "10.0.0.3", 7070, 7081));

    let store = h.store.clone();
    assert!(eventually(|| !store.joins.lock().is_empty()).await);
    assert_eq!(
        *h.store.joins.lock(),
        vec![("mgmt-2".to_string(), "10.0.0.3:7081".to_string())]
    );
}

#[tokio::test]
async fn test_music_leave_triggers_promotion() {
    let h = Harness::leader();
    h.store.insert_zone(zone("Z", "Living Room", "A", &["A", "B", "C"]));
    h.members.remove("A");
    let events = handler(&h);

    events.notify_leave(&music("A", "10.0.0.10"));

    let store = h.store.clone();
    assert!(eventually(|| store.zone("Z").map(|z| z.leader_id) == Some("B".to_string())).await);
    assert_eq!(h.speakers.forwards("B"), set(&["C"]));
}

#[tokio::test]
async fn test_music_join_triggers_restore() {
    let h = Harness::leader();
    h.store.insert_zone(zone("Z", "Living Room", "A", &["A", "B"]));
    let events = handler(&h);

    events.notify_join(&music("B", "10.0.0.11"));

    let speakers = h.speakers.clone();
    assert!(eventually(|| speakers.state("B").broadcasting == Some(false)).await);
    assert_eq!(h.speakers.forwards("A"), set(&["B"]));
}

#[tokio::test]
async fn test_other_events_are_only_logged() {
    let h = Harness::leader();
    h.store.insert_zone(zone("Z", "Living Room", "A", &["A", "B"]));
    let events = handler(&h);

    let frontend = Member::new(
        "remote",
        "10.0.0.30:7946".parse().unwrap(),
        NodeMeta {
            role: bcg_cluster::NodeRole::Frontend,
            rtsp_port: 0,
            api_port: 8080,
            raft_port: 0,
        }
        .encode()
        .unwrap(),
    );
    events.notify_join(&frontend);
    events.notify_leave(&frontend);
    events.notify_update(&music("A", "10.0.0.10"));
    events.notify_join(&Member::new("garbled", "10.0.0.31:7946".parse().unwrap(), vec![0xff; 3]));
    // a management node leaving is left to consensus
    events.notify_leave(&mgmt("mgmt-2", "10.0.0.3", 7070, 7081));

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(h.speakers.calls().is_empty());
    assert!(h.store.joins.lock().is_empty());
    assert_eq!(h.store.zone_configs().len(), 1);
}
