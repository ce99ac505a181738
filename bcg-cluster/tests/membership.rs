//! Membership behaviour between real nodes on the loopback interface

use bcg_cluster::{
    filter_by_role, ClusterError, Member, MemberObserver, MemberView, Membership,
    MembershipConfig, NodeMeta, NodeRole,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    fn saw(&self, event: &str) -> bool {
        self.events.lock().iter().any(|e| e == event)
    }
}

impl MemberObserver for Recorder {
    fn notify_join(&self, member: &Member) {
        self.events.lock().push(format!("join:{}", member.name));
    }

    fn notify_leave(&self, member: &Member) {
        self.events.lock().push(format!("leave:{}", member.name));
    }

    fn notify_update(&self, member: &Member) {
        self.events.lock().push(format!("update:{}", member.name));
    }
}

fn fast_config(name: &str, meta: NodeMeta) -> MembershipConfig {
    let mut config = MembershipConfig::new(name, "127.0.0.1:0".parse().unwrap(), meta);
    config.gossip_interval = Duration::from_millis(50);
    config.failure_detection_interval = Duration::from_millis(50);
    config.suspect_timeout = Duration::from_millis(300);
    config.dead_timeout = Duration::from_millis(600);
    config.join_timeout = Duration::from_secs(2);
    config
}

async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn names(view: &dyn MemberView) -> Vec<String> {
    view.members().into_iter().map(|m| m.name).collect()
}

#[tokio::test]
async fn test_nodes_see_each_other_after_join() {
    let seed = Membership::new(fast_config("mgmt-1", NodeMeta::management(7070, 7080)))
        .await
        .unwrap();
    let speaker = Membership::new(fast_config("kitchen", NodeMeta::music(5000, 7071)))
        .await
        .unwrap();

    let seed_events = Arc::new(Recorder::default());
    seed.register_observer(seed_events.clone());

    seed.start();
    speaker.start();
    speaker.join(seed.local_addr()).await.unwrap();

    eventually("seed to see the speaker", || seed.members().len() == 2).await;
    assert_eq!(names(seed.as_ref()), vec!["kitchen", "mgmt-1"]);
    assert_eq!(names(speaker.as_ref()), vec!["kitchen", "mgmt-1"]);
    assert!(seed_events.saw("join:kitchen"));

    let music = seed.filter_by_role(NodeRole::Music);
    assert_eq!(music.len(), 1);
    assert_eq!(music[0].meta().unwrap().rtsp_port, 5000);
    assert_eq!(music[0].addr, speaker.local_addr());

    seed.shutdown();
    speaker.shutdown();
}

#[tokio::test]
async fn test_third_node_learns_the_whole_table() {
    let seed = Membership::new(fast_config("mgmt-1", NodeMeta::management(7070, 7080)))
        .await
        .unwrap();
    let first = Membership::new(fast_config("kitchen", NodeMeta::music(5000, 7071)))
        .await
        .unwrap();
    let second = Membership::new(fast_config("porch", NodeMeta::music(5001, 7072)))
        .await
        .unwrap();

    let first_events = Arc::new(Recorder::default());
    first.register_observer(first_events.clone());

    for node in [&seed, &first, &second] {
        node.start();
    }
    first.join(seed.local_addr()).await.unwrap();
    second.join(seed.local_addr()).await.unwrap();

    eventually("all nodes to converge", || {
        [&seed, &first, &second]
            .iter()
            .all(|node| node.members().len() == 3)
    })
    .await;
    eventually("kitchen to hear about porch", || first_events.saw("join:porch")).await;

    for node in [&seed, &first, &second] {
        node.shutdown();
    }
}

#[tokio::test]
async fn test_metadata_update_reaches_peers() {
    let seed = Membership::new(fast_config("mgmt-1", NodeMeta::management(7070, 7080)))
        .await
        .unwrap();
    let speaker = Membership::new(fast_config("kitchen", NodeMeta::music(5000, 7071)))
        .await
        .unwrap();

    let seed_events = Arc::new(Recorder::default());
    seed.register_observer(seed_events.clone());

    seed.start();
    speaker.start();
    speaker.join(seed.local_addr()).await.unwrap();
    eventually("seed to see the speaker", || seed.members().len() == 2).await;

    speaker.update_meta(NodeMeta::music(6000, 7071)).await.unwrap();

    eventually("update event", || seed_events.saw("update:kitchen")).await;
    let music = seed.filter_by_role(NodeRole::Music);
    assert_eq!(music[0].meta().unwrap().rtsp_port, 6000);
    assert_eq!(speaker.local_member().meta().unwrap().rtsp_port, 6000);

    seed.shutdown();
    speaker.shutdown();
}

#[tokio::test]
async fn test_graceful_leave_is_reported() {
    let seed = Membership::new(fast_config("mgmt-1", NodeMeta::management(7070, 7080)))
        .await
        .unwrap();
    let speaker = Membership::new(fast_config("kitchen", NodeMeta::music(5000, 7071)))
        .await
        .unwrap();

    let seed_events = Arc::new(Recorder::default());
    seed.register_observer(seed_events.clone());

    seed.start();
    speaker.start();
    speaker.join(seed.local_addr()).await.unwrap();
    eventually("seed to see the speaker", || seed.members().len() == 2).await;

    speaker.leave().await;

    eventually("leave event", || seed_events.saw("leave:kitchen")).await;
    assert_eq!(names(seed.as_ref()), vec!["mgmt-1"]);

    seed.shutdown();
}

#[tokio::test]
async fn test_silent_node_is_declared_dead() {
    let seed = Membership::new(fast_config("mgmt-1", NodeMeta::management(7070, 7080)))
        .await
        .unwrap();
    let speaker = Membership::new(fast_config("kitchen", NodeMeta::music(5000, 7071)))
        .await
        .unwrap();

    let seed_events = Arc::new(Recorder::default());
    seed.register_observer(seed_events.clone());

    seed.start();
    speaker.start();
    speaker.join(seed.local_addr()).await.unwrap();
    eventually("seed to see the speaker", || seed.members().len() == 2).await;

    // stop answering without saying goodbye
    speaker.shutdown();

    eventually("failure detection", || seed_events.saw("leave:kitchen")).await;
    assert_eq!(seed.members().len(), 1);

    seed.shutdown();
}

#[tokio::test]
async fn test_join_unreachable_seed_fails() {
    let mut config = fast_config("lonely", NodeMeta::music(5000, 7070));
    config.join_timeout = Duration::from_millis(200);
    let node = Membership::new(config).await.unwrap();
    node.start();

    // bind and immediately drop a socket to get a port nobody answers on
    let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let seed = silent.local_addr().unwrap();
    drop(silent);

    let result = node.join(seed).await;
    assert!(matches!(result, Err(ClusterError::Network(_))));
    assert_eq!(node.members().len(), 1);

    node.shutdown();
}

fn role_strategy() -> impl Strategy<Value = Option<NodeRole>> {
    prop_oneof![
        Just(Some(NodeRole::Music)),
        Just(Some(NodeRole::Management)),
        Just(Some(NodeRole::Frontend)),
        Just(None),
    ]
}

proptest! {
    #[test]
    fn prop_filter_by_role_partitions_decodable_members(roles in prop::collection::vec(role_strategy(), 0..20)) {
        let members: Vec<Member> = roles
            .iter()
            .enumerate()
            .map(|(i, role)| {
                let meta = match role {
                    Some(NodeRole::Music) => NodeMeta::music(5000, 7070).encode().unwrap(),
                    Some(NodeRole::Management) => NodeMeta::management(7070, 7080).encode().unwrap(),
                    Some(NodeRole::Frontend) => {
                        let mut meta = NodeMeta::music(0, 8080);
                        meta.role = NodeRole::Frontend;
                        meta.encode().unwrap()
                    }
                    None => vec![0xde, 0xad],
                };
                Member::new(format!("node-{}", i), "127.0.0.1:7946".parse().unwrap(), meta)
            })
            .collect();

        let mut total = 0;
        for role in [NodeRole::Music, NodeRole::Management, NodeRole::Frontend] {
            let matched = filter_by_role(members.clone(), role);
            prop_assert!(matched.iter().all(|m| m.has_role(role)));
            prop_assert_eq!(matched.len(), roles.iter().filter(|r| **r == Some(role)).count());
            total += matched.len();
        }
        prop_assert_eq!(total, roles.iter().filter(|r| r.is_some()).count());
    }
}
