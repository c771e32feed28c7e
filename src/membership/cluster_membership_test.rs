use super::ClusterMembership;
use super::LeaderInfo;
use super::NodeMeta;

fn three_node_roster() -> Vec<NodeMeta> {
    vec![
        NodeMeta {
            id: 1,
            address: "127.0.0.1:9081".parse().unwrap(),
        },
        NodeMeta {
            id: 2,
            address: "127.0.0.1:9082".parse().unwrap(),
        },
        NodeMeta {
            id: 3,
            address: "127.0.0.1:9083".parse().unwrap(),
        },
    ]
}

/// # Case 1: Peer queries exclude the local node
#[test]
fn test_peer_queries_case1_exclude_self() {
    let membership = ClusterMembership::new(1, three_node_roster());

    let mut peer_ids = membership.peer_ids();
    peer_ids.sort_unstable();

    assert_eq!(membership.cluster_size(), 3);
    assert_eq!(peer_ids, vec![2, 3]);
    assert_eq!(membership.peers().len(), 2);
}

/// # Case 2: Address lookup resolves every roster entry
#[test]
fn test_peer_queries_case2_address_lookup() {
    let membership = ClusterMembership::new(1, three_node_roster());

    assert_eq!(
        membership.peer_address(2),
        Some("127.0.0.1:9082".parse().unwrap())
    );
    assert_eq!(membership.peer_address(99), None);
}

/// # Case 1: Marking a leader publishes it to readers
#[test]
fn test_leader_tracking_case1_mark_and_read() {
    let membership = ClusterMembership::new(1, three_node_roster());
    assert_eq!(membership.current_leader(), None);

    membership.mark_leader(2, 7);

    assert_eq!(
        membership.current_leader(),
        Some(LeaderInfo { leader_id: 2, term: 7 })
    );
    assert_eq!(
        membership.current_leader_address(),
        Some("127.0.0.1:9082".parse().unwrap())
    );
}

/// # Case 2: Resetting clears the observation
#[test]
fn test_leader_tracking_case2_reset() {
    let membership = ClusterMembership::new(1, three_node_roster());
    membership.mark_leader(2, 7);

    membership.reset_leader();

    assert_eq!(membership.current_leader(), None);
    assert_eq!(membership.current_leader_address(), None);
}

/// # Case 3: A newer observation replaces the old one
#[test]
fn test_leader_tracking_case3_overwrite() {
    let membership = ClusterMembership::new(1, three_node_roster());
    membership.mark_leader(2, 7);

    membership.mark_leader(3, 8);

    assert_eq!(
        membership.current_leader(),
        Some(LeaderInfo { leader_id: 3, term: 8 })
    );
}

/// # Case 1: Majority math follows cluster size
#[test]
fn test_majority_case1_three_nodes() {
    let membership = ClusterMembership::new(1, three_node_roster());

    assert!(!membership.is_cluster_majority(1));
    assert!(membership.is_cluster_majority(2));
    assert!(membership.is_cluster_majority(3));
}

/// # Case 2: Single node cluster is its own majority
#[test]
fn test_majority_case2_single_node() {
    let membership = ClusterMembership::new(
        1,
        vec![NodeMeta {
            id: 1,
            address: "127.0.0.1:9081".parse().unwrap(),
        }],
    );

    assert!(membership.is_cluster_majority(1));
    assert!(membership.peer_ids().is_empty());
}
