//! Tests for the coordinator event loop.
//!
//! # Test Strategy
//!
//! 1. **Startup**: the first published hash is rebalanced
//! 2. **Events**: leave/join/capacity changes end in a rebalanced hash of
//!    the latest membership
//! 3. **Readers**: routing and concurrent reads see complete hashes only
//! 4. **Lifecycle**: rejected events and shutdown

use std::collections::HashSet;
use std::sync::Arc;

use coordinator::{Coordinator, CoordinatorError, MembershipEvent};
use corelib::{
    Address, CapacityFactors, ConsistentHash, Error, FactoryKind, HashConfig, HashKind,
    OwnershipStatistics, TopologyInfo,
};
use replication::{build_factory, ConsistentHashFactory, TopologyAwareFactory};

fn racked(i: usize) -> Address {
    Address::named(&format!("n{i}"))
        .with_topology(TopologyInfo::parse(&format!("s1/r{}/m{i}", i % 2)))
}

fn config() -> HashConfig {
    HashConfig::new(60, 2).with_factory(FactoryKind::TopologyAware)
}

async fn start(n: usize) -> Coordinator {
    let factory: Arc<dyn ConsistentHashFactory> = Arc::new(TopologyAwareFactory::new());
    Coordinator::start(factory, config(), (0..n).map(racked).collect())
        .await
        .unwrap()
}

fn assert_complete(ch: &ConsistentHash) {
    let k = ch.expected_owners();
    for segment in 0..ch.num_segments() {
        let owners = ch.locate_owners(segment).unwrap();
        assert_eq!(owners.len(), k, "segment {segment}");
        let distinct: HashSet<_> = owners.iter().map(|o| o.id).collect();
        assert_eq!(distinct.len(), k);
    }
    assert_eq!(
        OwnershipStatistics::new(ch).sum_owned(),
        ch.num_segments() * k
    );
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn test_start_publishes_rebalanced_hash() {
    let coordinator = start(4).await;
    let current = coordinator.current();
    assert_eq!(current.topology_id, 1);
    assert!(current.rebalanced);
    assert_complete(&current.ch);
    assert_eq!(current.ch.members().len(), 4);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_start_rejects_invalid_config() {
    let factory: Arc<dyn ConsistentHashFactory> = Arc::new(TopologyAwareFactory::new());
    let result = Coordinator::start(factory, HashConfig::new(0, 2), vec![racked(0)]).await;
    assert!(matches!(
        result,
        Err(CoordinatorError::Hash(Error::InvalidConfiguration(_)))
    ));
}

#[tokio::test]
async fn test_start_from_built_factory() {
    let config = HashConfig::new(32, 3).with_hash(HashKind::Blake3);
    let factory: Arc<dyn ConsistentHashFactory> = Arc::from(build_factory(&config).unwrap());
    let coordinator = Coordinator::start(factory, config, (0..5).map(racked).collect())
        .await
        .unwrap();
    assert_complete(&coordinator.current().ch);
    coordinator.shutdown().await;
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_leave_then_rebalance() {
    let coordinator = start(4).await;
    let n0 = racked(0);

    let topology_id = coordinator.leave(&n0).await.unwrap();
    assert_eq!(topology_id, 2);
    assert!(!coordinator.current().ch.is_member(&n0));

    let balanced = coordinator.wait_until_balanced().await.unwrap();
    assert!(balanced.topology_id >= 3);
    assert_complete(&balanced.ch);
    assert!(balanced.ch.segments_for_owner(&n0).is_empty());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_burst_of_events_settles_on_latest_membership() {
    let coordinator = start(4).await;
    let mut expected: Vec<Address> = (0..4).map(racked).collect();

    for i in 4..10 {
        coordinator.join(racked(i), None).await.unwrap();
        expected.push(racked(i));
    }
    for i in [1, 5, 7] {
        coordinator.leave(&racked(i)).await.unwrap();
        expected.retain(|m| *m != racked(i));
    }

    let balanced = coordinator.wait_until_balanced().await.unwrap();
    assert_eq!(balanced.ch.members(), expected.as_slice());
    assert_complete(&balanced.ch);

    // The published result is exactly what a direct rebalance produces.
    let factory = TopologyAwareFactory::new();
    assert_eq!(factory.rebalance(&balanced.ch).unwrap(), balanced.ch);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_capacity_change_shifts_ownership() {
    let coordinator = start(4).await;
    let heavy = racked(2);
    coordinator.set_capacity_factor(&heavy, 2.0).await.unwrap();

    let balanced = coordinator.wait_until_balanced().await.unwrap();
    assert_eq!(balanced.ch.capacity_factor(&heavy).unwrap(), 2.0);
    let stats = OwnershipStatistics::new(&balanced.ch);
    assert!(stats.owned(&heavy).unwrap() > stats.owned(&racked(0)).unwrap());
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_view_replaces_members() {
    let coordinator = start(4).await;
    let members: Vec<Address> = (10..13).map(racked).collect();
    coordinator
        .apply(MembershipEvent::View {
            members: members.clone(),
            capacity_factors: CapacityFactors::new(),
        })
        .await
        .unwrap();

    let balanced = coordinator.wait_until_balanced().await.unwrap();
    assert_eq!(balanced.ch.members(), members.as_slice());
    assert_complete(&balanced.ch);
    coordinator.shutdown().await;
}

// ============================================================================
// Readers
// ============================================================================

#[tokio::test]
async fn test_router_follows_published_hash() {
    let coordinator = start(4).await;
    let router = coordinator.router();
    let hash = HashKind::default().build();

    let current = coordinator.current();
    for key in ["alpha", "beta", "gamma"] {
        let key_hash = hash.hash(key.as_bytes());
        assert_eq!(
            router.owners_for_key(key.as_bytes()),
            current.ch.locate_owners_for_key(key_hash)
        );
        assert_eq!(
            router.segment_for_key(key.as_bytes()),
            current.ch.segment_for_key(key_hash)
        );
    }

    coordinator.leave(&racked(0)).await.unwrap();
    let balanced = coordinator.wait_until_balanced().await.unwrap();
    assert_eq!(router.topology_id(), balanced.topology_id);
    let owners = router.owners_for_key(b"alpha");
    assert!(!owners.contains(&racked(0)));
    assert_eq!(router.primary_owner_for_key(b"alpha"), owners.first().cloned());
    coordinator.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readers_never_see_partial_hashes() {
    let coordinator = Arc::new(start(6).await);
    let reader = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            let mut last = 0;
            for _ in 0..500 {
                let current = coordinator.current();
                assert!(current.topology_id >= last);
                last = current.topology_id;
                assert_eq!(current.ch.segment_owners().len(), 60);
                for owners in current.ch.segment_owners() {
                    assert!(owners.len() <= 2);
                    for owner in owners {
                        assert!(current.ch.is_member(owner));
                    }
                }
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 6..12 {
        coordinator.join(racked(i), None).await.unwrap();
        coordinator.leave(&racked(i - 6)).await.unwrap();
    }
    reader.await.unwrap();
    assert_complete(&coordinator.wait_until_balanced().await.unwrap().ch);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_sees_publications() {
    let coordinator = start(3).await;
    let mut updates = coordinator.subscribe();
    let topology_id = coordinator.join(racked(3), None).await.unwrap();
    updates.changed().await.unwrap();
    assert!(*updates.borrow_and_update() >= topology_id);
    coordinator.shutdown().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_rejected_event_leaves_state_unchanged() {
    let coordinator = start(3).await;
    let before = coordinator.current();

    let err = coordinator.leave(&Address::named("ghost")).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Hash(Error::InvalidArgument(_))));
    let err = coordinator.join(racked(1), None).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::Hash(Error::InvalidArgument(_))));

    assert_eq!(coordinator.current().topology_id, before.topology_id);
    coordinator.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_coordinator() {
    let coordinator = start(3).await;
    coordinator.shutdown().await;
    assert!(matches!(
        coordinator.join(racked(5), None).await,
        Err(CoordinatorError::Closed)
    ));
    // Readers keep the last published hash.
    assert_complete(&coordinator.current().ch);
    // Idempotent.
    coordinator.shutdown().await;
}
