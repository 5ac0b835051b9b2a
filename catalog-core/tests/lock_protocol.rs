/*
    lock_protocol.rs - Writer lock lease protocol

    Several managers opened on the same store file stand in for separate desktop
    processes. A shared ManualClock drives lease age deterministically.
*/

use catalog_core::clock::{Clock, ManualClock};
use catalog_core::test_utils::TEST_IO_TIMEOUT;
use catalog_core::writer_lock::{LockManager, LockTarget, MAIN_LOCK_KEY};
use proptest::prelude::*;
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const LEASE: Duration = Duration::from_secs(60);

fn manager(path: &Path, clock: &ManualClock) -> LockManager {
    LockManager::open(path, TEST_IO_TIMEOUT)
        .unwrap()
        .with_clock(Arc::new(clock.clone()))
}

#[test]
fn test_alice_bob_takeover_scenario() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("a.db");
    let clock = ManualClock::starting_now();

    let alice = manager(&store, &clock);
    let bob = manager(&store, &clock);

    let alice_grant = alice
        .try_acquire("alice", LEASE, MAIN_LOCK_KEY)
        .unwrap()
        .into_grant()
        .unwrap();

    clock.advance(Duration::from_secs(10));
    let attempt = bob.try_acquire("bob", LEASE, MAIN_LOCK_KEY).unwrap();
    assert!(!attempt.acquired());
    assert_eq!(attempt.holder(), "alice");

    clock.advance(Duration::from_secs(55));
    let attempt = bob.try_acquire("bob", LEASE, MAIN_LOCK_KEY).unwrap();
    assert!(attempt.acquired());
    assert_eq!(attempt.holder(), "bob");

    assert!(!alice.heartbeat(&alice_grant.token, MAIN_LOCK_KEY).unwrap());
}

#[test]
fn test_stale_release_leaves_new_holder_in_place() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("a.db");
    let clock = ManualClock::starting_now();

    let alice = manager(&store, &clock);
    let bob = manager(&store, &clock);

    let old = alice
        .try_acquire("alice", LEASE, MAIN_LOCK_KEY)
        .unwrap()
        .into_grant()
        .unwrap();
    clock.advance(Duration::from_secs(61));
    let new = bob
        .try_acquire("bob", LEASE, MAIN_LOCK_KEY)
        .unwrap()
        .into_grant()
        .unwrap();
    assert_eq!(new.stolen_from.as_deref(), Some("alice"));

    assert!(!alice.release(&old.token, MAIN_LOCK_KEY).unwrap());
    assert!(!alice.release(&old.token, MAIN_LOCK_KEY).unwrap());
    assert_eq!(
        bob.current(MAIN_LOCK_KEY).unwrap().unwrap().holder,
        "bob"
    );

    assert!(bob.release(&new.token, MAIN_LOCK_KEY).unwrap());
    assert!(!bob.release(&new.token, MAIN_LOCK_KEY).unwrap());
    assert!(bob.current(MAIN_LOCK_KEY).unwrap().is_none());
}

#[test]
fn test_heartbeat_keeps_lease_past_timeout() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("a.db");
    let clock = ManualClock::starting_now();

    let alice = manager(&store, &clock);
    let bob = manager(&store, &clock);

    let grant = alice
        .try_acquire("alice", LEASE, MAIN_LOCK_KEY)
        .unwrap()
        .into_grant()
        .unwrap();

    for _ in 0..6 {
        clock.advance(Duration::from_secs(15));
        assert!(alice.heartbeat(&grant.token, MAIN_LOCK_KEY).unwrap());
    }

    let attempt = bob.try_acquire("bob", LEASE, MAIN_LOCK_KEY).unwrap();
    assert!(!attempt.acquired());
}

#[test]
fn test_independent_keys_do_not_contend() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("a.db");
    let clock = ManualClock::starting_now();
    let manager = manager(&store, &clock);

    assert!(manager.try_acquire("alice", LEASE, "MAIN").unwrap().acquired());
    assert!(manager.try_acquire("bob", LEASE, "REPORTS").unwrap().acquired());
    assert_eq!(manager.list().unwrap().len(), 2);

    assert_eq!(
        manager
            .force_clear(&LockTarget::Key("REPORTS".to_string()))
            .unwrap(),
        1
    );
    assert_eq!(manager.list().unwrap().len(), 1);
}

#[test]
fn test_concurrent_acquire_has_single_winner() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("a.db");
    LockManager::open(&store, TEST_IO_TIMEOUT).unwrap();

    let contenders = 8;
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|i| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let manager = LockManager::open(&store, Duration::from_secs(10)).unwrap();
                barrier.wait();
                manager
                    .try_acquire(&format!("user-{}", i), LEASE, MAIN_LOCK_KEY)
                    .unwrap()
                    .acquired()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// While the lease stays fresh only the first attempt wins
    #[test]
    fn prop_fresh_lease_has_one_winner(
        attempts in prop::collection::vec((0usize..4, 0u64..=5), 1..12)
    ) {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("a.db");
        let clock = ManualClock::starting_now();
        let manager = manager(&store, &clock);

        let mut winners = Vec::new();
        for (who, wait) in &attempts {
            clock.advance(Duration::from_secs(*wait));
            let holder = format!("user-{}", who);
            let outcome = manager.try_acquire(&holder, LEASE, MAIN_LOCK_KEY).unwrap();
            if outcome.acquired() {
                winners.push(holder);
            } else {
                prop_assert_eq!(outcome.holder(), format!("user-{}", attempts[0].0));
            }
        }

        prop_assert_eq!(winners.len(), 1);
    }

    /// Acquire succeeds exactly when there is no row or the last heartbeat is older than the lease
    #[test]
    fn prop_acquire_matches_lease_model(
        attempts in prop::collection::vec((0usize..3, 0u64..90), 1..16)
    ) {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("a.db");
        let clock = ManualClock::starting_now();
        let manager = manager(&store, &clock);

        let mut last_heartbeat: Option<chrono::NaiveDateTime> = None;
        for (who, wait) in attempts {
            clock.advance(Duration::from_secs(wait));
            let now = clock.now();
            let expected = match last_heartbeat {
                None => true,
                Some(at) => (now - at).num_seconds() > LEASE.as_secs() as i64,
            };

            let outcome = manager
                .try_acquire(&format!("user-{}", who), LEASE, MAIN_LOCK_KEY)
                .unwrap();
            prop_assert_eq!(outcome.acquired(), expected);
            if outcome.acquired() {
                last_heartbeat = Some(now);
            }
        }
    }
}
