//! Tests for LockCoordinator
//!
//! These tests verify:
//! - Non-blocking acquire and AlreadyLocked
//! - Token-checked, idempotent release
//! - Blocking acquire: success after release, timeout, cancellation
//! - Lease imposition on keys stored without expiry
//! - Lease bounds (no panics on huge leases)
//! - Renewal, inspection and scoped guards
//! - Store failures propagate without retries

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use atlaslock::store::{KeyTtl, KvStore, MemoryStore};
use atlaslock::{
    CancelSource, CancelToken, LockCoordinator, LockError, LockPolicy, OwnershipToken, Result,
};

// =============================================================================
// Helper Functions
// =============================================================================

const LEASE: Duration = Duration::from_secs(10);

fn setup_coordinator() -> LockCoordinator<MemoryStore> {
    LockCoordinator::new(MemoryStore::new())
}

fn wait_policy(lease_ms: u64, poll_ms: u64, timeout_ms: u64) -> LockPolicy {
    LockPolicy::from_millis(lease_ms, poll_ms, timeout_ms)
}

/// Store whose every operation fails, counting calls
#[derive(Default)]
struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(LockError::StoreOperationFailed("connection reset mid-call".to_string()))
    }
}

impl KvStore for FailingStore {
    fn conditional_set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<bool> {
        self.fail()
    }
    fn get(&self, _key: &str) -> Result<Option<String>> {
        self.fail()
    }
    fn compare_and_delete(&self, _key: &str, _expected: &str) -> Result<bool> {
        self.fail()
    }
    fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        self.fail()
    }
    fn ttl(&self, _key: &str) -> Result<KeyTtl> {
        self.fail()
    }
    fn compare_and_expire(&self, _key: &str, _expected: &str, _ttl: Duration) -> Result<bool> {
        self.fail()
    }
    fn set(&self, _key: &str, _value: &str) -> Result<()> {
        self.fail()
    }
    fn ping(&self) -> Result<()> {
        self.fail()
    }
}

// =============================================================================
// Non-blocking Acquire Tests
// =============================================================================

#[test]
fn test_acquire_returns_handle() {
    let coordinator = setup_coordinator();

    let handle = coordinator.acquire("res:1", LEASE).unwrap();

    assert_eq!(handle.key(), "res:1");
    assert_eq!(handle.lease(), LEASE);
    assert_eq!(
        coordinator.holder("res:1").unwrap(),
        Some(handle.token().as_stored())
    );
}

#[test]
fn test_acquire_sets_lease_on_record() {
    let coordinator = setup_coordinator();

    coordinator.acquire("res:1", Duration::from_secs(5)).unwrap();

    match coordinator.store().ttl("res:1").unwrap() {
        KeyTtl::Expires(left) => assert!(left <= Duration::from_secs(5)),
        other => panic!("Expected an expiring record, got {:?}", other),
    }
}

#[test]
fn test_second_acquire_is_already_locked() {
    let coordinator = setup_coordinator();
    let first = coordinator.acquire("res:1", LEASE).unwrap();

    let err = coordinator.acquire("res:1", LEASE).unwrap_err();

    assert!(matches!(err, LockError::AlreadyLocked { ref key } if key == "res:1"));
    assert!(err.is_contention());
    // The failed attempt did not disturb the holder
    assert!(coordinator.is_held(&first).unwrap());
}

#[test]
fn test_different_keys_do_not_contend() {
    let coordinator = setup_coordinator();

    let a = coordinator.acquire("res:a", LEASE).unwrap();
    let b = coordinator.acquire("res:b", LEASE).unwrap();

    assert_ne!(a.token(), b.token());
}

#[test]
fn test_mutual_exclusion_under_contention() {
    let coordinator = Arc::new(setup_coordinator());
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                coordinator.acquire("contended", LEASE).ok()
            })
        })
        .collect();

    let winners: Vec<_> = handles
        .into_iter()
        .filter_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(winners.len(), 1);
    assert!(coordinator.is_held(&winners[0]).unwrap());
}

// =============================================================================
// Release Tests
// =============================================================================

#[test]
fn test_release_frees_key() {
    let coordinator = setup_coordinator();
    let handle = coordinator.acquire("res:1", LEASE).unwrap();

    assert!(coordinator.release(&handle).unwrap());

    assert!(!coordinator.is_locked("res:1").unwrap());
    assert!(coordinator.acquire("res:1", LEASE).is_ok());
}

#[test]
fn test_release_twice_returns_false() {
    let coordinator = setup_coordinator();
    let handle = coordinator.acquire("res:1", LEASE).unwrap();

    assert!(coordinator.release(&handle).unwrap());
    assert!(!coordinator.release(&handle).unwrap());
}

#[test]
fn test_release_does_not_touch_foreign_record() {
    let coordinator = setup_coordinator();
    let ours = coordinator.acquire("res:1", LEASE).unwrap();
    coordinator.release(&ours).unwrap();
    let theirs = coordinator.acquire("res:1", LEASE).unwrap();

    // Stale handle from the earlier acquisition
    assert!(!coordinator.release(&ours).unwrap());

    assert!(coordinator.is_held(&theirs).unwrap());
}

#[test]
fn test_release_after_expiry_returns_false() {
    let coordinator = setup_coordinator();
    let handle = coordinator.acquire("res:1", Duration::from_millis(20)).unwrap();

    thread::sleep(Duration::from_millis(50));

    assert!(!coordinator.release(&handle).unwrap());
}

// =============================================================================
// Blocking Acquire Tests
// =============================================================================

#[test]
fn test_acquire_with_wait_free_key_succeeds_immediately() {
    let coordinator = setup_coordinator();
    let start = Instant::now();

    let handle = coordinator
        .acquire_with_wait("res:1", &wait_policy(1000, 10, 1000), &CancelToken::never())
        .unwrap();

    assert!(coordinator.is_held(&handle).unwrap());
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_acquire_with_wait_succeeds_after_release() {
    let coordinator = Arc::new(setup_coordinator());
    let holder = coordinator.acquire("res:1", LEASE).unwrap();

    let releaser = {
        let coordinator = Arc::clone(&coordinator);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(40));
            coordinator.release(&holder).unwrap()
        })
    };

    let handle = coordinator
        .acquire_with_wait("res:1", &wait_policy(1000, 5, 5000), &CancelToken::never())
        .unwrap();

    assert!(releaser.join().unwrap());
    assert!(coordinator.is_held(&handle).unwrap());
}

#[test]
fn test_acquire_with_wait_times_out() {
    let coordinator = setup_coordinator();
    let _holder = coordinator.acquire("res:1", LEASE).unwrap();

    let start = Instant::now();
    let err = coordinator
        .acquire_with_wait("res:1", &wait_policy(1000, 10, 50), &CancelToken::never())
        .unwrap_err();
    let elapsed = start.elapsed();

    match err {
        LockError::AcquireTimeout { key, waited } => {
            assert_eq!(key, "res:1");
            assert!(waited >= Duration::from_millis(50));
        }
        other => panic!("Expected AcquireTimeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_millis(50));
    // timeout + poll, with generous scheduling slack
    assert!(elapsed < Duration::from_millis(50 + 10 + 500));
}

#[test]
fn test_acquire_with_zero_timeout_tries_once() {
    let coordinator = setup_coordinator();
    let _holder = coordinator.acquire("res:1", LEASE).unwrap();

    let err = coordinator
        .acquire_with_wait("res:1", &wait_policy(1000, 10, 0), &CancelToken::never())
        .unwrap_err();

    assert!(matches!(err, LockError::AcquireTimeout { .. }));
}

#[test]
fn test_acquire_with_wait_imposes_lease_on_unleased_key() {
    let coordinator = setup_coordinator();
    coordinator.store().set("legacy", "foreign-value").unwrap();
    assert_eq!(coordinator.store().ttl("legacy").unwrap(), KeyTtl::Persistent);

    let handle = coordinator
        .acquire_with_wait("legacy", &wait_policy(40, 5, 2000), &CancelToken::never())
        .unwrap();

    assert!(coordinator.is_held(&handle).unwrap());
}

#[test]
fn test_acquire_with_wait_leaves_leased_holder_alone() {
    let coordinator = setup_coordinator();
    let holder = coordinator.acquire("res:1", Duration::from_secs(30)).unwrap();

    let _ = coordinator.acquire_with_wait("res:1", &wait_policy(10, 5, 30), &CancelToken::never());

    // Waiter's shorter lease must not have been imposed on the holder
    match coordinator.store().ttl("res:1").unwrap() {
        KeyTtl::Expires(left) => assert!(left > Duration::from_secs(20)),
        other => panic!("Expected an expiring record, got {:?}", other),
    }
    assert!(coordinator.is_held(&holder).unwrap());
}

#[test]
fn test_acquire_with_wait_cancelled_promptly() {
    let coordinator = Arc::new(setup_coordinator());
    let holder = coordinator.acquire("res:1", LEASE).unwrap();
    let source = CancelSource::new();
    let token = source.token();

    let waiter = {
        let coordinator = Arc::clone(&coordinator);
        thread::spawn(move || {
            let start = Instant::now();
            let result = coordinator.acquire_with_wait("res:1", &wait_policy(1000, 200, 10_000), &token);
            (result, start.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(30));
    source.cancel();

    let (result, elapsed) = waiter.join().unwrap();
    assert!(matches!(result, Err(LockError::Cancelled { .. })));
    // Woken mid-sleep rather than after the full budget
    assert!(elapsed < Duration::from_secs(5));
    assert!(coordinator.is_held(&holder).unwrap());
}

#[test]
fn test_pre_cancelled_wait_takes_nothing() {
    let coordinator = setup_coordinator();
    let source = CancelSource::new();
    source.cancel();

    let err = coordinator
        .acquire_with_wait("res:1", &wait_policy(1000, 10, 1000), &source.token())
        .unwrap_err();

    assert!(matches!(err, LockError::Cancelled { .. }));
    assert!(!coordinator.is_locked("res:1").unwrap());
}

#[test]
fn test_acquire_with_wait_rejects_zero_poll_interval() {
    let coordinator = setup_coordinator();

    let err = coordinator
        .acquire_with_wait("res:1", &wait_policy(1000, 0, 1000), &CancelToken::never())
        .unwrap_err();

    assert!(matches!(err, LockError::Config(_)));
}

// =============================================================================
// Lease Bounds Tests
// =============================================================================

#[test]
fn test_oversized_lease_is_config_error_not_panic() {
    let coordinator = setup_coordinator();
    let huge = Duration::from_secs(u64::MAX);

    let result = panic::catch_unwind(AssertUnwindSafe(|| coordinator.acquire("res:1", huge)));
    assert!(matches!(result, Ok(Err(LockError::Config(_)))));

    let policy = LockPolicy::default().with_lease(huge);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        coordinator.acquire_with_wait("res:1", &policy, &CancelToken::never())
    }));
    assert!(matches!(result, Ok(Err(LockError::Config(_)))));

    let mut handle = coordinator.acquire("res:1", LEASE).unwrap();
    let result = panic::catch_unwind(AssertUnwindSafe(|| coordinator.renew(&mut handle, huge)));
    assert!(matches!(result, Ok(Err(LockError::Config(_)))));
    assert!(coordinator.is_held(&handle).unwrap());
}

#[test]
fn test_longest_accepted_lease_does_not_expire() {
    let coordinator = setup_coordinator();
    let longest = Duration::from_millis(atlaslock::config::MAX_LEASE_MS);

    let mut handle = coordinator.acquire("res:1", longest).unwrap();
    assert!(coordinator.renew(&mut handle, longest).unwrap());

    assert!(coordinator.is_held(&handle).unwrap());
    assert!(coordinator.release(&handle).unwrap());
}

#[test]
fn test_store_survives_deadline_overflow() {
    let store = MemoryStore::new();
    let huge = Duration::from_secs(u64::MAX);

    assert!(store.conditional_set("k", "v", huge).unwrap());
    assert_eq!(store.ttl("k").unwrap(), KeyTtl::Persistent);
    assert!(store.expire("k", huge).unwrap());
    assert!(store.compare_and_expire("k", "v", huge).unwrap());
    assert_eq!(store.get("k").unwrap(), Some("v".to_string()));
}

#[test]
fn test_sub_millisecond_lease_is_accepted() {
    let coordinator = setup_coordinator();

    let handle = coordinator.acquire("res:1", Duration::from_micros(500)).unwrap();
    assert_eq!(handle.lease(), Duration::from_micros(500));

    // The lease is kept as given, so it lapses almost at once
    thread::sleep(Duration::from_millis(20));
    assert!(!coordinator.is_locked("res:1").unwrap());
}

// =============================================================================
// Renewal & Inspection Tests
// =============================================================================

#[test]
fn test_renew_extends_lease() {
    let coordinator = setup_coordinator();
    let mut handle = coordinator.acquire("res:1", Duration::from_millis(50)).unwrap();

    assert!(coordinator.renew(&mut handle, Duration::from_secs(10)).unwrap());
    thread::sleep(Duration::from_millis(80));

    assert!(coordinator.is_held(&handle).unwrap());
    assert_eq!(handle.lease(), Duration::from_secs(10));
}

#[test]
fn test_renew_refuses_foreign_token() {
    let coordinator = setup_coordinator();
    let holder = coordinator.acquire("res:1", LEASE).unwrap();
    let mut stranger = atlaslock::LockHandle::from_parts(
        "res:1",
        OwnershipToken::mint(),
        std::time::SystemTime::now(),
        LEASE,
    );

    assert!(!coordinator.renew(&mut stranger, Duration::from_secs(60)).unwrap());
    assert!(!coordinator.release(&stranger).unwrap());
    assert!(coordinator.is_held(&holder).unwrap());
}

#[test]
fn test_holder_and_is_locked() {
    let coordinator = setup_coordinator();
    assert_eq!(coordinator.holder("res:1").unwrap(), None);
    assert!(!coordinator.is_locked("res:1").unwrap());

    let handle = coordinator.acquire("res:1", LEASE).unwrap();

    assert_eq!(coordinator.holder("res:1").unwrap(), Some(handle.token().to_string()));
    assert!(coordinator.is_locked("res:1").unwrap());
}

// =============================================================================
// Guard Tests
// =============================================================================

#[test]
fn test_guard_releases_on_drop() {
    let coordinator = setup_coordinator();
    {
        let guard = coordinator.try_lock("res:1").unwrap();
        assert!(coordinator.is_held(guard.handle()).unwrap());
        assert!(coordinator.try_lock("res:1").is_err());
    }
    assert!(!coordinator.is_locked("res:1").unwrap());
}

#[test]
fn test_guard_unlock_reports_outcome() {
    let coordinator = setup_coordinator();
    let guard = coordinator.lock("res:1").unwrap();

    assert!(guard.unlock().unwrap());
    assert!(!coordinator.is_locked("res:1").unwrap());
}

#[test]
fn test_guard_into_handle_keeps_lock() {
    let coordinator = setup_coordinator();
    let handle = coordinator.try_lock("res:1").unwrap().into_handle();

    assert!(coordinator.is_held(&handle).unwrap());
}

#[test]
fn test_with_lock_returns_value_and_releases() {
    let coordinator = setup_coordinator();

    let value = coordinator
        .with_lock("res:1", |handle| {
            assert_eq!(handle.key(), "res:1");
            42
        })
        .unwrap();

    assert_eq!(value, 42);
    assert!(!coordinator.is_locked("res:1").unwrap());
}

#[test]
fn test_with_lock_releases_on_panic() {
    let coordinator = setup_coordinator();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        coordinator.with_lock("res:1", |_| panic!("critical section failed"))
    }));

    assert!(outcome.is_err());
    assert!(!coordinator.is_locked("res:1").unwrap());
}

// =============================================================================
// Failure Propagation Tests
// =============================================================================

#[test]
fn test_store_failure_propagates_from_acquire() {
    let coordinator = LockCoordinator::new(FailingStore::default());

    let err = coordinator.acquire("res:1", LEASE).unwrap_err();

    assert!(matches!(err, LockError::StoreOperationFailed(_)));
    assert!(!err.is_contention());
}

#[test]
fn test_store_failure_is_not_retried_by_wait_loop() {
    let coordinator = LockCoordinator::new(FailingStore::default());

    let err = coordinator
        .acquire_with_wait("res:1", &wait_policy(1000, 1, 1000), &CancelToken::never())
        .unwrap_err();

    assert!(matches!(err, LockError::StoreOperationFailed(_)));
    assert_eq!(coordinator.store().calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_store_failure_propagates_from_release() {
    let coordinator = LockCoordinator::new(FailingStore::default());
    let handle = atlaslock::LockHandle::from_parts(
        "res:1",
        OwnershipToken::mint(),
        std::time::SystemTime::now(),
        LEASE,
    );

    assert!(coordinator.release(&handle).is_err());
}
