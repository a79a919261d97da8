mod support;

use std::time::Duration;

use ddb_pool::config::PoolConfig;
use ddb_pool::error::PoolError;
use ddb_pool::pool::Pool;

use support::{FailOnceValidator, FakeFactory, FakeSession, FakeValidator};

async fn small_pool(
    max_size: usize,
    block_when_exhausted: bool,
) -> Pool<FakeSession, FakeFactory, FakeValidator> {
    let config = PoolConfig::builder()
        .min_size(0)
        .max_size(max_size)
        .initial_size(0)
        .max_wait(Duration::from_millis(200))
        .block_when_exhausted(block_when_exhausted)
        .build()
        .unwrap();
    Pool::new(config, FakeFactory::default(), FakeValidator)
        .await
        .unwrap()
}

#[tokio::test]
async fn s1_saturate_and_queue() {
    let config = PoolConfig::builder()
        .min_size(0)
        .max_size(2)
        .initial_size(0)
        .block_when_exhausted(true)
        .max_wait(Duration::from_secs(1))
        .build()
        .unwrap();
    let pool = Pool::new(config, FakeFactory::default(), FakeValidator)
        .await
        .unwrap();

    let h1 = pool.acquire().await.unwrap();
    let h2 = pool.acquire().await.unwrap();
    assert_eq!(pool.stats().total, 2);

    let pool2 = pool.clone();
    let waiter = tokio::spawn(async move { pool2.acquire().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.stats().waiters, 1, "third borrow should be queued");

    h1.close().await;
    let h3 = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter task didn't finish")
        .unwrap()
        .expect("third borrow should succeed once a handle returns");

    // A fourth borrow with no further release times out after maxWait.
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::Timeout));

    h2.close().await;
    h3.close().await;
}

#[tokio::test]
async fn s2_fail_fast_when_exhausted() {
    let pool = small_pool(2, false).await;
    let _h1 = pool.acquire().await.unwrap();
    let _h2 = pool.acquire().await.unwrap();

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::PoolExhausted));
}

#[tokio::test]
async fn s3_validator_rejects_stale_session_on_borrow() {
    // First validate call (the initial borrow's testOnBorrow) succeeds;
    // the second (the borrow after it's returned) fails, forcing a
    // destroy-and-replace.
    let config = PoolConfig::builder()
        .min_size(0)
        .max_size(2)
        .initial_size(0)
        .test_on_borrow(true)
        .max_wait(Duration::from_secs(1))
        .build()
        .unwrap();
    let pool = Pool::new(config, FakeFactory::default(), FailOnceValidator::new(1))
        .await
        .unwrap();

    let h1 = pool.acquire().await.unwrap();
    h1.close().await;
    assert_eq!(pool.stats().total, 1);

    let h2 = pool.acquire().await.unwrap();
    assert_eq!(
        pool.stats().total,
        1,
        "destroying the stale session and minting a fresh one keeps total at 1"
    );
    assert!(pool.stats().total <= 2, "total must never exceed maxSize");
    h2.close().await;
}

#[tokio::test]
async fn s4_lifetime_eviction_replaces_session() {
    let config = PoolConfig::builder()
        .min_size(0)
        .max_size(2)
        .initial_size(0)
        .max_lifetime(Duration::from_millis(500))
        .eviction_interval(Duration::from_millis(100))
        .build()
        .unwrap();
    let pool = Pool::new(config, FakeFactory::default(), FakeValidator)
        .await
        .unwrap();

    let h1 = pool.acquire().await.unwrap();
    h1.close().await;
    assert_eq!(pool.stats().total, 1);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(
        pool.stats().total,
        0,
        "session past maxLifetime must be destroyed"
    );
}

#[tokio::test]
async fn close_prevents_new_handles_and_drains_idle() {
    let pool = small_pool(2, true).await;
    let h1 = pool.acquire().await.unwrap();
    h1.close().await;
    assert_eq!(pool.stats().idle, 1);

    pool.close().await;
    assert_eq!(pool.stats().idle, 0);

    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, PoolError::PoolClosed));
}

#[tokio::test]
async fn unwrap_transparency() {
    let pool = small_pool(2, true).await;
    let handle = pool.acquire().await.unwrap();

    let session = handle.unwrap_session().unwrap();
    assert_eq!(session.id(), handle.unwrap_session().unwrap().id());
    assert!(std::ptr::eq(handle.unwrap_handle(), &handle));

    handle.close().await;
    assert!(matches!(
        handle.unwrap_session().unwrap_err(),
        PoolError::SessionClosed
    ));
}

#[tokio::test]
async fn explicit_validate_surfaces_validation_failed_without_destroying() {
    let pool = small_pool(2, true).await;
    let handle = pool.acquire().await.unwrap();

    let session = handle.unwrap_session().unwrap();
    session.unhealthy.store(true, std::sync::atomic::Ordering::Release);

    let err = handle
        .validate(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::ValidationFailed));

    // The failed probe didn't destroy or discard anything — the handle is
    // still live and the session still counts toward `total`.
    assert_eq!(pool.stats().total, 1);
    assert!(!handle.is_closed());

    session.unhealthy.store(false, std::sync::atomic::Ordering::Release);
    handle.validate(Duration::from_millis(50)).await.unwrap();
    handle.close().await;
}

#[tokio::test]
async fn cancelled_waiter_does_not_leak_its_slot() {
    let pool = small_pool(1, true).await;
    let h1 = pool.acquire().await.unwrap();

    let pool2 = pool.clone();
    let waiter = tokio::spawn(async move { pool2.acquire().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.stats().waiters, 1, "second borrow should be queued");

    // Abort the waiting task outright — not its own timeout arm, not a
    // release, not a discard. Nothing else touches the waiter queue next.
    waiter.abort();
    let _ = waiter.await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        pool.stats().waiters,
        0,
        "the cancelled waiter's slot must be scrubbed without any other pool activity"
    );

    h1.close().await;
}

#[tokio::test]
async fn total_never_exceeds_max_size_under_contention() {
    let pool = small_pool(3, true).await;
    let mut tasks = Vec::new();
    for _ in 0..12 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let handle = pool.acquire().await.unwrap();
                tokio::task::yield_now().await;
                handle.close().await;
                let stats = pool.stats();
                assert!(stats.total <= 3);
                assert!(stats.idle + stats.in_use <= 3);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert!(pool.stats().total <= 3);
}
