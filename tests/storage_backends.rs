//! Behavioural checks every storage backend must pass.
//!
//! Run with: cargo test --test storage_backends --all-features
//!
//! Redis checks need a server on localhost:6379 and are skipped without one.

use otp_gateway::storage::OtpStorage;
use otp_gateway::{NewOtp, OtpError};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

fn new_otp(passcode: &str, max_attempts: u32) -> NewOtp {
    NewOtp {
        passcode: passcode.to_string(),
        recipient: "dummy@to.com".to_string(),
        description: "backend check".to_string(),
        channel: "dummyprovider".to_string(),
        max_attempts,
    }
}

async fn check_create_read_close<S: OtpStorage>(storage: &S, ns: &str) -> Result<(), OtpError> {
    let created = storage
        .create(ns, "record-1", &new_otp("123456", 3), Duration::from_secs(60))
        .await?;
    assert_eq!(created.attempts, 1);
    assert!(!created.closed);

    let read = storage.read(ns, "record-1", false).await?;
    assert_eq!(read.passcode, "123456");
    assert_eq!(read.recipient, "dummy@to.com");
    assert_eq!(read.description, "backend check");
    assert_eq!(read.channel, "dummyprovider");
    assert_eq!(read.max_attempts, 3);
    assert_eq!(read.attempts, 1);
    assert!(read.ttl > Duration::from_secs(50) && read.ttl <= Duration::from_secs(60));

    assert_eq!(storage.read(ns, "record-1", true).await?.attempts, 2);

    let closed = storage.close(ns, "record-1").await?;
    assert!(closed.closed);
    assert_eq!(closed.attempts, 2);
    assert!(storage.read(ns, "record-1", true).await?.closed);

    assert!(matches!(
        storage.read(ns, "missing", true).await,
        Err(OtpError::NotFound)
    ));
    assert!(matches!(
        storage.close(ns, "missing").await,
        Err(OtpError::NotFound)
    ));
    Ok(())
}

async fn check_locked_record_survives_create<S: OtpStorage>(
    storage: &S,
    ns: &str,
) -> Result<(), OtpError> {
    storage
        .create(ns, "record-2", &new_otp("111111", 1), Duration::from_secs(60))
        .await?;
    assert!(storage.read(ns, "record-2", true).await?.is_locked());

    match storage
        .create(ns, "record-2", &new_otp("222222", 5), Duration::from_secs(60))
        .await
    {
        Err(OtpError::Locked(existing)) => assert_eq!(existing.passcode, "111111"),
        other => panic!("expected lock, got {other:?}"),
    }

    // An unlocked record is replaced and its counter reset.
    storage
        .create(ns, "record-3", &new_otp("111111", 5), Duration::from_secs(60))
        .await?;
    storage.read(ns, "record-3", true).await?;
    let replaced = storage
        .create(ns, "record-3", &new_otp("333333", 5), Duration::from_secs(60))
        .await?;
    assert_eq!(replaced.attempts, 1);
    assert_eq!(storage.read(ns, "record-3", false).await?.passcode, "333333");
    Ok(())
}

async fn check_expiry<S: OtpStorage>(storage: &S, ns: &str) -> Result<(), OtpError> {
    storage
        .create(ns, "record-4", &new_otp("123456", 3), Duration::from_millis(150))
        .await?;
    // Incrementing and closing must not extend the deadline.
    storage.read(ns, "record-4", true).await?;
    storage.close(ns, "record-4").await?;

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(matches!(
        storage.read(ns, "record-4", false).await,
        Err(OtpError::NotFound)
    ));
    assert!(matches!(
        storage.close(ns, "record-4").await,
        Err(OtpError::NotFound)
    ));

    let fresh = storage
        .create(ns, "record-4", &new_otp("654321", 3), Duration::from_secs(60))
        .await?;
    assert_eq!(fresh.attempts, 1);
    assert!(!fresh.closed);
    Ok(())
}

async fn check_concurrent_increments<S: OtpStorage + 'static>(
    storage: Arc<S>,
    ns: &'static str,
) -> Result<(), OtpError> {
    storage
        .create(ns, "record-5", &new_otp("123456", 1000), Duration::from_secs(60))
        .await?;

    let mut tasks = JoinSet::new();
    for _ in 0..25 {
        let storage = Arc::clone(&storage);
        tasks.spawn(async move { storage.read(ns, "record-5", true).await });
    }

    let mut seen = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        seen.push(joined.expect("task panicked")?.attempts);
    }
    seen.sort_unstable();
    assert_eq!(seen, (2..=26).collect::<Vec<u32>>());
    Ok(())
}

async fn run_all<S: OtpStorage + 'static>(storage: Arc<S>, ns: &'static str) -> Result<(), OtpError> {
    storage.init().await?;
    check_create_read_close(storage.as_ref(), ns).await?;
    check_locked_record_survives_create(storage.as_ref(), ns).await?;
    check_expiry(storage.as_ref(), ns).await?;
    check_concurrent_increments(Arc::clone(&storage), ns).await?;

    let stats = storage.get_stats().await?;
    assert!(stats.total_records >= 4);
    Ok(())
}

#[cfg(feature = "memory-storage")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_memory_backend() -> Result<(), OtpError> {
    use otp_gateway::storage::MemoryStorage;
    run_all(Arc::new(MemoryStorage::new()), "memory").await
}

#[cfg(feature = "sqlite-storage")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_backend() -> Result<(), OtpError> {
    use otp_gateway::storage::SqliteStorage;
    run_all(Arc::new(SqliteStorage::new(":memory:")?), "sqlite").await
}

#[cfg(feature = "redis-storage")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_backend() -> Result<(), OtpError> {
    use otp_gateway::storage::RedisStorage;

    let storage = Arc::new(RedisStorage::new(
        "redis://localhost:6379",
        "otp_gateway_conformance",
    )?);
    if storage.init().await.is_err() {
        println!("Skipping Redis conformance tests - no Redis server available");
        return Ok(());
    }
    // Run under a namespace unique to this run so stale keys cannot interfere.
    let ns: &'static str = Box::leak(
        format!("run-{}", otp_gateway::generator::generate_id()?).into_boxed_str(),
    );
    run_all(storage, ns).await
}
