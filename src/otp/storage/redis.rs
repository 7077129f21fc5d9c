//! Redis storage backend implementation.
//!
//! Each record is a hash at `{prefix}:{namespace}:{id}` with the fields
//! `otp`, `to`, `description`, `provider`, `attempts`, `max_attempts` and
//! `closed`; the key's own TTL is the record's expiry. Every operation is a
//! Lua script, which Redis runs atomically, so concurrent gateways sharing
//! one Redis never lose an increment.

use super::{OtpStorage, StorageStats};
use crate::otp::{NewOtp, OtpError, OtpRecord};
use async_trait::async_trait;
use redis::{Client, Script, aio::MultiplexedConnection};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Replaces the record unless the live one is locked.
const CREATE_SCRIPT: &str = r#"
local key = KEYS[1]
if redis.call('EXISTS', key) == 1 then
    local attempts = tonumber(redis.call('HGET', key, 'attempts') or '0')
    local max_attempts = tonumber(redis.call('HGET', key, 'max_attempts') or '0')
    if attempts > max_attempts then
        return {0, redis.call('PTTL', key), redis.call('HGETALL', key)}
    end
    redis.call('DEL', key)
end
redis.call('HSET', key,
    'otp', ARGV[1], 'to', ARGV[2], 'description', ARGV[3], 'provider', ARGV[4],
    'max_attempts', ARGV[5], 'attempts', 1, 'closed', 0)
redis.call('PEXPIRE', key, ARGV[6])
return {1, tonumber(ARGV[6]), {}}
"#;

/// HINCRBY leaves the key TTL untouched.
const READ_SCRIPT: &str = r#"
local key = KEYS[1]
if redis.call('EXISTS', key) == 0 then
    return {0, 0, {}}
end
if ARGV[1] == '1' then
    redis.call('HINCRBY', key, 'attempts', 1)
end
return {1, redis.call('PTTL', key), redis.call('HGETALL', key)}
"#;

const CLOSE_SCRIPT: &str = r#"
local key = KEYS[1]
if redis.call('EXISTS', key) == 0 then
    return {0, 0, {}}
end
redis.call('HSET', key, 'closed', 1)
return {1, redis.call('PTTL', key), redis.call('HGETALL', key)}
"#;

/// Reply shape shared by all scripts: status, remaining TTL in ms, flat hash.
type ScriptReply = (i64, i64, Vec<String>);

/// Redis-based storage backend for OTP records.
///
/// Suitable for multi-instance deployments: any number of gateways can
/// share one Redis and the attempt budget stays exact.
///
/// # Example
///
/// ```rust
/// use otp_gateway::storage::RedisStorage;
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), otp_gateway::OtpError> {
/// let storage = Arc::new(RedisStorage::new("redis://localhost:6379", "otp")?);
/// # Ok(())
/// # }
/// ```
pub struct RedisStorage {
    client: Client,
    key_prefix: String,
    /// Shared persistent connection
    conn: Arc<Mutex<Option<MultiplexedConnection>>>,
    create_script: Script,
    read_script: Script,
    close_script: Script,
}

impl RedisStorage {
    /// Create a new Redis storage backend.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `key_prefix` - Prefix for all record keys to avoid collisions
    pub fn new(redis_url: &str, key_prefix: &str) -> Result<Self, OtpError> {
        let client = Client::open(redis_url)
            .map_err(|e| OtpError::from_storage_message(format!("Redis client error: {}", e)))?;

        Ok(Self {
            client,
            key_prefix: key_prefix.to_string(),
            conn: Arc::new(Mutex::new(None)),
            create_script: Script::new(CREATE_SCRIPT),
            read_script: Script::new(READ_SCRIPT),
            close_script: Script::new(CLOSE_SCRIPT),
        })
    }

    /// Get or create a persistent connection
    async fn get_connection(&self) -> Result<MultiplexedConnection, OtpError> {
        let mut conn_guard = self.conn.lock().await;

        if let Some(conn) = conn_guard.as_ref() {
            let mut test_conn = conn.clone();
            match redis::cmd("PING")
                .query_async::<_, String>(&mut test_conn)
                .await
            {
                Ok(_) => return Ok(conn.clone()),
                Err(_) => {
                    // Connection is dead, remove it
                    *conn_guard = None;
                }
            }
        }

        let new_conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(|e| OtpError::from_storage_message(format!("Redis connection failed: {}", e)))?;

        *conn_guard = Some(new_conn.clone());
        Ok(new_conn)
    }

    fn make_key(&self, namespace: &str, id: &str) -> String {
        let mut key =
            String::with_capacity(self.key_prefix.len() + namespace.len() + id.len() + 2);
        key.push_str(&self.key_prefix);
        key.push(':');
        key.push_str(namespace);
        key.push(':');
        key.push_str(id);
        key
    }

    /// Builds a record from a flat `HGETALL` reply.
    fn parse_record(
        namespace: &str,
        id: &str,
        pttl: i64,
        fields: Vec<String>,
    ) -> Result<OtpRecord, OtpError> {
        let mut map: HashMap<String, String> = HashMap::with_capacity(fields.len() / 2);
        let mut iter = fields.into_iter();
        while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
            map.insert(k, v);
        }

        let mut take = |field: &str| {
            map.remove(field).ok_or_else(|| {
                OtpError::from_storage_message(format!("Redis record is missing `{field}`"))
            })
        };
        let parse_u32 = |field: &str, value: String| {
            value.parse::<u32>().map_err(|_| {
                OtpError::from_storage_message(format!("Invalid `{field}` in Redis record"))
            })
        };

        let passcode = take("otp")?;
        let recipient = take("to")?;
        let description = take("description").unwrap_or_default();
        let channel = take("provider")?;
        let attempts = parse_u32("attempts", take("attempts")?)?;
        let max_attempts = parse_u32("max_attempts", take("max_attempts")?)?;
        let closed = take("closed").map(|v| v == "1").unwrap_or(false);

        Ok(OtpRecord {
            namespace: namespace.to_string(),
            id: id.to_string(),
            passcode,
            recipient,
            description,
            channel,
            attempts,
            max_attempts,
            // PTTL is -1 for keys without expiry, -2 for missing keys.
            ttl: Duration::from_millis(pttl.max(0) as u64),
            closed,
        })
    }

    async fn run_lookup(
        &self,
        script: &Script,
        namespace: &str,
        id: &str,
        arg: &str,
    ) -> Result<OtpRecord, OtpError> {
        let mut conn = self.get_connection().await?;
        let key = self.make_key(namespace, id);

        let (status, pttl, fields): ScriptReply = script
            .key(&key)
            .arg(arg)
            .invoke_async(&mut conn)
            .await
            .map_err(OtpError::from_storage_error)?;

        if status == 0 {
            return Err(OtpError::NotFound);
        }
        Self::parse_record(namespace, id, pttl, fields)
    }

    /// Scan keys with pattern using SCAN instead of KEYS for production safety
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, OtpError> {
        let mut conn = self.get_connection().await?;
        let mut keys = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (new_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(OtpError::from_storage_error)?;

            keys.extend(batch);
            cursor = new_cursor;

            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}

#[async_trait]
impl OtpStorage for RedisStorage {
    async fn init(&self) -> Result<(), OtpError> {
        let mut conn = self.get_connection().await?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| OtpError::from_storage_message(format!("Redis ping failed: {}", e)))?;

        Ok(())
    }

    async fn create(
        &self,
        namespace: &str,
        id: &str,
        otp: &NewOtp,
        ttl: Duration,
    ) -> Result<OtpRecord, OtpError> {
        let mut conn = self.get_connection().await?;
        let key = self.make_key(namespace, id);
        // Redis rejects a zero PEXPIRE as "expire now"; keep at least 1ms.
        let ttl_ms = ttl.as_millis().clamp(1, i64::MAX as u128) as i64;

        let (status, pttl, fields): ScriptReply = self
            .create_script
            .key(&key)
            .arg(&otp.passcode)
            .arg(&otp.recipient)
            .arg(&otp.description)
            .arg(&otp.channel)
            .arg(otp.max_attempts)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(OtpError::from_storage_error)?;

        if status == 0 {
            let existing = Self::parse_record(namespace, id, pttl, fields)?;
            return Err(OtpError::Locked(Box::new(existing)));
        }

        Ok(otp.clone().into_record(namespace, id, ttl))
    }

    async fn read(
        &self,
        namespace: &str,
        id: &str,
        increment: bool,
    ) -> Result<OtpRecord, OtpError> {
        let flag = if increment { "1" } else { "0" };
        self.run_lookup(&self.read_script, namespace, id, flag).await
    }

    async fn close(&self, namespace: &str, id: &str) -> Result<OtpRecord, OtpError> {
        self.run_lookup(&self.close_script, namespace, id, "").await
    }

    async fn get_stats(&self) -> Result<StorageStats, OtpError> {
        let mut conn = self.get_connection().await?;

        let pattern = format!("{}:*", self.key_prefix);
        let keys = self.scan_keys(&pattern).await?;
        let total_records = keys.len();

        let info: String = redis::cmd("INFO")
            .arg("memory")
            .query_async(&mut conn)
            .await
            .map_err(OtpError::from_storage_error)?;

        let memory_usage = info
            .lines()
            .find(|line| line.starts_with("used_memory_human:"))
            .and_then(|line| line.split(':').nth(1))
            .map(str::trim)
            .unwrap_or("unknown");

        Ok(StorageStats {
            total_records,
            backend_info: format!(
                "Redis storage (memory: {}, prefix: {}, persistent conn)",
                memory_usage, self.key_prefix
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otp::generator::generate_id;

    // These tests require a running Redis instance and return early without one.
    async fn get_test_storage(prefix: &str) -> Option<RedisStorage> {
        let storage = RedisStorage::new("redis://localhost:6379", prefix).ok()?;
        match storage.init().await {
            Ok(()) => Some(storage),
            Err(_) => {
                println!("Skipping Redis tests - no Redis server available");
                None
            }
        }
    }

    fn new_otp(passcode: &str, max_attempts: u32) -> NewOtp {
        NewOtp {
            passcode: passcode.to_string(),
            recipient: "dummy@to.com".to_string(),
            description: "redis test".to_string(),
            channel: "dummyprovider".to_string(),
            max_attempts,
        }
    }

    #[test]
    fn test_parse_record() {
        let fields = vec![
            "otp", "123456", "to", "dummy@to.com", "description", "", "provider", "email",
            "attempts", "2", "max_attempts", "3", "closed", "1",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let record = RedisStorage::parse_record("ns", "myotp123", 1500, fields).unwrap();
        assert_eq!(record.passcode, "123456");
        assert_eq!(record.attempts, 2);
        assert_eq!(record.max_attempts, 3);
        assert!(record.closed);
        assert_eq!(record.ttl, Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_record_rejects_garbage() {
        let fields = vec!["otp", "1", "to", "x", "provider", "p", "attempts", "many"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(matches!(
            RedisStorage::parse_record("ns", "id", 0, fields),
            Err(OtpError::StorageError(_))
        ));
    }

    #[tokio::test]
    async fn test_redis_lifecycle() {
        let Some(storage) = get_test_storage("test_otp_lifecycle").await else {
            return;
        };
        let id = generate_id().unwrap();

        let created = storage
            .create("ns", &id, &new_otp("1234", 2), Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(created.attempts, 1);

        let read = storage.read("ns", &id, true).await.unwrap();
        assert_eq!(read.attempts, 2);
        assert!(read.ttl <= Duration::from_secs(30));

        let closed = storage.close("ns", &id).await.unwrap();
        assert!(closed.closed);

        // Third attempt locks it; re-issuing must now fail.
        assert!(storage.read("ns", &id, true).await.unwrap().is_locked());
        assert!(matches!(
            storage
                .create("ns", &id, &new_otp("9999", 2), Duration::from_secs(30))
                .await,
            Err(OtpError::Locked(_))
        ));
    }

    #[tokio::test]
    async fn test_redis_ttl() {
        let Some(storage) = get_test_storage("test_otp_ttl").await else {
            return;
        };
        let id = generate_id().unwrap();

        storage
            .create("ns", &id, &new_otp("1234", 3), Duration::from_millis(100))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(matches!(
            storage.read("ns", &id, true).await,
            Err(OtpError::NotFound)
        ));
    }
}
