//! Redis read/write locks.
//!
//! Each lock key is a hash. A grant is the field `<r|w>:<owner>` holding a
//! reentrancy count, paired with `e:<r|w>:<owner>` holding its lease expiry
//! in server milliseconds. Lapsed grants are purged on every acquire, and
//! the key itself carries a TTL no shorter than its longest lease.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use tracing::debug;

use drivetree_core::error::{AppError, ErrorKind};
use drivetree_core::result::AppResult;
use drivetree_core::traits::lock::{LockMode, LockProvider};

use super::client::RedisClient;

const ACQUIRE_SCRIPT: &str = r#"
local key = KEYS[1]
local mode = ARGV[1]
local owner = ARGV[2]
local lease = tonumber(ARGV[3])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)

local fields = redis.call('HGETALL', key)
for i = 1, #fields, 2 do
  local f = fields[i]
  if string.sub(f, 1, 2) == 'e:' and tonumber(fields[i + 1]) <= now then
    redis.call('HDEL', key, f, string.sub(f, 3))
  end
end

local other_writer, other_reader, own_read, own_write = false, false, false, false
fields = redis.call('HGETALL', key)
for i = 1, #fields, 2 do
  local f = fields[i]
  local side = string.sub(f, 1, 2)
  local holder = string.sub(f, 3)
  if side == 'w:' then
    if holder == owner then own_write = true else other_writer = true end
  elseif side == 'r:' then
    if holder == owner then own_read = true else other_reader = true end
  end
end

if mode == 'r' then
  if other_writer then return 0 end
else
  if other_writer or other_reader or (own_read and not own_write) then return 0 end
end

local field = mode .. ':' .. owner
redis.call('HINCRBY', key, field, 1)
redis.call('HSET', key, 'e:' .. field, now + lease)
if redis.call('PTTL', key) < lease then
  redis.call('PEXPIRE', key, lease)
end
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
local key = KEYS[1]
local field = ARGV[1] .. ':' .. ARGV[2]
local count = tonumber(redis.call('HGET', key, field))
if not count then return 0 end
if count > 1 then
  redis.call('HINCRBY', key, field, -1)
else
  redis.call('HDEL', key, field, 'e:' .. field)
end
if redis.call('HLEN', key) == 0 then
  redis.call('DEL', key)
end
return 1
"#;

const RENEW_SCRIPT: &str = r#"
local key = KEYS[1]
local field = ARGV[1] .. ':' .. ARGV[2]
local lease = tonumber(ARGV[3])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
local expiry = tonumber(redis.call('HGET', key, 'e:' .. field))
if not expiry or expiry <= now then return 0 end
redis.call('HSET', key, 'e:' .. field, now + lease)
if redis.call('PTTL', key) < lease then
  redis.call('PEXPIRE', key, lease)
end
return 1
"#;

/// Redis-backed lock provider shared by every process using the same server.
#[derive(Debug, Clone)]
pub struct RedisLockProvider {
    client: RedisClient,
    poll_interval: Duration,
    acquire: Script,
    release: Script,
    renew: Script,
}

impl RedisLockProvider {
    /// Create a provider that polls contended keys every `poll_interval`.
    pub fn new(client: RedisClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
            renew: Script::new(RENEW_SCRIPT),
        }
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::Lock, format!("Redis lock error: {e}"), e)
    }
}

fn lease_ms(lease: Duration) -> u64 {
    lease.as_millis().max(1) as u64
}

#[async_trait]
impl LockProvider for RedisLockProvider {
    fn provider_type(&self) -> &str {
        "redis"
    }

    async fn try_acquire(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
    ) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let granted: i64 = self
            .acquire
            .key(self.client.prefixed_key(key))
            .arg(mode.as_str())
            .arg(owner)
            .arg(lease_ms(lease))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(granted == 1)
    }

    async fn release(&self, key: &str, mode: LockMode, owner: &str) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let released: i64 = self
            .release
            .key(self.client.prefixed_key(key))
            .arg(mode.as_str())
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        if released == 0 {
            debug!(key, %mode, owner, "Release of a grant that was not held");
        }
        Ok(released == 1)
    }

    async fn renew(
        &self,
        key: &str,
        mode: LockMode,
        owner: &str,
        lease: Duration,
    ) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let renewed: i64 = self
            .renew
            .key(self.client.prefixed_key(key))
            .arg(mode.as_str())
            .arg(owner)
            .arg(lease_ms(lease))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(renewed == 1)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
