//! Redis 分布式锁节点实现

use async_trait::async_trait;
use redis::Script;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tandem_errors::{AppError, AppResult};
use tandem_ports::LockNode;

use crate::store::prefixed_key;

/// Redis 锁节点
///
/// 单节点的锁原语：SET NX PX 放置带 TTL 的锁记录，
/// 释放用 Lua 比较 token 后删除，防止误删其他进程的锁。
/// 多数派协调在核心的 LockCoordinator 完成
pub struct RedisLockNode {
    conn: ConnectionManager,
    lock_prefix: String,
}

impl RedisLockNode {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            lock_prefix: "lock".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock_prefix = prefix.into();
        self
    }

    fn lock_key(&self, resource: &str) -> String {
        prefixed_key(Some(&self.lock_prefix), resource)
    }
}

#[async_trait]
impl LockNode for RedisLockNode {
    async fn try_acquire(&self, resource: &str, token: &str, lease: Duration) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let lock_key = self.lock_key(resource);

        let result: Option<String> = redis::cmd("SET")
            .arg(&lock_key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::external_service(format!("Redis lock acquire failed: {}", e)))?;

        Ok(result.is_some())
    }

    async fn release(&self, resource: &str, token: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let lock_key = self.lock_key(resource);

        // 只有 token 匹配时才删除
        let script = Script::new(
            r"
            if redis.call('GET', KEYS[1]) == ARGV[1] then
                return redis.call('DEL', KEYS[1])
            else
                return 0
            end
            ",
        );

        let deleted: i64 = script
            .key(&lock_key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::external_service(format!("Redis lock release failed: {}", e)))?;

        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_prefix() {
        // 构造 lock_key 不需要连接，直接验证拼接逻辑
        assert_eq!(prefixed_key(Some("lock"), "orders"), "lock:orders");
        assert_eq!(prefixed_key(Some("myapp:lock"), "orders"), "myapp:lock:orders");
    }
}
