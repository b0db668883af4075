//! Redis RemoteStore 实现

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tandem_errors::{AppError, AppResult};
use tandem_ports::RemoteStore;

/// 拼接键前缀
pub(crate) fn prefixed_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(p) => format!("{}:{}", p, key),
        None => key.to_string(),
    }
}

/// Redis 远端存储（L2）
///
/// 所有传输故障映射为 ExternalService 错误，
/// 由核心的远端访问层吸收并计入故障窗口
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: Option<String>,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: None,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    fn key(&self, key: &str) -> String {
        prefixed_key(self.key_prefix.as_deref(), key)
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key))
            .await
            .map_err(|e| AppError::external_service(format!("Redis get failed: {}", e)))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        // EX 不接受 0，至少 1 秒
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex(self.key(key), value, ttl_secs)
            .await
            .map_err(|e| AppError::external_service(format!("Redis set failed: {}", e)))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del(self.key(key))
            .await
            .map_err(|e| AppError::external_service(format!("Redis delete failed: {}", e)))
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| AppError::external_service(format!("Redis ping failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_key() {
        assert_eq!(prefixed_key(Some("app"), "user:123"), "app:user:123");
        assert_eq!(prefixed_key(None, "user:123"), "user:123");
    }
}
