//! 缓存协调核心配置

use std::time::Duration;

/// 一次填充的本地/远端 TTL
///
/// 两层 TTL 独立：本地较短（约束进程内存），远端较长（约束分布式存储）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTtl {
    pub local: Duration,
    pub remote: Duration,
}

impl EntryTtl {
    pub fn new(local: Duration, remote: Duration) -> Self {
        Self { local, remote }
    }
}

/// 缓存协调核心配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 默认本地 TTL
    pub local_ttl: Duration,
    /// 默认远端 TTL
    pub remote_ttl: Duration,
    /// 远端 TTL 抖动范围，0 表示关闭
    pub remote_ttl_jitter: Duration,
    /// 单次远端操作超时
    pub remote_op_timeout: Duration,
    /// 键长上限（字节）
    pub max_key_bytes: usize,
    /// 序列化后值大小上限（字节）
    pub max_value_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl: Duration::from_secs(60),
            remote_ttl: Duration::from_secs(600),
            remote_ttl_jitter: Duration::ZERO,
            remote_op_timeout: Duration::from_secs(2),
            max_key_bytes: 512,
            max_value_bytes: 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn with_local_ttl(mut self, ttl: Duration) -> Self {
        self.local_ttl = ttl;
        self
    }

    pub fn with_remote_ttl(mut self, ttl: Duration) -> Self {
        self.remote_ttl = ttl;
        self
    }

    pub fn with_remote_ttl_jitter(mut self, jitter: Duration) -> Self {
        self.remote_ttl_jitter = jitter;
        self
    }

    pub fn with_remote_op_timeout(mut self, timeout: Duration) -> Self {
        self.remote_op_timeout = timeout;
        self
    }

    /// 从应用配置装配
    pub fn from_app_config(config: &tandem_config::AppConfig) -> Self {
        Self {
            local_ttl: Duration::from_secs(config.local.default_ttl_secs),
            remote_ttl: Duration::from_secs(config.remote.default_ttl_secs),
            remote_ttl_jitter: Duration::from_secs(config.remote.ttl_jitter_secs),
            remote_op_timeout: Duration::from_millis(config.remote.op_timeout_ms),
            ..Default::default()
        }
    }

    pub(crate) fn default_ttl(&self) -> EntryTtl {
        EntryTtl {
            local: self.local_ttl,
            remote: self.remote_ttl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = CacheConfig::default()
            .with_local_ttl(Duration::from_secs(5))
            .with_remote_ttl(Duration::from_secs(300))
            .with_remote_ttl_jitter(Duration::from_secs(30));

        assert_eq!(config.local_ttl, Duration::from_secs(5));
        assert_eq!(config.remote_ttl, Duration::from_secs(300));
        assert_eq!(config.remote_ttl_jitter, Duration::from_secs(30));
        assert_eq!(config.max_key_bytes, 512);
        assert_eq!(config.max_value_bytes, 1024 * 1024);
    }
}
