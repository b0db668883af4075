//! 缓存存储 trait 定义

use async_trait::async_trait;
use std::time::Duration;
use tandem_errors::AppResult;

/// 本地缓存 trait（L1）
///
/// 进程内存储，容量上限和逐出策略由实现负责，
/// 协调核心只依赖 get/set/remove 和按条目 TTL 语义
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// 读取缓存值，已过期的条目视为不存在
    async fn get(&self, key: &str) -> Option<String>;

    /// 写入缓存值并设置该条目的 TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration);

    /// 删除缓存值，键不存在时为 no-op
    async fn remove(&self, key: &str);

    /// 检查键是否存在（不更新访问统计）
    async fn contains_key(&self, key: &str) -> bool;
}

/// 远端缓存 trait（L2）
///
/// 网络键值服务，连接可能暂时不可用；
/// 所有操作都可能因传输故障失败
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 读取缓存值
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 写入缓存值并设置 TTL
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// 删除缓存值
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 连通性检查
    async fn ping(&self) -> AppResult<()>;
}
