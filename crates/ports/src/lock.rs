//! 分布式锁节点 trait 定义

use async_trait::async_trait;
use std::time::Duration;
use tandem_errors::AppResult;

/// 分布式锁节点 trait
///
/// 单个锁节点的获取/释放原语，多数派协调由上层完成
#[async_trait]
pub trait LockNode: Send + Sync {
    /// 尝试放置锁记录，返回是否成功
    ///
    /// 同一 resource 已被其他 token 持有时返回 false
    async fn try_acquire(&self, resource: &str, token: &str, lease: Duration) -> AppResult<bool>;

    /// 释放锁记录，只有 token 匹配时才删除
    ///
    /// 返回是否实际删除了记录
    async fn release(&self, resource: &str, token: &str) -> AppResult<bool>;
}
