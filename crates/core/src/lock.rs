//! 多数派分布式锁协调
//!
//! 跨进程临界区的互斥原语，与缓存自身的进程内并发控制相互独立。
//! 一轮获取向全部节点并发放置带 TTL 的锁记录，拿到多数派授权
//! 且本轮耗时未逼近租期才算持有，避免网络分区期间双持有

use futures::future::join_all;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tandem_errors::{AppError, AppResult};
use tandem_ports::LockNode;
use tracing::{debug, warn};
use uuid::Uuid;

/// 锁获取参数，由调用方逐次提供
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// 租期，也是每个节点上锁记录的 TTL
    pub lease: Duration,
    /// 获取等待上限，超过即放弃
    pub wait_timeout: Duration,
    /// 竞争失败后的重试间隔
    pub retry_interval: Duration,
}

/// 一次带锁执行的结果
///
/// 等待超时是正常出口而非错误，与 body 执行失败（Err 传播）区分开
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome<T> {
    /// 在租期内独占执行完 body
    Acquired(T),
    /// wait_timeout 内未获得多数派授权，body 未执行
    TimedOut,
}

impl<T> LockOutcome<T> {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }
}

/// 多数派锁协调器
pub struct LockCoordinator {
    nodes: Vec<Arc<dyn LockNode>>,
}

impl LockCoordinator {
    pub fn new(nodes: Vec<Arc<dyn LockNode>>) -> Self {
        Self { nodes }
    }

    /// 多数派门槛
    pub fn quorum(&self) -> usize {
        self.nodes.len() / 2 + 1
    }

    /// 获取 resource 上的租约并执行 body
    ///
    /// 获得授权则 body 恰好执行一次，无论成功还是出错，
    /// 返回前都会释放全部节点上的锁记录；等待超时返回
    /// TimedOut，body 不执行
    pub async fn acquire_and_run<T, F, Fut>(
        &self,
        resource: &str,
        opts: LockOptions,
        body: F,
    ) -> AppResult<LockOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = AppResult<T>>,
    {
        if resource.is_empty() {
            return Err(AppError::validation("lock resource must not be empty"));
        }
        if self.nodes.is_empty() {
            return Err(AppError::validation("lock coordinator has no nodes"));
        }

        let Some(token) = self.acquire(resource, &opts).await else {
            counter!("lock_acquisitions_total", "outcome" => "timeout").increment(1);
            return Ok(LockOutcome::TimedOut);
        };
        counter!("lock_acquisitions_total", "outcome" => "acquired").increment(1);

        let result = body().await;
        self.release_all(resource, &token).await;
        result.map(LockOutcome::Acquired)
    }

    /// 重试获取直到拿到多数派授权或等待超时，返回持有 token
    async fn acquire(&self, resource: &str, opts: &LockOptions) -> Option<String> {
        let deadline = Instant::now() + opts.wait_timeout;
        loop {
            let token = Uuid::new_v4().to_string();
            let started = Instant::now();

            let grants = join_all(
                self.nodes
                    .iter()
                    .map(|node| node.try_acquire(resource, &token, opts.lease)),
            )
            .await;
            let granted = grants
                .iter()
                .filter(|grant| matches!(grant, Ok(true)))
                .count();

            // 本轮耗时达到租期时最早授权的节点可能已在过期边缘，
            // 即使拿到多数派也视为失败
            if granted >= self.quorum() && started.elapsed() < opts.lease {
                debug!(resource, granted, "Lock acquired with quorum");
                return Some(token);
            }

            // 失败的一轮也要撤回已授权节点，不留到租期自然过期
            self.release_all(resource, &token).await;

            if Instant::now() + opts.retry_interval >= deadline {
                debug!(resource, "Lock wait timeout exhausted");
                return None;
            }
            tokio::time::sleep(opts.retry_interval).await;
        }
    }

    async fn release_all(&self, resource: &str, token: &str) {
        let results = join_all(
            self.nodes
                .iter()
                .map(|node| node.release(resource, token)),
        )
        .await;
        for result in results {
            if let Err(e) = result {
                // 释放失败的记录由 TTL 兜底过期
                warn!(resource, error = %e, "Lock release failed on a node");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct GrantAll;

    #[async_trait]
    impl LockNode for GrantAll {
        async fn try_acquire(
            &self,
            _resource: &str,
            _token: &str,
            _lease: Duration,
        ) -> AppResult<bool> {
            Ok(true)
        }

        async fn release(&self, _resource: &str, _token: &str) -> AppResult<bool> {
            Ok(true)
        }
    }

    fn coordinator_of(n: usize) -> LockCoordinator {
        let nodes = (0..n)
            .map(|_| Arc::new(GrantAll) as Arc<dyn LockNode>)
            .collect();
        LockCoordinator::new(nodes)
    }

    #[test]
    fn test_quorum_thresholds() {
        assert_eq!(coordinator_of(1).quorum(), 1);
        assert_eq!(coordinator_of(3).quorum(), 2);
        assert_eq!(coordinator_of(4).quorum(), 3);
        assert_eq!(coordinator_of(5).quorum(), 3);
    }

    #[tokio::test]
    async fn test_empty_resource_rejected() {
        let coordinator = coordinator_of(3);
        let opts = LockOptions {
            lease: Duration::from_secs(5),
            wait_timeout: Duration::from_millis(100),
            retry_interval: Duration::from_millis(10),
        };
        let result = coordinator
            .acquire_and_run("", opts, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_no_nodes_rejected() {
        let coordinator = LockCoordinator::new(Vec::new());
        let opts = LockOptions {
            lease: Duration::from_secs(5),
            wait_timeout: Duration::from_millis(100),
            retry_interval: Duration::from_millis(10),
        };
        let result = coordinator
            .acquire_and_run("jobs", opts, || async { Ok(()) })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
