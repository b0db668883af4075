//! 远端访问层
//!
//! 所有 L2 调用的唯一入口：先向故障探测器申请放行，
//! 被拒直接返回 fallback；放行则在超时约束下执行并回报结果。
//! 传输层错误在这里就地消化，永不向缓存调用方传播

use crate::failure::{DetectorConfig, FailureDetector, Mode, Permit};
use metrics::counter;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tandem_errors::AppResult;
use tandem_ports::RemoteStore;
use tokio::time::timeout;
use tracing::{debug, warn};

/// 带故障探测的远端存储访问器
#[derive(Clone)]
pub struct GuardedRemote {
    store: Arc<dyn RemoteStore>,
    detector: Arc<FailureDetector>,
    op_timeout: Duration,
}

impl GuardedRemote {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        detector: Arc<FailureDetector>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            store,
            detector,
            op_timeout,
        }
    }

    /// 建立访问器并以一次 PING 决定探测器初始状态
    pub async fn connect(
        store: Arc<dyn RemoteStore>,
        config: DetectorConfig,
        op_timeout: Duration,
    ) -> Self {
        let initially_healthy = matches!(timeout(op_timeout, store.ping()).await, Ok(Ok(())));
        if !initially_healthy {
            warn!("Initial remote probe failed, starting in degraded mode");
        }
        let detector = Arc::new(FailureDetector::new(config, initially_healthy));
        Self::new(store, detector, op_timeout)
    }

    /// 当前运行模式（只读）
    pub fn mode(&self) -> Mode {
        self.detector.mode()
    }

    pub fn detector(&self) -> &Arc<FailureDetector> {
        &self.detector
    }

    /// 执行一次远端操作，失败或被拒时返回 fallback
    ///
    /// 结果计入探测器采样窗口；探测许可下的结果直接驱动
    /// 恢复/继续降级的转换
    pub async fn execute<T, F, Fut>(&self, op_name: &'static str, fallback: T, op: F) -> T
    where
        F: FnOnce(Arc<dyn RemoteStore>) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let permit = self.detector.acquire_permit();
        if matches!(permit, Permit::Refuse) {
            debug!(op = op_name, "Remote tier bypassed");
            counter!("cache_remote_skipped_total", "op" => op_name).increment(1);
            return fallback;
        }

        match timeout(self.op_timeout, op(Arc::clone(&self.store))).await {
            Ok(Ok(value)) => {
                match permit {
                    Permit::Probe => self.detector.probe_succeeded(),
                    _ => self.detector.record_success(),
                }
                value
            }
            Ok(Err(e)) => {
                warn!(op = op_name, error = %e, "Remote operation failed, using fallback");
                self.report_failure(op_name, permit);
                fallback
            }
            Err(_) => {
                warn!(
                    op = op_name,
                    timeout_ms = self.op_timeout.as_millis() as u64,
                    "Remote operation timed out, using fallback"
                );
                self.report_failure(op_name, permit);
                fallback
            }
        }
    }

    fn report_failure(&self, op_name: &'static str, permit: Permit) {
        counter!("cache_remote_failures_total", "op" => op_name).increment(1);
        match permit {
            Permit::Probe => self.detector.probe_failed(),
            _ => self.detector.record_failure(),
        }
    }
}
