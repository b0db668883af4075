//! tandem-core - 两层缓存协调核心
//!
//! 核心组件（依赖自叶向根）：
//! - FailureDetector：远端健康的三态状态机（Normal/Degraded/Probing）
//! - GuardedRemote：所有 L2 调用的降级式入口
//! - TagIndex：进程内标签双向索引
//! - TieredCache：get-or-set / 删除 / 标签失效 / 刷新的编排层
//! - LockCoordinator：独立的多数派分布式锁

mod cache;
mod config;
mod failure;
mod lock;
mod remote;
mod single_flight;
mod tag_index;

pub use cache::{CacheStats, TieredCache};
pub use config::{CacheConfig, EntryTtl};
pub use failure::{DetectorConfig, FailureDetector, Mode};
pub use lock::{LockCoordinator, LockOptions, LockOutcome};
pub use remote::GuardedRemote;
pub use tag_index::TagIndex;
