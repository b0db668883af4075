//! 两层缓存协调核心
//!
//! 编排本地存储、远端访问层、标签索引与 single-flight 填充：
//! - get_or_set：L1 -> 在途回合 -> L2 -> factory，同键并发 miss 只填充一次
//! - remove / remove_by_tag(s)：索引解除先行，随后清理 L1 与 L2
//! - refresh：先删后填，删除完成后新读者不再看到旧值
//!
//! 标签索引是进程内的：多实例部署时标签失效只作用于
//! 本进程填充过的键，跨实例失效需要调用方自行广播

use crate::config::{CacheConfig, EntryTtl};
use crate::failure::Mode;
use crate::remote::GuardedRemote;
use crate::single_flight::{EpisodeOutcome, Flight, FlightGroup};
use crate::tag_index::TagIndex;
use metrics::counter;
use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tandem_errors::{AppError, AppResult};
use tandem_ports::LocalStore;
use tokio::sync::watch;
use tracing::debug;

#[derive(Default)]
struct StatCounters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    populations: AtomicU64,
    coalesced_waiters: AtomicU64,
}

/// 运行统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    /// factory 实际执行次数
    pub populations: u64,
    /// 搭上在途填充回合的等待者数
    pub coalesced_waiters: u64,
}

struct CacheInner {
    local: Arc<dyn LocalStore>,
    remote: GuardedRemote,
    tags: TagIndex,
    flights: FlightGroup,
    config: CacheConfig,
    stats: StatCounters,
}

/// 两层缓存协调器
///
/// 克隆代价低（内部 Arc 共享），可跨任务共享同一实例
#[derive(Clone)]
pub struct TieredCache {
    inner: Arc<CacheInner>,
}

impl TieredCache {
    pub fn new(local: Arc<dyn LocalStore>, remote: GuardedRemote, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                local,
                remote,
                tags: TagIndex::new(),
                flights: FlightGroup::default(),
                config,
                stats: StatCounters::default(),
            }),
        }
    }

    /// 当前远端运行模式（只读）
    pub fn mode(&self) -> Mode {
        self.inner.remote.mode()
    }

    /// 读取缓存值，不触发填充
    ///
    /// L1 miss 时降级式查 L2，命中则按默认本地 TTL 回填 L1
    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.validate_key(key)?;

        if let Some(value) = self.inner.local.get(key).await {
            self.inner.stats.l1_hits.fetch_add(1, Ordering::Relaxed);
            counter!("cache_requests_total", "outcome" => "l1_hit").increment(1);
            return Ok(Some(value));
        }

        let lookup = {
            let key = key.to_string();
            self.inner
                .remote
                .execute("get", None, move |store| async move {
                    store.get(&key).await
                })
                .await
        };

        match lookup {
            Some(value) => {
                self.inner.stats.l2_hits.fetch_add(1, Ordering::Relaxed);
                counter!("cache_requests_total", "outcome" => "l2_hit").increment(1);
                self.inner
                    .local
                    .set(key, &value, self.inner.config.local_ttl)
                    .await;
                Ok(Some(value))
            }
            None => {
                self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
                counter!("cache_requests_total", "outcome" => "miss").increment(1);
                Ok(None)
            }
        }
    }

    /// 读取缓存值，miss 时以 factory 填充
    ///
    /// 同一个键的并发 miss 在进程内合并为一次填充回合：
    /// 第一个调用方发起填充，其余等待同一结果。填充在独立任务中
    /// 执行，等待者取消不影响回合本身。factory 错误广播给该回合的
    /// 全部等待者，不缓存，下次调用重新尝试
    pub async fn get_or_set<F, Fut>(
        &self,
        key: &str,
        tags: &[String],
        ttl: Option<EntryTtl>,
        factory: F,
    ) -> AppResult<String>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<String>> + Send + 'static,
    {
        self.validate_key(key)?;

        if let Some(value) = self.inner.local.get(key).await {
            self.inner.stats.l1_hits.fetch_add(1, Ordering::Relaxed);
            counter!("cache_requests_total", "outcome" => "l1_hit").increment(1);
            return Ok(value);
        }
        self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);

        let ttl = ttl.unwrap_or_else(|| self.inner.config.default_ttl());

        let rx = match self.inner.flights.join(key) {
            Flight::Leader(episode) => {
                let rx = episode.subscribe();
                let cache = self.clone();
                let key = key.to_string();
                let tags = tags.to_vec();
                tokio::spawn(async move {
                    let outcome = cache.populate(&key, &tags, ttl, factory).await;
                    episode.complete(outcome);
                });
                rx
            }
            Flight::Follower(rx) => {
                self.inner
                    .stats
                    .coalesced_waiters
                    .fetch_add(1, Ordering::Relaxed);
                counter!("cache_singleflight_coalesced_total").increment(1);
                rx
            }
        };

        Self::await_episode(rx).await
    }

    /// 删除缓存键：索引解除、L1 删除、L2 尽力删除
    ///
    /// 键不存在时为 no-op
    pub async fn remove(&self, key: &str) -> AppResult<()> {
        self.validate_key(key)?;

        // 索引先于条目清理：索引中无键即不再有针对它的失效尝试
        self.inner.tags.dissociate(key);
        self.inner.local.remove(key).await;

        {
            let key = key.to_string();
            self.inner
                .remote
                .execute("delete", (), move |store| async move {
                    store.delete(&key).await
                })
                .await;
        }
        counter!("cache_removals_total", "kind" => "key").increment(1);
        Ok(())
    }

    /// 删除某个标签下的全部键，返回删除的键数
    ///
    /// 无关联键的标签是 no-op
    pub async fn remove_by_tag(&self, tag: &str) -> AppResult<usize> {
        self.remove_snapshot(self.inner.tags.keys_for_tag(tag)).await
    }

    /// 删除一组标签下全部键的并集，共享键只删一次
    ///
    /// 快照在删除开始前取得：扫除期间被并发填充重新打上标签的键
    /// 不保证被本次扫除覆盖（先失效后重填可能竞争）
    pub async fn remove_by_tags(&self, tags: &[String]) -> AppResult<usize> {
        self.remove_snapshot(self.inner.tags.keys_for_tags(tags)).await
    }

    /// 先删后填
    ///
    /// remove 完成后开始的读者不会再看到旧值；两步之间其他调用方
    /// 可能抢先发起自己的填充，refresh 不保证独占填充权
    pub async fn refresh<F, Fut>(
        &self,
        key: &str,
        tags: &[String],
        ttl: Option<EntryTtl>,
        factory: F,
    ) -> AppResult<String>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<String>> + Send + 'static,
    {
        self.remove(key).await?;
        self.get_or_set(key, tags, ttl, factory).await
    }

    /// 某个标签下的键集合快照
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.inner.tags.keys_for_tag(tag)
    }

    /// 某个键的标签集合快照
    pub fn tags_for_key(&self, key: &str) -> HashSet<String> {
        self.inner.tags.tags_for_key(key)
    }

    /// 当前有键关联的标签数
    pub fn tag_count(&self) -> usize {
        self.inner.tags.tag_count()
    }

    /// 运行统计快照
    pub fn stats(&self) -> CacheStats {
        let stats = &self.inner.stats;
        CacheStats {
            l1_hits: stats.l1_hits.load(Ordering::Relaxed),
            l2_hits: stats.l2_hits.load(Ordering::Relaxed),
            misses: stats.misses.load(Ordering::Relaxed),
            populations: stats.populations.load(Ordering::Relaxed),
            coalesced_waiters: stats.coalesced_waiters.load(Ordering::Relaxed),
        }
    }

    /// 填充回合主体，在独立任务中执行
    async fn populate<F, Fut>(
        &self,
        key: &str,
        tags: &[String],
        ttl: EntryTtl,
        factory: F,
    ) -> EpisodeOutcome
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AppResult<String>> + Send,
    {
        // 首查与登记之间别的回合可能已完成填充，复查 L1
        if let Some(value) = self.inner.local.get(key).await {
            return Ok(value);
        }

        let lookup = {
            let key = key.to_string();
            self.inner
                .remote
                .execute("get", None, move |store| async move {
                    store.get(&key).await
                })
                .await
        };
        if let Some(value) = lookup {
            self.inner.stats.l2_hits.fetch_add(1, Ordering::Relaxed);
            counter!("cache_requests_total", "outcome" => "l2_hit").increment(1);
            debug!(key = %key, "L2 hit, backfilling L1");
            // 关联先于写入：观察到条目的读者必然也观察到标签
            self.inner.tags.associate(key, tags);
            self.inner.local.set(key, &value, ttl.local).await;
            return Ok(value);
        }

        let value = match factory().await {
            Ok(value) => value,
            Err(e) => {
                counter!("cache_factory_errors_total").increment(1);
                return Err(Arc::new(e));
            }
        };
        if value.len() > self.inner.config.max_value_bytes {
            return Err(Arc::new(AppError::validation(format!(
                "cache value exceeds {} bytes",
                self.inner.config.max_value_bytes
            ))));
        }

        self.inner.stats.populations.fetch_add(1, Ordering::Relaxed);
        counter!("cache_populations_total").increment(1);

        self.inner.tags.associate(key, tags);
        self.inner.local.set(key, &value, ttl.local).await;

        {
            let key = key.to_string();
            let value = value.clone();
            let remote_ttl = self.jittered_remote_ttl(ttl.remote);
            self.inner
                .remote
                .execute("set", (), move |store| async move {
                    store.set(&key, &value, remote_ttl).await
                })
                .await;
        }

        Ok(value)
    }

    async fn remove_snapshot(&self, keys: HashSet<String>) -> AppResult<usize> {
        for key in &keys {
            self.remove(key).await?;
        }
        Ok(keys.len())
    }

    async fn await_episode(
        mut rx: watch::Receiver<Option<EpisodeOutcome>>,
    ) -> AppResult<String> {
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AppError::internal("population episode dropped without a result"))?
            .clone();
        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(e)) => Err(e.as_ref().clone()),
            // wait_for 以 is_some 为条件
            None => Err(AppError::internal("population episode yielded no outcome")),
        }
    }

    fn jittered_remote_ttl(&self, base: Duration) -> Duration {
        apply_ttl_jitter(base, self.inner.config.remote_ttl_jitter)
    }

    fn validate_key(&self, key: &str) -> AppResult<()> {
        if key.is_empty() {
            return Err(AppError::validation("cache key must not be empty"));
        }
        if key.len() > self.inner.config.max_key_bytes {
            return Err(AppError::validation(format!(
                "cache key exceeds {} bytes",
                self.inner.config.max_key_bytes
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn in_flight_count(&self) -> usize {
        self.inner.flights.in_flight_count()
    }
}

/// 远端 TTL 施加 ±jitter/2 随机偏移，避免同批条目同时过期
fn apply_ttl_jitter(base: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    let half = (jitter.as_millis() / 2) as i64;
    let offset = rand::thread_rng().gen_range(-half..=half);
    if offset >= 0 {
        base + Duration::from_millis(offset as u64)
    } else {
        base.saturating_sub(Duration::from_millis(offset.unsigned_abs()))
    }
}
