//! tandem-config - 配置加载库
//!
//! 分层合并 default.toml、环境 toml 与 TANDEM_ 前缀环境变量

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 本地缓存（L1）配置
#[derive(Debug, Clone, Deserialize)]
pub struct LocalCacheConfig {
    /// 最大条目数，逐出由存储后端负责
    #[serde(default = "default_local_capacity")]
    pub max_capacity: u64,
    /// 默认条目 TTL（秒）
    #[serde(default = "default_local_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_local_capacity() -> u64 {
    10_000
}

fn default_local_ttl_secs() -> u64 {
    60
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_local_capacity(),
            default_ttl_secs: default_local_ttl_secs(),
        }
    }
}

/// 远端缓存（L2）配置
#[derive(Debug, Deserialize)]
pub struct RemoteCacheConfig {
    pub url: Secret<String>,
    /// 键前缀，用于多应用共享同一个远端实例
    #[serde(default)]
    pub key_prefix: Option<String>,
    /// 单次远端操作超时（毫秒）
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// 默认条目 TTL（秒），远端 TTL 通常长于本地
    #[serde(default = "default_remote_ttl_secs")]
    pub default_ttl_secs: u64,
    /// TTL 抖动范围（秒），0 表示关闭
    ///
    /// 在远端 TTL 上施加 ±jitter/2 的随机偏移，避免同批写入同时过期
    #[serde(default)]
    pub ttl_jitter_secs: u64,
    /// 建连重试：最大尝试次数
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// 建连重试：初始延迟（毫秒）
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    /// 建连重试：最大延迟（毫秒）
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_op_timeout_ms() -> u64 {
    2_000
}

fn default_remote_ttl_secs() -> u64 {
    600
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_initial_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

/// 故障探测配置
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// 滑动采样窗口（秒）
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// 判定降级所需的最小样本数
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// 窗口内失败率阈值
    #[serde(default = "default_failure_ratio")]
    pub failure_ratio: f64,
    /// 降级后的冷却时间（秒），冷却结束后放行一次探测
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_window_secs() -> u64 {
    30
}

fn default_min_samples() -> usize {
    3
}

fn default_failure_ratio() -> f64 {
    0.5
}

fn default_cooldown_secs() -> u64 {
    30
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            min_samples: default_min_samples(),
            failure_ratio: default_failure_ratio(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// 应用配置
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub local: LocalCacheConfig,
    pub remote: RemoteCacheConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 合并顺序：default.toml < {APP_ENV}.toml < TANDEM__ 前缀环境变量
    /// （环境变量用双下划线分隔层级，如 TANDEM__REMOTE__URL）
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config: Self = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("TANDEM__").split("__"))
            .extract()?;

        Ok(config)
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }
}
