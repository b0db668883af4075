//! 远端故障探测
//!
//! 显式三态状态机：Normal -> Degraded -> Probing -> Normal/Degraded。
//! 所有状态转换集中在少数几个同步方法里，便于单独审计和测试

use metrics::counter;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 运行模式（对外只读视图）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 正常：远端操作全部放行
    Normal,
    /// 降级：远端操作全部跳过，仅本地运行
    Degraded,
    /// 探测：冷却结束，放行单个操作验证远端是否恢复
    Probing,
}

/// 单次远端操作的放行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    /// 正常放行，结果计入采样窗口
    Execute,
    /// 作为探测放行，结果决定恢复还是继续降级
    Probe,
    /// 拒绝，调用方直接使用 fallback
    Refuse,
}

/// 故障探测配置
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// 滑动采样窗口
    pub window: Duration,
    /// 判定降级所需的最小样本数
    pub min_samples: usize,
    /// 窗口内失败率阈值
    pub failure_ratio: f64,
    /// 降级后的冷却时间
    pub cooldown: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            min_samples: 3,
            failure_ratio: 0.5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl DetectorConfig {
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn with_failure_ratio(mut self, ratio: f64) -> Self {
        self.failure_ratio = ratio;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// 从应用配置装配
    pub fn from_app_config(config: &tandem_config::DetectorConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            min_samples: config.min_samples,
            failure_ratio: config.failure_ratio,
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

#[derive(Debug)]
enum ModeState {
    Normal,
    Degraded { since: Instant },
    Probing { probe_in_flight: bool },
}

#[derive(Debug)]
struct DetectorState {
    mode: ModeState,
    /// 滑动窗口内的操作结果 (时间, 是否成功)
    window: VecDeque<(Instant, bool)>,
}

/// 故障探测器
///
/// 进程级单例，由远端访问层在每次 L2 调用前后驱动
pub struct FailureDetector {
    config: DetectorConfig,
    state: Mutex<DetectorState>,
}

impl FailureDetector {
    /// `initially_healthy` 来自启动时的一次连通性探测
    pub fn new(config: DetectorConfig, initially_healthy: bool) -> Self {
        let mode = if initially_healthy {
            ModeState::Normal
        } else {
            ModeState::Degraded {
                since: Instant::now(),
            }
        };

        Self {
            config,
            state: Mutex::new(DetectorState {
                mode,
                window: VecDeque::new(),
            }),
        }
    }

    /// 当前模式
    pub fn mode(&self) -> Mode {
        match self.state.lock().mode {
            ModeState::Normal => Mode::Normal,
            ModeState::Degraded { .. } => Mode::Degraded,
            ModeState::Probing { .. } => Mode::Probing,
        }
    }

    /// 请求放行一次远端操作
    ///
    /// 降级期间冷却结束则转入探测；探测期间只放行一个操作，
    /// 其余并发调用一律拒绝
    pub fn acquire_permit(&self) -> Permit {
        let mut state = self.state.lock();
        match &mut state.mode {
            ModeState::Normal => Permit::Execute,
            ModeState::Degraded { since } => {
                let elapsed = since.elapsed();
                if elapsed >= self.config.cooldown {
                    state.mode = ModeState::Probing {
                        probe_in_flight: true,
                    };
                    info!("Cooldown elapsed, probing remote tier");
                    counter!("cache_mode_transitions_total", "to" => "probing").increment(1);
                    Permit::Probe
                } else {
                    Permit::Refuse
                }
            }
            ModeState::Probing { probe_in_flight } => {
                if *probe_in_flight {
                    Permit::Refuse
                } else {
                    *probe_in_flight = true;
                    Permit::Probe
                }
            }
        }
    }

    /// 记录一次普通操作成功
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.window.push_back((now, true));
        self.trim_window(&mut state.window, now);
    }

    /// 记录一次普通操作失败，失败率越限时降级
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.window.push_back((now, false));
        self.trim_window(&mut state.window, now);

        if !matches!(state.mode, ModeState::Normal) {
            return;
        }

        let total = state.window.len();
        if total < self.config.min_samples {
            return;
        }
        let failures = state.window.iter().filter(|(_, ok)| !*ok).count();
        let ratio = failures as f64 / total as f64;
        if ratio >= self.config.failure_ratio {
            state.mode = ModeState::Degraded { since: now };
            warn!(failures, total, "Remote tier degraded, bypassing L2");
            counter!("cache_mode_transitions_total", "to" => "degraded").increment(1);
        }
    }

    /// 探测成功：恢复正常，采样窗口清零
    pub fn probe_succeeded(&self) {
        let mut state = self.state.lock();
        state.mode = ModeState::Normal;
        state.window.clear();
        info!("Remote tier recovered, resuming L2 operations");
        counter!("cache_mode_transitions_total", "to" => "normal").increment(1);
    }

    /// 探测失败：回到降级，冷却重新计时
    pub fn probe_failed(&self) {
        let mut state = self.state.lock();
        state.mode = ModeState::Degraded {
            since: Instant::now(),
        };
        warn!("Probe failed, remote tier still degraded");
        counter!("cache_mode_transitions_total", "to" => "degraded").increment(1);
    }

    fn trim_window(&self, window: &mut VecDeque<(Instant, bool)>, now: Instant) {
        let horizon = now.checked_sub(self.config.window);
        if let Some(horizon) = horizon {
            while let Some((at, _)) = window.front() {
                if *at < horizon {
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
    }
}
