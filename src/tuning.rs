//! 自适应调优
//!
//! 热路径用一个原子计数结构，延迟窗口用互斥锁保护的环形缓冲。
//! 控制器按1秒节奏消费最近1000个采样的滚动窗口快照：
//! 超时率高说明resolver或链路已饱和，抬高超时并收缩并发；
//! 超时率很低且p90延迟余量充足时收紧超时，并在队列足以喂饱
//! 新worker时再扩张并发。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use itertools::Itertools;

use crate::model::{Sample, SampleKind};
use crate::progress::Reporter;
use crate::state::BruteState;

/// 滚动采样窗口容量
pub const METRICS_WINDOW: usize = 1000;
/// 并发下限
pub const CONC_MIN: usize = 8;
/// 并发硬上限
pub const CONC_MAX: usize = 512;
/// 单次查询超时下限（毫秒）
pub const TIMEOUT_MIN_MS: u64 = 100;
/// 单次查询超时上限（毫秒）
pub const TIMEOUT_MAX_MS: u64 = 5_000;
/// 初始并发
pub const INITIAL_CONCURRENCY: usize = 64;
/// 初始超时（毫秒）
pub const INITIAL_TIMEOUT_MS: u64 = 500;

/// 控制器节奏
const TICK_PERIOD: Duration = Duration::from_secs(1);
/// 首个tick最迟在启动后5秒触发
const WARMUP_DEADLINE: Duration = Duration::from_secs(5);

/// 全局探测统计与滚动采样窗口
pub struct Telemetry {
    attempted: AtomicU64,
    found: AtomicU64,
    scrape_found: AtomicU64,
    wildcard_filtered: AtomicU64,
    window: Mutex<VecDeque<Sample>>,
}

impl Telemetry {
    /// 创建空的统计器
    pub fn new() -> Self {
        Telemetry {
            attempted: AtomicU64::new(0),
            found: AtomicU64::new(0),
            scrape_found: AtomicU64::new(0),
            wildcard_filtered: AtomicU64::new(0),
            window: Mutex::new(VecDeque::with_capacity(METRICS_WINDOW)),
        }
    }

    /// 记录一次完成的探测；每次探测恰好调用一次
    pub fn record(&self, latency_ms: f64, kind: SampleKind) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        let mut window = self.window.lock().unwrap();
        if window.len() == METRICS_WINDOW {
            window.pop_front();
        }
        window.push_back(Sample { latency_ms, kind });
    }

    /// 记录一个确认的子域名
    pub fn record_found(&self, from_scrape: bool) {
        self.found.fetch_add(1, Ordering::Relaxed);
        if from_scrape {
            self.scrape_found.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 记录一次被泛解析过滤的应答
    pub fn record_wildcard_filtered(&self) {
        self.wildcard_filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// 已完成的探测总数
    pub fn attempted(&self) -> u64 {
        self.attempted.load(Ordering::Relaxed)
    }

    /// 已确认的子域名总数
    pub fn found(&self) -> u64 {
        self.found.load(Ordering::Relaxed)
    }

    /// 来自抓取源的确认数
    pub fn scrape_found(&self) -> u64 {
        self.scrape_found.load(Ordering::Relaxed)
    }

    /// 被泛解析过滤的应答数
    pub fn wildcard_filtered(&self) -> u64 {
        self.wildcard_filtered.load(Ordering::Relaxed)
    }

    /// 对最近的采样窗口做快照
    pub fn snapshot(&self) -> TuneSnapshot {
        let window = self.window.lock().unwrap();
        let samples = window.len();
        let mut resolved = 0;
        let mut not_found = 0;
        let mut timeouts = 0;
        let mut transient = 0;
        for sample in window.iter() {
            match sample.kind {
                SampleKind::Resolved => resolved += 1,
                SampleKind::NotFound => not_found += 1,
                SampleKind::Timeout => timeouts += 1,
                SampleKind::TransientError => transient += 1,
            }
        }
        let p90_ms = if samples == 0 {
            0.0
        } else {
            let latencies: Vec<f64> = window
                .iter()
                .map(|s| s.latency_ms)
                .sorted_by(|a, b| a.total_cmp(b))
                .collect();
            latencies[(samples - 1) * 9 / 10]
        };
        TuneSnapshot {
            samples,
            resolved,
            not_found,
            timeouts,
            transient,
            p90_ms,
        }
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// 控制器每个tick消费的窗口快照
#[derive(Debug, Clone, Copy)]
pub struct TuneSnapshot {
    pub samples: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub timeouts: usize,
    pub transient: usize,
    pub p90_ms: f64,
}

impl TuneSnapshot {
    /// 成功解析占比
    pub fn success_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.resolved as f64 / self.samples as f64
        }
    }

    /// 超时占比
    pub fn timeout_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.timeouts as f64 / self.samples as f64
        }
    }
}

/// 一次调优决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuneDecision {
    pub conc: usize,
    pub timeout_ms: u64,
    pub adjusted: bool,
}

/// 根据窗口快照计算新的`(并发, 超时)`
///
/// 扩张只在`queue_depth > conc/2`时发生，队列喂不饱就不加worker
pub fn decide(
    snapshot: &TuneSnapshot,
    queue_depth: usize,
    conc: usize,
    timeout_ms: u64,
) -> TuneDecision {
    let mut new_conc = conc;
    let mut new_timeout = timeout_ms;

    if snapshot.samples > 0 {
        if snapshot.timeout_rate() > 0.05 {
            // 超时压力：放宽超时，收缩并发
            new_timeout = (timeout_ms as f64 * 1.25) as u64;
            new_conc = (conc as f64 * 0.8) as usize;
        } else if snapshot.timeout_rate() < 0.01 && snapshot.p90_ms < timeout_ms as f64 / 3.0 {
            // 余量充足：向2*p90收紧超时，队列够深才扩张并发
            new_timeout = (snapshot.p90_ms * 2.0) as u64;
            if queue_depth > conc / 2 {
                new_conc = (conc as f64 * 1.25) as usize;
            }
        }
    }

    let new_conc = new_conc.clamp(CONC_MIN, CONC_MAX);
    let new_timeout = new_timeout.clamp(TIMEOUT_MIN_MS, TIMEOUT_MAX_MS);
    TuneDecision {
        conc: new_conc,
        timeout_ms: new_timeout,
        adjusted: new_conc != conc || new_timeout != timeout_ms,
    }
}

/// 调优控制器
pub struct TuningController {
    telemetry: Arc<Telemetry>,
    state: Arc<BruteState>,
    reporter: Arc<Reporter>,
}

impl TuningController {
    /// 创建控制器
    pub fn new(telemetry: Arc<Telemetry>, state: Arc<BruteState>, reporter: Arc<Reporter>) -> Self {
        TuningController {
            telemetry,
            state,
            reporter,
        }
    }

    /// 控制循环：完成1000次探测或启动5秒后开始，每秒一个tick
    pub async fn run(self) {
        let started = Instant::now();
        while self.state.is_running()
            && self.telemetry.attempted() < METRICS_WINDOW as u64
            && started.elapsed() < WARMUP_DEADLINE
        {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let mut ticker = tokio::time::interval(TICK_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while self.state.is_running() {
            ticker.tick().await;
            self.tick();
        }
    }

    fn tick(&self) {
        let snapshot = self.telemetry.snapshot();
        let conc = self.state.conc_target();
        let timeout_ms = self.state.timeout_ms();
        let queue_depth = self.state.queue_depth();
        let decision = decide(&snapshot, queue_depth, conc, timeout_ms);
        if decision.adjusted {
            self.state.set_conc_target(decision.conc);
            self.state.set_timeout_ms(decision.timeout_ms);
            self.reporter.tune(&format!(
                "conc={} p90={:.0}ms success={:.0}% timeouts={:.0}% samples={} q={} timeout={}ms",
                decision.conc,
                snapshot.p90_ms,
                snapshot.success_rate() * 100.0,
                snapshot.timeout_rate() * 100.0,
                snapshot.samples,
                queue_depth,
                decision.timeout_ms
            ));
        }
    }
}
