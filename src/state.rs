//! 暴破阶段的共享状态
//!
//! dispatcher、worker与调优控制器之间只通过这里的原子量协作，
//! 没有进程级全局变量；状态由Orchestrator创建并持有。

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::tuning::{INITIAL_CONCURRENCY, INITIAL_TIMEOUT_MS};

/// 暴破阶段共享状态
pub struct BruteState {
    running: AtomicBool,
    conc_target: AtomicUsize,
    timeout_ms: AtomicU64,
    queue_depth: AtomicUsize,
    active_workers: AtomicUsize,
    dispatcher_done: AtomicBool,
}

impl BruteState {
    /// 以初始调优参数创建状态
    pub fn new() -> Self {
        BruteState {
            running: AtomicBool::new(true),
            conc_target: AtomicUsize::new(INITIAL_CONCURRENCY),
            timeout_ms: AtomicU64::new(INITIAL_TIMEOUT_MS),
            queue_depth: AtomicUsize::new(0),
            active_workers: AtomicUsize::new(0),
            dispatcher_done: AtomicBool::new(false),
        }
    }

    /// 是否仍在运行（未被取消）
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// 发出取消信号：dispatcher停止派发，worker完成当前探测后退出
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// 当前并发目标
    pub fn conc_target(&self) -> usize {
        self.conc_target.load(Ordering::Relaxed)
    }

    /// 设置并发目标
    pub fn set_conc_target(&self, conc: usize) {
        self.conc_target.store(conc, Ordering::Relaxed);
    }

    /// 当前单次查询超时（毫秒）
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.load(Ordering::Relaxed)
    }

    /// 设置单次查询超时（毫秒）
    pub fn set_timeout_ms(&self, timeout_ms: u64) {
        self.timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    /// 工作队列当前深度
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// 入队一个标签
    pub fn queue_inc(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    /// 出队一个标签
    pub fn queue_dec(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// 当前存活worker数
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// worker启动登记
    pub fn worker_started(&self) {
        self.active_workers.fetch_add(1, Ordering::Relaxed);
    }

    /// worker自然退出登记
    pub fn worker_exited(&self) {
        self.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    /// worker完成当前探测后是否应当优雅退出（缩容）
    ///
    /// CAS保证不会多减：返回true的worker已经从存活计数中扣除
    pub fn try_shed_worker(&self) -> bool {
        loop {
            let active = self.active_workers.load(Ordering::Relaxed);
            if active <= self.conc_target.load(Ordering::Relaxed) {
                return false;
            }
            if self
                .active_workers
                .compare_exchange(active, active - 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// dispatcher是否已经派发完所有标签
    pub fn dispatcher_done(&self) -> bool {
        self.dispatcher_done.load(Ordering::Relaxed)
    }

    /// 登记dispatcher结束
    pub fn set_dispatcher_done(&self) {
        self.dispatcher_done.store(true, Ordering::Relaxed);
    }
}

impl Default for BruteState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_initial_values() {
        let state = BruteState::new();
        assert!(state.is_running());
        assert_eq!(state.conc_target(), INITIAL_CONCURRENCY);
        assert_eq!(state.timeout_ms(), INITIAL_TIMEOUT_MS);
        assert_eq!(state.queue_depth(), 0);
        assert_eq!(state.active_workers(), 0);
        assert!(!state.dispatcher_done());
    }

    #[test]
    fn test_shed_respects_target() {
        let state = BruteState::new();
        state.set_conc_target(2);
        for _ in 0..4 {
            state.worker_started();
        }
        // 多出的两个worker各领到一张退出票
        assert!(state.try_shed_worker());
        assert!(state.try_shed_worker());
        assert!(!state.try_shed_worker());
        assert_eq!(state.active_workers(), 2);
    }

    #[test]
    fn test_shed_concurrent_never_undershoots() {
        let state = Arc::new(BruteState::new());
        state.set_conc_target(8);
        for _ in 0..64 {
            state.worker_started();
        }

        let mut handles = vec![];
        for _ in 0..64 {
            let state = state.clone();
            handles.push(thread::spawn(move || state.try_shed_worker()));
        }
        let shed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&s| s)
            .count();
        assert_eq!(shed, 56);
        assert_eq!(state.active_workers(), 8);
    }

    #[test]
    fn test_queue_depth_roundtrip() {
        let state = BruteState::new();
        state.queue_inc();
        state.queue_inc();
        state.queue_dec();
        assert_eq!(state.queue_depth(), 1);
    }
}
