//! stderr遥测报告
//!
//! 单行进度条限频10Hz重绘；`[info]`/`[tune]`/`[stats]`消息在进度条
//! 活跃时通过bar打印，先清行再重绘，互不破坏。

use std::sync::Mutex;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// 进度条刷新频率上限（Hz）
const REFRESH_HZ: u8 = 10;

/// stderr报告器
pub struct Reporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl Reporter {
    /// 创建报告器，此时进度条未激活
    pub fn new() -> Self {
        Reporter {
            bar: Mutex::new(None),
        }
    }

    /// 打印启动横幅
    pub fn banner(&self) {
        eprintln!(
            "rdnsmap {} - DNS Network Mapper by {}",
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_AUTHORS")
        );
    }

    /// 输出一条`[info]`消息
    pub fn info(&self, msg: &str) {
        self.println(format!("[info] {}", msg));
    }

    /// 输出一条`[tune]`消息
    pub fn tune(&self, msg: &str) {
        self.println(format!("[tune] {}", msg));
    }

    /// 输出最终`[stats]`汇总
    pub fn stats(&self, msg: &str) {
        self.println(format!("[stats] {}", msg));
    }

    fn println(&self, line: String) {
        let bar = self.bar.lock().unwrap();
        match bar.as_ref() {
            Some(pb) => pb.println(line),
            None => eprintln!("{}", line),
        }
    }

    /// 进入暴破阶段，激活进度条
    pub fn start_bar(&self, total: u64) {
        let pb = ProgressBar::with_draw_target(
            Some(total),
            ProgressDrawTarget::stderr_with_hz(REFRESH_HZ),
        );
        pb.set_style(
            ProgressStyle::with_template(
                "{percent:>3}% [{bar:30}] {pos}/{len} found={msg} {per_sec} eta={eta}",
            )
            .unwrap()
            .progress_chars("#>-"),
        );
        pb.set_message("0");
        *self.bar.lock().unwrap() = Some(pb);
    }

    /// 记录一次完成的探测
    pub fn probe_tick(&self, found: u64) {
        if let Some(pb) = self.bar.lock().unwrap().as_ref() {
            pb.set_message(found.to_string());
            pb.inc(1);
        }
    }

    /// 总量中途增长时更新分母，进度不会倒退
    pub fn set_total(&self, total: u64) {
        if let Some(pb) = self.bar.lock().unwrap().as_ref() {
            if total > pb.length().unwrap_or(0) {
                pb.set_length(total);
            }
        }
    }

    /// 结束进度条并清掉当前行
    pub fn finish_bar(&self) {
        if let Some(pb) = self.bar.lock().unwrap().take() {
            pb.finish_and_clear();
        }
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}
