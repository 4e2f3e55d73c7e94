//! stdout结果输出
//!
//! stdout只承载确认的FQDN，一行一个，全程去重；
//! 所有装饰信息都走stderr。下游管道提前关闭不会产生panic输出。

use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// 确认子域名的stdout发射器
pub struct Emitter {
    confirmed: Mutex<HashSet<String>>,
    wrote_any: AtomicBool,
    broken: AtomicBool,
}

impl Emitter {
    /// 创建空发射器
    pub fn new() -> Self {
        Emitter {
            confirmed: Mutex::new(HashSet::new()),
            wrote_any: AtomicBool::new(false),
            broken: AtomicBool::new(false),
        }
    }

    /// 输出一个确认的FQDN
    ///
    /// 写出行的互斥在这里完成，行与行绝不交错；
    /// 重复的FQDN或stdout已失效时返回false
    pub fn emit(&self, fqdn: &str) -> bool {
        if self.broken.load(Ordering::Relaxed) {
            return false;
        }
        let mut confirmed = self.confirmed.lock().unwrap();
        if !confirmed.insert(fqdn.to_string()) {
            return false;
        }
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        if writeln!(out, "{}", fqdn).and_then(|_| out.flush()).is_err() {
            // 下游已经退出，静默终止本次运行
            self.broken.store(true, Ordering::Relaxed);
            return false;
        }
        self.wrote_any.store(true, Ordering::Relaxed);
        true
    }

    /// stdout是否已失效（如下游管道关闭）
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Relaxed)
    }

    /// 是否成功写出过至少一行
    pub fn wrote_any(&self) -> bool {
        self.wrote_any.load(Ordering::Relaxed)
    }

    /// 已确认的子域名数量
    pub fn confirmed_count(&self) -> usize {
        self.confirmed.lock().unwrap().len()
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_exactly_once() {
        let emitter = Emitter::new();
        assert!(emitter.emit("www.example.com"));
        assert!(!emitter.emit("www.example.com"));
        assert!(emitter.emit("mail.example.com"));
        assert_eq!(emitter.confirmed_count(), 2);
        assert!(emitter.wrote_any());
        assert!(!emitter.is_broken());
    }
}
