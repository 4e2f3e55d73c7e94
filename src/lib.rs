//! # rdnsmap
//!
//! 一个并发DNS子域名枚举工具库。
//!
//! ## 特性
//!
//! - 🚀 **自适应并发**: 根据超时率与p90延迟动态调整worker数量和单次查询超时
//! - 🔍 **双通道发现**: 内置字典暴破 + 被动抓取源（证书透明度/被动DNS/威胁情报）
//! - 📡 **宿主机resolver**: 直接使用系统resolver配置，不硬编码任何DNS地址
//! - 📊 **干净的输出约定**: stdout只输出确认的FQDN，进度与遥测全部走stderr
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use rdnsmap::model::Provenance;
//! use rdnsmap::store::LabelStore;
//!
//! let store = LabelStore::new("example.com");
//! store.add("www", Provenance::Wordlist);
//! assert_eq!(store.len(), 1);
//! ```

#![warn(missing_docs)]

// 内部模块
pub mod brute;
pub mod input;
pub mod logger;
pub mod model;
pub mod output;
pub mod progress;
pub mod scrape;
pub mod state;
pub mod store;
pub mod subdata;
pub mod tuning;
pub mod wildcard;

// 重新导出主要的公共API
pub use brute::{build_resolver, check_apex, probe, BrutePool};
pub use input::{normalize_apex, Opts};
pub use model::{ProbeOutcome, Provenance};
pub use output::Emitter;
pub use progress::Reporter;
pub use scrape::{ingest_scraped_labels, ScrapeSource};
pub use state::BruteState;
pub use store::LabelStore;
pub use subdata::get_default_sub_data;
pub use tuning::{decide, Telemetry, TuneDecision, TuneSnapshot, TuningController};
pub use wildcard::WildcardDetector;
