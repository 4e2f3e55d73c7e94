use std::collections::HashSet;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use itertools::Itertools;

use rdnsmap::brute::{self, BrutePool};
use rdnsmap::input::{normalize_apex, Opts};
use rdnsmap::model::Provenance;
use rdnsmap::output::Emitter;
use rdnsmap::progress::Reporter;
use rdnsmap::scrape::{self, ScrapeSource};
use rdnsmap::state::BruteState;
use rdnsmap::store::LabelStore;
use rdnsmap::subdata;
use rdnsmap::tuning::{Telemetry, TuningController, INITIAL_TIMEOUT_MS};
use rdnsmap::wildcard::WildcardDetector;

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    let apex = match normalize_apex(&opts.domain) {
        Ok(apex) => apex,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };

    rdnsmap::logger::init_logger();

    let reporter = Arc::new(Reporter::new());
    reporter.banner();

    match run(apex, reporter).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

/// 驱动 init → scrape → merge → brute-force → stats 各阶段
async fn run(apex: String, reporter: Arc<Reporter>) -> Result<i32, Box<dyn std::error::Error>> {
    let started = Instant::now();

    let resolver = Arc::new(brute::build_resolver()?);
    brute::check_apex(&resolver, &apex).await?;

    // 泛解析检测，命中的IP在暴破中不算确认结果
    let wildcard = Arc::new(
        WildcardDetector::detect(&resolver, &apex, Duration::from_millis(INITIAL_TIMEOUT_MS * 4))
            .await,
    );
    if wildcard.is_wildcard() {
        reporter.info(&format!(
            "wildcard detected; ignoring IPs: {}",
            wildcard.ips().iter().join(", ")
        ));
    }

    let store = LabelStore::new(&apex);
    let telemetry = Arc::new(Telemetry::new());
    let state = Arc::new(BruteState::new());
    let emitter = Arc::new(Emitter::new());
    let interrupted = Arc::new(AtomicBool::new(false));

    // Ctrl-C：停止派发，等在飞探测收尾后打印部分统计
    {
        let state = state.clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::Relaxed);
                state.stop();
            }
        });
    }

    // 抓取阶段：全部被动源并发运行
    // "新"标签相对字典与已入库的标签计数，字典里已有的不算增量
    let wordlist = subdata::get_default_sub_data();
    let wordlist_set: HashSet<&str> = wordlist.iter().copied().collect();
    let (scrape_total, scrape_new) = run_scrape_phase(&store, &wordlist_set, &reporter).await;
    reporter.info(&format!(
        "scraping sources yielded {} labels, of which {} are new",
        scrape_total, scrape_new
    ));

    // 合并阶段：装入内置字典，抓取阶段已有的标签自动跳过
    for label in wordlist {
        store.add(label, Provenance::Wordlist);
    }
    store.close();
    // 字典之外的增量全部来自抓取
    let scrape_delta = store.len().saturating_sub(wordlist.len());
    reporter.info(&format!(
        "brute-force target count: {} (+{} from scraping)",
        wordlist.len(),
        scrape_delta
    ));

    // 暴破阶段
    if state.is_running() {
        reporter.start_bar(store.len() as u64);
        let pool = BrutePool::new(
            state.clone(),
            resolver,
            telemetry.clone(),
            emitter.clone(),
            reporter.clone(),
            wildcard,
            apex.clone(),
        );
        let controller =
            TuningController::new(telemetry.clone(), state.clone(), reporter.clone());
        let controller_handle = tokio::spawn(controller.run());
        pool.run(&store).await;
        controller_handle.abort();
        let _ = controller_handle.await;
        reporter.finish_bar();
    }

    // 最终统计；确认结果已实时写出，这里只需要汇总
    let duration = started.elapsed().as_secs_f64().max(1e-6);
    let attempted = telemetry.attempted();
    let mut stats = format!(
        "duration={:.2}s attempted={} found={} scrape_found={} avg_per_sec={:.2}",
        duration,
        attempted,
        telemetry.found(),
        telemetry.scrape_found(),
        attempted as f64 / duration
    );
    if telemetry.wildcard_filtered() > 0 {
        stats.push_str(&format!(" wildcard_filtered={}", telemetry.wildcard_filtered()));
    }
    reporter.stats(&stats);

    if interrupted.load(Ordering::Relaxed) {
        return Ok(130);
    }
    if emitter.is_broken() {
        // 下游读到过结果就算正常结束
        return Ok(if emitter.wrote_any() { 0 } else { 1 });
    }
    Ok(0)
}

/// 抓取阶段：被动源并发执行，结果实时去重入库
///
/// 返回`(标签总数, 新标签数)`；单个源失败只记一条`[info]`
async fn run_scrape_phase(
    store: &LabelStore,
    wordlist_set: &HashSet<&str>,
    reporter: &Arc<Reporter>,
) -> (usize, usize) {
    let client = match scrape::build_client() {
        Ok(client) => client,
        Err(e) => {
            reporter.info(&format!("scrape disabled: {}", e));
            return (0, 0);
        }
    };

    let mut handles = Vec::new();
    for source in ScrapeSource::all() {
        let client = client.clone();
        let apex = store.apex().to_string();
        handles.push(tokio::spawn(async move {
            (source, source.scrape(&client, &apex).await)
        }));
    }

    let mut total = 0;
    let mut new = 0;
    for handle in handles {
        let Ok((source, result)) = handle.await else {
            continue;
        };
        match result {
            Ok(labels) => {
                let added = scrape::ingest_scraped_labels(store, wordlist_set, &labels);
                total += labels.len();
                new += added;
                reporter.info(&format!(
                    "scrape {} yielded {} labels, of which {} are new",
                    source.name(),
                    labels.len(),
                    added
                ));
            }
            Err(e) => {
                reporter.info(&format!("scrape {} failed: {}", source.name(), e));
            }
        }
    }
    (total, new)
}
