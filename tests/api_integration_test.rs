use rdnsmap::model::SampleKind;
use rdnsmap::tuning::{
    CONC_MAX, CONC_MIN, INITIAL_CONCURRENCY, INITIAL_TIMEOUT_MS, METRICS_WINDOW, TIMEOUT_MAX_MS,
    TIMEOUT_MIN_MS,
};
use rdnsmap::{
    decide, get_default_sub_data, ingest_scraped_labels, normalize_apex, Emitter, LabelStore,
    Provenance, Telemetry, TuneSnapshot,
};

#[test]
fn test_api_exports() {
    // 能编译通过说明API导出正常
    let _ = normalize_apex("example.com").unwrap();
    let _ = Emitter::new();
    println!("API导出测试通过");
}

#[test]
fn test_wordlist_merge_skips_scraped_labels() {
    // 场景：抓取源先返回了api(新)和mail(字典里也有)
    let store = LabelStore::new("example.com");
    assert!(store.add("api", Provenance::Scrape));
    assert!(store.add("mail", Provenance::Scrape));
    let scrape_count = store.len();

    let wordlist = ["mail", "web", "ftp"];
    for label in wordlist {
        store.add(label, Provenance::Wordlist);
    }

    // 最终规模 = 字典规模 + 抓取独有的标签数
    assert_eq!(store.len(), wordlist.len() + 1);
    assert_eq!(scrape_count, 2);
}

#[test]
fn test_scrape_report_counts_wordlist_overlap_as_not_new() {
    // 场景：某个源返回api(新)和www(字典里也有)
    // 汇报应当是 "yielded 2 labels, of which 1 are new"
    use std::collections::HashSet;

    let store = LabelStore::new("example.com");
    let wordlist = ["www", "mail", "web"];
    let wordlist_set: HashSet<&str> = wordlist.into_iter().collect();
    let labels = vec!["api".to_string(), "www".to_string()];

    let new = ingest_scraped_labels(&store, &wordlist_set, &labels);
    assert_eq!(labels.len(), 2);
    assert_eq!(new, 1);

    // 合并字典后：最终规模 = 字典规模 + 1
    for label in wordlist {
        store.add(label, Provenance::Wordlist);
    }
    assert_eq!(store.len(), wordlist.len() + 1);
}

#[test]
fn test_readd_idempotent() {
    let store = LabelStore::new("example.com");
    assert!(store.add("Portal", Provenance::Wordlist));
    let size = store.len();
    // 任意大小写、带不带末尾点，重复插入都不改变size
    assert!(!store.add("portal", Provenance::Wordlist));
    assert!(!store.add("PORTAL.", Provenance::Scrape));
    assert_eq!(store.len(), size);
}

#[tokio::test]
async fn test_labels_added_during_iteration_are_dispatched() {
    let store = LabelStore::new("example.com");
    store.add("first", Provenance::Wordlist);

    let mut iter = store.iter();
    let (label, _) = iter.next().await.unwrap();
    assert_eq!(label, "first");

    // 迭代开始后补充的标签依然会被派发
    store.add("late", Provenance::Scrape);
    store.close();
    let (label, provenance) = iter.next().await.unwrap();
    assert_eq!(label, "late");
    assert_eq!(provenance, Provenance::Scrape);
    assert!(iter.next().await.is_none());
}

#[test]
fn test_default_wordlist_usable() {
    let data = get_default_sub_data();
    assert!(!data.is_empty());

    // 字典整体装得进仓库，且全部有效
    let store = LabelStore::new("example.com");
    for label in data {
        assert!(store.add(label, Provenance::Wordlist), "标签被拒绝: {}", label);
    }
    assert_eq!(store.len(), data.len());
}

#[test]
fn test_controller_invariants_over_long_run() {
    // 混合负载下连续调优，边界始终成立
    let mut conc = INITIAL_CONCURRENCY;
    let mut timeout_ms = INITIAL_TIMEOUT_MS;
    let snapshots = [
        TuneSnapshot {
            samples: 1000,
            resolved: 100,
            not_found: 400,
            timeouts: 500,
            transient: 0,
            p90_ms: 900.0,
        },
        TuneSnapshot {
            samples: 1000,
            resolved: 900,
            not_found: 95,
            timeouts: 5,
            transient: 0,
            p90_ms: 40.0,
        },
        TuneSnapshot {
            samples: 1000,
            resolved: 0,
            not_found: 0,
            timeouts: 1000,
            transient: 0,
            p90_ms: 5000.0,
        },
        TuneSnapshot {
            samples: 1000,
            resolved: 990,
            not_found: 10,
            timeouts: 0,
            transient: 0,
            p90_ms: 30.0,
        },
    ];
    for _ in 0..50 {
        for snap in &snapshots {
            let d = decide(snap, 300, conc, timeout_ms);
            assert!(d.conc >= CONC_MIN && d.conc <= CONC_MAX);
            assert!(d.timeout_ms >= TIMEOUT_MIN_MS && d.timeout_ms <= TIMEOUT_MAX_MS);
            conc = d.conc;
            timeout_ms = d.timeout_ms;
        }
    }
}

#[test]
fn test_telemetry_window_is_rolling() {
    let telemetry = Telemetry::new();
    // 先塞满窗口的超时采样，再用成功采样冲刷
    for _ in 0..METRICS_WINDOW {
        telemetry.record(500.0, SampleKind::Timeout);
    }
    for _ in 0..METRICS_WINDOW {
        telemetry.record(50.0, SampleKind::Resolved);
    }
    let snap = telemetry.snapshot();
    assert_eq!(snap.samples, METRICS_WINDOW);
    assert_eq!(snap.timeouts, 0);
    assert_eq!(snap.resolved, METRICS_WINDOW);
    // 滚动窗口：旧采样完全被挤出，决策不被历史拖累
    assert!(snap.timeout_rate() < 1e-9);
}

#[test]
fn test_emitter_dedup_across_sources() {
    let emitter = Emitter::new();
    assert!(emitter.emit("dup.example.com"));
    assert!(!emitter.emit("dup.example.com"));
    assert_eq!(emitter.confirmed_count(), 1);
}
