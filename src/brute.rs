//! DNS暴破引擎
//!
//! 单个dispatcher按插入顺序读取label仓库，经有界工作队列喂给
//! 可变数量的worker；worker数量由监督循环向调优控制器给出的
//! 目标并发收敛。探测使用宿主机的resolver配置，截止时间由
//! 外层`tokio::time::timeout`控制，随调优动态变化。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::TokioAsyncResolver;

use crate::model::{ProbeOutcome, Provenance};
use crate::output::Emitter;
use crate::progress::Reporter;
use crate::state::BruteState;
use crate::store::{LabelIter, LabelStore};
use crate::tuning::{Telemetry, TIMEOUT_MAX_MS};
use crate::wildcard::WildcardDetector;

/// 工作队列容量，约为初始并发的两倍
const WORK_QUEUE_CAP: usize = 128;
/// 监督循环巡检间隔
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);
/// worker空闲时重新检查取消信号的间隔
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// apex可达性检查的截止时间
const APEX_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

type Job = (String, Provenance);

/// 构建使用宿主机resolver配置的异步解析器
pub fn build_resolver() -> Result<TokioAsyncResolver, Box<dyn std::error::Error>> {
    let (config, mut opts) = trust_dns_resolver::system_conf::read_system_conf()?;
    // 内部只做单次尝试，截止时间由外层的动态超时控制
    opts.attempts = 1;
    opts.timeout = Duration::from_millis(TIMEOUT_MAX_MS);
    Ok(TokioAsyncResolver::tokio(config, opts))
}

/// 启动前确认apex本身可以解析
pub async fn check_apex(
    resolver: &TokioAsyncResolver,
    apex: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match tokio::time::timeout(APEX_CHECK_TIMEOUT, resolver.lookup_ip(apex)).await {
        Ok(Ok(lookup)) if lookup.iter().next().is_some() => Ok(()),
        Ok(Ok(_)) => Err(format!("ApexUnreachable: {} returned no addresses", apex).into()),
        Ok(Err(e)) => Err(format!("ApexUnreachable: {} did not resolve: {}", apex, e).into()),
        Err(_) => Err(format!("ApexUnreachable: resolving {} timed out", apex).into()),
    }
}

/// 对单个FQDN做一次带截止时间的A/AAAA查询，返回结果与端到端耗时
pub async fn probe(
    resolver: &TokioAsyncResolver,
    fqdn: &str,
    timeout: Duration,
) -> (ProbeOutcome, f64) {
    let start = Instant::now();
    let outcome = match tokio::time::timeout(timeout, resolver.lookup_ip(fqdn)).await {
        Ok(Ok(lookup)) => {
            let addrs: Vec<_> = lookup.iter().collect();
            if addrs.is_empty() {
                ProbeOutcome::NotFound
            } else {
                ProbeOutcome::Resolved(addrs)
            }
        }
        Ok(Err(e)) => classify_resolve_error(&e),
        Err(_) => ProbeOutcome::Timeout,
    };
    (outcome, start.elapsed().as_secs_f64() * 1000.0)
}

/// resolver错误归类：NXDOMAIN/空应答不是故障，超时与其余错误分开计
fn classify_resolve_error(err: &ResolveError) -> ProbeOutcome {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => ProbeOutcome::NotFound,
        ResolveErrorKind::Timeout => ProbeOutcome::Timeout,
        _ => ProbeOutcome::TransientError(err.to_string()),
    }
}

/// DNS暴破worker池
pub struct BrutePool {
    state: Arc<BruteState>,
    resolver: Arc<TokioAsyncResolver>,
    telemetry: Arc<Telemetry>,
    emitter: Arc<Emitter>,
    reporter: Arc<Reporter>,
    wildcard: Arc<WildcardDetector>,
    apex: String,
}

impl BrutePool {
    /// 组装worker池
    pub fn new(
        state: Arc<BruteState>,
        resolver: Arc<TokioAsyncResolver>,
        telemetry: Arc<Telemetry>,
        emitter: Arc<Emitter>,
        reporter: Arc<Reporter>,
        wildcard: Arc<WildcardDetector>,
        apex: String,
    ) -> Self {
        BrutePool {
            state,
            resolver,
            telemetry,
            emitter,
            reporter,
            wildcard,
            apex,
        }
    }

    /// 运行完整的暴破阶段，所有标签探测完毕后返回
    pub async fn run(&self, store: &LabelStore) {
        let (tx, rx) = mpsc::channel::<Job>(WORK_QUEUE_CAP);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let dispatcher = tokio::spawn(dispatch(
            store.iter(),
            store.clone(),
            tx,
            self.state.clone(),
            self.reporter.clone(),
        ));

        // 监督循环：把worker数量收敛到目标并发，并等待整体排空
        loop {
            let active = self.state.active_workers();
            if self.state.dispatcher_done() && active == 0 && self.state.queue_depth() == 0 {
                break;
            }
            if self.state.is_running() {
                let target = self.state.conc_target();
                if active < target {
                    log::debug!("scaling worker pool {} -> {}", active, target);
                    for _ in active..target {
                        self.spawn_worker(rx.clone());
                    }
                }
            } else if active == 0 {
                // 取消后等在飞的探测收尾
                break;
            }
            tokio::time::sleep(SUPERVISE_INTERVAL).await;
        }

        // 关掉接收端，让可能还阻塞在send上的dispatcher解除阻塞
        drop(rx);
        let _ = dispatcher.await;
    }

    fn spawn_worker(&self, rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>) {
        self.state.worker_started();
        let state = self.state.clone();
        let resolver = self.resolver.clone();
        let telemetry = self.telemetry.clone();
        let emitter = self.emitter.clone();
        let reporter = self.reporter.clone();
        let wildcard = self.wildcard.clone();
        let apex = self.apex.clone();

        tokio::spawn(async move {
            loop {
                if !state.is_running() {
                    break;
                }
                // 限时recv：队列空置时定期回来检查取消信号与缩容票
                let recv_result = {
                    let mut guard = rx.lock().await;
                    tokio::time::timeout(RECV_POLL_INTERVAL, guard.recv()).await
                };
                let job = match recv_result {
                    Ok(job) => job,
                    Err(_) => {
                        if state.try_shed_worker() {
                            return;
                        }
                        continue;
                    }
                };
                let Some((label, provenance)) = job else {
                    // 队列已关闭且排空
                    break;
                };
                state.queue_dec();

                let fqdn = format!("{}.{}", label, apex);
                let timeout = Duration::from_millis(state.timeout_ms());
                let (outcome, latency_ms) = probe(&resolver, &fqdn, timeout).await;
                telemetry.record(latency_ms, outcome.kind());

                if let ProbeOutcome::Resolved(addrs) = &outcome {
                    if wildcard.matches(addrs) {
                        telemetry.record_wildcard_filtered();
                    } else if emitter.emit(&fqdn) {
                        telemetry.record_found(provenance == Provenance::Scrape);
                    }
                    if emitter.is_broken() {
                        state.stop();
                    }
                }
                reporter.probe_tick(telemetry.found());

                // 缩容：目标并发降低后多出来的worker做完当前探测即退
                if state.try_shed_worker() {
                    return;
                }
            }
            state.worker_exited();
        });
    }
}

/// dispatcher：按插入顺序派发标签，耗尽或被取消后关闭工作队列
async fn dispatch(
    mut iter: LabelIter,
    store: LabelStore,
    tx: mpsc::Sender<Job>,
    state: Arc<BruteState>,
    reporter: Arc<Reporter>,
) {
    while state.is_running() {
        match iter.next().await {
            Some(job) => {
                // 冻结之后新增的标签也会流到这里，同步抬高进度分母
                reporter.set_total(store.len() as u64);
                state.queue_inc();
                if tx.send(job).await.is_err() {
                    state.queue_dec();
                    break;
                }
            }
            None => break,
        }
    }
    state.set_dispatcher_done();
    // tx随即丢弃，工作队列关闭，worker排空后退出
}
