//! 被动发现源
//!
//! 三个不发DNS查询的候选来源：证书透明度日志、被动DNS聚合、
//! 威胁情报聚合。每个源抓取失败只影响自己，瞬时网络故障重试一次。

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::model::Provenance;
use crate::store::LabelStore;

/// 单个被动源的请求超时
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(30);

/// 构造所有被动源共用的HTTP客户端
pub fn build_client() -> Result<Client, Box<dyn std::error::Error + Send + Sync>> {
    let client = Client::builder()
        .timeout(SCRAPE_TIMEOUT)
        .user_agent(concat!("rdnsmap/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// crt.sh返回的单条证书记录
#[derive(Debug, Deserialize)]
struct CrtShEntry {
    name_value: String,
}

/// threatcrowd域名报告
#[derive(Debug, Deserialize)]
struct ThreatIntelReport {
    #[serde(default)]
    subdomains: Vec<String>,
}

/// 已注册的被动发现源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeSource {
    /// 证书透明度日志 (crt.sh)
    CertTransparency,
    /// 被动DNS聚合 (hackertarget)
    PassiveDns,
    /// 威胁情报聚合 (threatcrowd)
    ThreatIntel,
}

impl ScrapeSource {
    /// 全部被动源，顺序即调度顺序
    pub fn all() -> [ScrapeSource; 3] {
        [
            ScrapeSource::CertTransparency,
            ScrapeSource::PassiveDns,
            ScrapeSource::ThreatIntel,
        ]
    }

    /// 源名称，用于日志与统计
    pub fn name(&self) -> &'static str {
        match self {
            ScrapeSource::CertTransparency => "crt.sh",
            ScrapeSource::PassiveDns => "hackertarget",
            ScrapeSource::ThreatIntel => "threatcrowd",
        }
    }

    fn url(&self, apex: &str) -> String {
        match self {
            ScrapeSource::CertTransparency => {
                format!("https://crt.sh/?q=%25.{}&output=json", apex)
            }
            ScrapeSource::PassiveDns => {
                format!("https://api.hackertarget.com/hostsearch/?q={}", apex)
            }
            ScrapeSource::ThreatIntel => format!(
                "https://www.threatcrowd.org/searchApi/v2/domain/report/?domain={}",
                apex
            ),
        }
    }

    /// 抓取并解析候选标签；瞬时网络故障重试一次
    pub async fn scrape(
        &self,
        client: &Client,
        apex: &str,
    ) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
        match self.fetch_once(client, apex).await {
            Ok(labels) => Ok(labels),
            Err(e) if is_transient(&e) => {
                log::warn!("scrape {} transient failure, retrying: {}", self.name(), e);
                self.fetch_once(client, apex).await
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_once(
        &self,
        client: &Client,
        apex: &str,
    ) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
        let response = client.get(self.url(apex)).send().await?;
        if !response.status().is_success() {
            return Err(format!("http status {}", response.status()).into());
        }
        let body = response.text().await?;
        self.parse(&body, apex)
    }

    /// 按各源的返回格式解析出标签
    fn parse(&self, body: &str, apex: &str) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            ScrapeSource::CertTransparency => parse_cert_transparency(body, apex),
            ScrapeSource::PassiveDns => Ok(parse_passive_dns(body, apex)),
            ScrapeSource::ThreatIntel => parse_threat_intel(body, apex),
        }
    }
}

/// 网络层瞬时故障才值得重试，解析错误不算
fn is_transient(err: &Box<dyn std::error::Error + Send + Sync>) -> bool {
    err.downcast_ref::<reqwest::Error>()
        .map(|e| e.is_timeout() || e.is_connect() || e.is_request())
        .unwrap_or(false)
}

/// JSON数组，`name_value`字段内可能有多行域名，`*.`前缀要剥掉
fn parse_cert_transparency(
    body: &str,
    apex: &str,
) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
    let entries: Vec<CrtShEntry> = serde_json::from_str(body)?;
    let mut labels = Vec::new();
    for entry in &entries {
        for name in entry.name_value.split('\n') {
            let name = name.trim().trim_start_matches("*.");
            if let Some(label) = strip_apex_suffix(name, apex) {
                labels.push(label);
            }
        }
    }
    Ok(labels)
}

/// 每行一条`host,ip`
fn parse_passive_dns(body: &str, apex: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| {
            let (host, _ip) = line.split_once(',')?;
            strip_apex_suffix(host.trim(), apex)
        })
        .collect()
}

/// JSON对象，`subdomains`数组
fn parse_threat_intel(body: &str, apex: &str) -> Result<Vec<String>, Box<dyn std::error::Error + Send + Sync>> {
    let report: ThreatIntelReport = serde_json::from_str(body)?;
    Ok(report
        .subdomains
        .iter()
        .filter_map(|host| strip_apex_suffix(host.trim(), apex))
        .collect())
}

/// 把一个源返回的标签去重入库，返回其中的新标签数
///
/// 字典里本来就有的标签按字典来源入库，也不算"新"：
/// 反正暴破阶段一定会探测它，只有字典之外的标签才是抓取的增量
pub fn ingest_scraped_labels(
    store: &LabelStore,
    wordlist: &HashSet<&str>,
    labels: &[String],
) -> usize {
    let mut added = 0;
    for label in labels {
        let folded = label.trim().trim_end_matches('.').to_lowercase();
        let in_wordlist = wordlist.contains(folded.as_str());
        let provenance = if in_wordlist {
            Provenance::Wordlist
        } else {
            Provenance::Scrape
        };
        if store.add(label, provenance) && !in_wordlist {
            added += 1;
        }
    }
    added
}

/// 只保留以`.<apex>`结尾的主机名，截掉后缀得到标签
fn strip_apex_suffix(host: &str, apex: &str) -> Option<String> {
    let host = host.trim_end_matches('.').to_lowercase();
    let suffix = format!(".{}", apex);
    let label = host.strip_suffix(suffix.as_str())?;
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}
