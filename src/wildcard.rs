use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use rand::Rng;
use trust_dns_resolver::TokioAsyncResolver;

/// 泛解析检测器
///
/// 暴破开始前用随机标签探测apex；若随机域名稳定解析到同一组IP，
/// 则认为存在泛解析，命中该IP组的应答不再算作确认结果
pub struct WildcardDetector {
    ips: HashSet<IpAddr>,
}

impl WildcardDetector {
    /// 不做任何过滤的空检测器
    pub fn empty() -> Self {
        WildcardDetector { ips: HashSet::new() }
    }

    /// 用随机标签探测apex是否存在泛解析
    pub async fn detect(resolver: &TokioAsyncResolver, apex: &str, timeout: Duration) -> Self {
        let mut answer_sets: Vec<HashSet<IpAddr>> = Vec::new();
        for label in Self::random_labels(3) {
            let fq = format!("{}.{}", label, apex);
            match tokio::time::timeout(timeout, resolver.lookup_ip(fq.as_str())).await {
                Ok(Ok(response)) => {
                    let ips: HashSet<IpAddr> = response.iter().collect();
                    if !ips.is_empty() {
                        answer_sets.push(ips);
                    }
                }
                // 随机域名解析不了，说明没有泛解析
                _ => continue,
            }
        }

        let mut ips = HashSet::new();
        if answer_sets.len() >= 2 && answer_sets.iter().all(|set| *set == answer_sets[0]) {
            ips = answer_sets.swap_remove(0);
        }
        WildcardDetector { ips }
    }

    /// apex是否存在泛解析
    pub fn is_wildcard(&self) -> bool {
        !self.ips.is_empty()
    }

    /// 一组应答是否全部落在泛解析IP内
    pub fn matches(&self, addrs: &[IpAddr]) -> bool {
        !self.ips.is_empty() && !addrs.is_empty() && addrs.iter().all(|a| self.ips.contains(a))
    }

    /// 泛解析IP列表（有序，便于打印）
    pub fn ips(&self) -> Vec<IpAddr> {
        let mut ips: Vec<IpAddr> = self.ips.iter().copied().collect();
        ips.sort();
        ips
    }

    fn random_labels(count: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                (0..10)
                    .map(|_| {
                        let chars = b"abcdefghijklmnopqrstuvwxyz0123456789";
                        chars[rng.gen_range(0..chars.len())] as char
                    })
                    .collect()
            })
            .collect()
    }

    #[cfg(test)]
    fn with_ips(ips: &[IpAddr]) -> Self {
        WildcardDetector {
            ips: ips.iter().copied().collect(),
        }
    }
}
