//! 候选标签集合
//!
//! 去重的有序标签仓库。抓取源与字典装载都通过`add`写入，
//! 暴破dispatcher通过`iter`按插入顺序消费；迭代不是快照式的，
//! 消费开始之后新插入的标签依然会被派发。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::model::Provenance;

#[derive(Debug)]
struct StoreInner {
    seen: HashSet<String>,
    order: Vec<(String, Provenance)>,
    closed: bool,
}

/// 候选标签仓库
#[derive(Clone)]
pub struct LabelStore {
    apex: String,
    inner: Arc<Mutex<StoreInner>>,
    notify: Arc<Notify>,
}

impl LabelStore {
    /// 为指定apex创建空仓库
    pub fn new(apex: &str) -> Self {
        LabelStore {
            apex: apex.to_string(),
            inner: Arc::new(Mutex::new(StoreInner {
                seen: HashSet::new(),
                order: Vec::new(),
                closed: false,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// 仓库所属的apex域名
    pub fn apex(&self) -> &str {
        &self.apex
    }

    /// 插入一个标签，返回是否为新条目
    ///
    /// 大小写折叠并去掉末尾的点；空标签、与apex相同的标签
    /// 以及含非法字符的标签一律拒绝
    pub fn add(&self, label: &str, provenance: Provenance) -> bool {
        let label = label.trim().trim_end_matches('.').to_lowercase();
        if label.is_empty() || label == self.apex {
            return false;
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return false;
        }

        let inserted = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.seen.insert(label.clone()) {
                false
            } else {
                inner.order.push((label, provenance));
                true
            }
        };
        if inserted {
            self.notify.notify_one();
        }
        inserted
    }

    /// 当前标签数量
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    /// 仓库是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 声明生产者全部结束，耗尽后迭代器将终止
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_one();
    }

    /// 按插入顺序迭代，支持边插入边消费
    pub fn iter(&self) -> LabelIter {
        LabelIter {
            store: self.clone(),
            cursor: 0,
        }
    }
}

/// `LabelStore`的游标式迭代器
pub struct LabelIter {
    store: LabelStore,
    cursor: usize,
}

impl LabelIter {
    /// 取下一个标签；生产者关闭且耗尽后返回`None`
    pub async fn next(&mut self) -> Option<(String, Provenance)> {
        loop {
            // 先注册唤醒，再检查条件，避免丢失通知
            let notify = self.store.notify.clone();
            let notified = notify.notified();
            {
                let inner = self.store.inner.lock().unwrap();
                if self.cursor < inner.order.len() {
                    let item = inner.order[self.cursor].clone();
                    self.cursor += 1;
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_dedup_and_fold() {
        let store = LabelStore::new("example.com");
        assert!(store.add("www", Provenance::Wordlist));
        // 大小写与末尾点折叠后视为同一标签
        assert!(!store.add("WWW", Provenance::Wordlist));
        assert!(!store.add("www.", Provenance::Scrape));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_rejects_invalid() {
        let store = LabelStore::new("example.com");
        assert!(!store.add("", Provenance::Wordlist));
        assert!(!store.add("   ", Provenance::Wordlist));
        assert!(!store.add("example.com", Provenance::Scrape));
        assert!(!store.add("bad label", Provenance::Scrape));
        assert!(store.is_empty());
    }

    #[test]
    fn test_multi_component_label() {
        let store = LabelStore::new("example.com");
        assert!(store.add("a.b", Provenance::Scrape));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let store = LabelStore::new("example.com");
        store.add("mail", Provenance::Scrape);
        store.add("api", Provenance::Wordlist);
        store.add("mail", Provenance::Wordlist);
        store.add("web", Provenance::Wordlist);
        store.close();

        let mut seen = Vec::new();
        let mut iter = store.iter();
        futures_block_on(async {
            while let Some((label, _)) = iter.next().await {
                seen.push(label);
            }
        });
        assert_eq!(seen, vec!["mail", "api", "web"]);
    }

    #[test]
    fn test_first_provenance_wins() {
        let store = LabelStore::new("example.com");
        store.add("api", Provenance::Scrape);
        store.add("api", Provenance::Wordlist);
        store.close();

        let mut iter = store.iter();
        futures_block_on(async {
            let (label, provenance) = iter.next().await.unwrap();
            assert_eq!(label, "api");
            assert_eq!(provenance, Provenance::Scrape);
        });
    }

    #[tokio::test]
    async fn test_live_iteration() {
        let store = LabelStore::new("example.com");
        let mut iter = store.iter();

        let producer = store.clone();
        let handle = tokio::spawn(async move {
            for i in 0..32 {
                producer.add(&format!("sub{}", i), Provenance::Wordlist);
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
            producer.close();
        });

        let mut count = 0;
        while let Some((label, _)) = iter.next().await {
            assert_eq!(label, format!("sub{}", count));
            count += 1;
        }
        assert_eq!(count, 32);
        handle.await.unwrap();
    }

    // 小工具：在非tokio测试里驱动一个立即就绪的future
    fn futures_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
