//! 内置子域名字典
//!
//! 字典以文本资源形式打包进二进制，一行一个标签，
//! 空行与`#`开头的注释行会被忽略。

use lazy_static::lazy_static;

static RAW_WORDLIST: &str = include_str!("../data/wordlist.txt");

lazy_static! {
    static ref SUB_DATA: Vec<&'static str> = RAW_WORDLIST
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();
}

/// 获取内置字典的全部标签
pub fn get_default_sub_data() -> &'static [&'static str] {
    &SUB_DATA
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wordlist_not_empty() {
        let data = get_default_sub_data();
        assert!(data.len() > 500);
        assert!(data.contains(&"www"));
        assert!(data.contains(&"mail"));
    }

    #[test]
    fn test_wordlist_clean() {
        for label in get_default_sub_data() {
            assert!(!label.is_empty());
            assert!(!label.starts_with('#'));
            assert_eq!(*label, label.trim());
            assert_eq!(*label, label.to_lowercase().as_str());
        }
    }

    #[test]
    fn test_wordlist_restartable() {
        // 两次遍历得到相同序列
        let first: Vec<_> = get_default_sub_data().iter().collect();
        let second: Vec<_> = get_default_sub_data().iter().collect();
        assert_eq!(first, second);
    }
}
