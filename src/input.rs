use clap::Parser;
use lazy_static::lazy_static;
use regex::Regex;

#[derive(Parser, Debug)]
#[command(name = "rdnsmap")]
#[command(author = "gelenlen")]
#[command(version)]
#[command(about = "DNS Network Mapper - enumerate live subdomains of an apex domain", long_about = None, arg_required_else_help = true)]
pub struct Opts {
    /// apex domain to enumerate, e.g. example.com
    pub domain: String,
}

lazy_static! {
    // RFC 952/1123风格的主机名：至少两段，每段字母数字开头结尾
    static ref APEX_RE: Regex =
        Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$").unwrap();
}

/// 规范化并校验apex域名
///
/// 小写、去掉末尾的点；格式不合法时返回错误
pub fn normalize_apex(input: &str) -> Result<String, String> {
    let apex = input.trim().trim_end_matches('.').to_lowercase();
    if apex.is_empty() {
        return Err("apex domain required, e.g. rdnsmap example.com".to_string());
    }
    if !APEX_RE.is_match(&apex) {
        return Err(format!("apex domain must be like example.com, got: {}", input.trim()));
    }
    Ok(apex)
}
