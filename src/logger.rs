use log::LevelFilter;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

/// 初始化stderr诊断日志
///
/// stdout是结果通道，诊断日志一律走stderr
pub fn init_logger() {
    let _ = TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}
