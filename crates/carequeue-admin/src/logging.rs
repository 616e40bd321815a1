//! 日志初始化
//!
//! 安装全局 `tracing` 订阅者：过滤级别取自配置，`RUST_LOG` 存在时优先。

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 初始化全局日志订阅者
///
/// 返回是否由本次调用完成安装；已安装过订阅者时不做任何改变并返回 `Ok(false)`。
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level: {}", config.level))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::info!(
            "Logging initialized (level={}, json={})",
            config.level,
            config.json
        );
    }
    Ok(installed)
}
