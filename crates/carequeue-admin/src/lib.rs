//! # 候诊队列运维模块
//!
//! 提供配置加载与验证、日志初始化

pub mod config;
pub mod logging;

pub use config::{
    CareQueueConfig, ConfigManager, ConfigValidator, DepartmentSettings, EngineSettings,
    LoggingConfig, ServerConfig, SimulationSettings,
};
pub use logging::init_logging;
