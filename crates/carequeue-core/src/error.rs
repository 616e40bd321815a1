//! 错误定义模块

use thiserror::Error;

/// 候诊队列系统统一错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("患者已在队列中: {0}")]
    AlreadyQueued(String),

    #[error("无效优先级: {0}")]
    InvalidPriority(String),

    #[error("未知科室: {0}")]
    UnknownDepartment(String),

    #[error("无效状态转换: 从 {from} 执行 {action}")]
    IllegalTransition { from: String, action: String },

    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("读取超时: {0}")]
    Timeout(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl QueueError {
    /// 稳定的机器可读错误码，供外部协作方（HTTP层等）区分错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyQueued(_) => "already_queued",
            Self::InvalidPriority(_) => "invalid_priority",
            Self::UnknownDepartment(_) => "unknown_department",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

/// 候诊队列系统统一结果类型
pub type Result<T> = std::result::Result<T, QueueError>;
