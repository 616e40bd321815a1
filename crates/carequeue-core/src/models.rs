//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QueueError;

/// 就诊优先级
///
/// 排序按 `rank()` 升序：急诊最先，低优先级最后。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Emergency, // 急诊
    High,      // 高
    Medium,    // 中
    Low,       // 低
}

impl Priority {
    /// 优先级排名，数值越小越靠前
    pub fn rank(&self) -> u8 {
        match self {
            Self::Emergency => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }

    /// 等待时间估算中的优先级系数
    pub fn wait_multiplier(&self) -> f64 {
        match self {
            Self::Emergency => 0.3,
            Self::High => 0.7,
            Self::Medium => 1.0,
            Self::Low => 1.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// 所有优先级，按排名顺序
    pub fn all() -> [Priority; 4] {
        [Self::Emergency, Self::High, Self::Medium, Self::Low]
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = QueueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "emergency" => Ok(Self::Emergency),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(QueueError::InvalidPriority(format!(
                "'{}' (must be one of: low, medium, high, emergency)",
                value
            ))),
        }
    }
}

/// 患者队列状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PatientStatus {
    #[default]
    None,       // 未排队
    Waiting,    // 候诊中
    InProgress, // 就诊中
    Completed,  // 已完成
    Cancelled,  // 已取消
}

impl PatientStatus {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// 是否持有活跃的队列条目
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatientStatus {
    type Err = QueueError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "waiting" => Ok(Self::Waiting),
            "in-progress" | "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(QueueError::Validation(format!("Unknown patient status: {}", value))),
        }
    }
}

/// 科室信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub average_wait_minutes: u32,               // 平均等待基线（分钟）
    pub current_load_percent: u8,                // 当前负载（0-100，仅供展示）
    pub fast_track_ceiling_minutes: Option<u32>, // 快速通道上限
    pub waiting_count: usize,                    // 候诊人数（派生）
}

impl Department {
    pub fn new(id: impl Into<String>, name: impl Into<String>, average_wait_minutes: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            average_wait_minutes,
            current_load_percent: 0,
            fast_track_ceiling_minutes: None,
            waiting_count: 0,
        }
    }

    pub fn with_load(mut self, current_load_percent: u8) -> Self {
        self.current_load_percent = current_load_percent;
        self
    }

    /// 标记为急诊接诊科室，等待时间不超过给定上限
    pub fn with_fast_track_ceiling(mut self, minutes: u32) -> Self {
        self.fast_track_ceiling_minutes = Some(minutes);
        self
    }
}

/// 患者信息及其当前队列快照
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub department: Option<String>,
    pub priority: Option<Priority>,
    pub status: PatientStatus,
    pub arrival_time: Option<DateTime<Utc>>,
    pub queue_position: Option<usize>,         // 派生，仅候诊时存在
    pub estimated_wait_minutes: Option<u32>,   // 派生，仅候诊时存在
    pub service_started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            department: None,
            priority: None,
            status: PatientStatus::None,
            arrival_time: None,
            queue_position: None,
            estimated_wait_minutes: None,
            service_started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 队列条目：将一名患者绑定到一个科室
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub patient_id: String,
    pub department_id: String,
    pub priority: Priority,
    pub arrival_time: DateTime<Utc>,
    pub position: usize,
    pub estimated_wait_minutes: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let ranks: Vec<u8> = Priority::all().iter().map(|p| p.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("Emergency".parse::<Priority>().unwrap(), Priority::Emergency);
        assert_eq!(" low ".parse::<Priority>().unwrap(), Priority::Low);

        let err = "urgent".parse::<Priority>().unwrap_err();
        assert_eq!(err.kind(), "invalid_priority");
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&PatientStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        assert!(PatientStatus::Completed.is_terminal());
        assert!(!PatientStatus::Waiting.is_terminal());
        assert!(PatientStatus::InProgress.is_active());
    }

    #[test]
    fn test_new_patient_is_unqueued() {
        let patient = Patient::new("P001", "John Smith");
        assert_eq!(patient.status, PatientStatus::None);
        assert!(patient.department.is_none());
        assert!(patient.priority.is_none());
        assert!(patient.queue_position.is_none());
        assert!(patient.estimated_wait_minutes.is_none());
    }
}
