//! 患者注册表
//!
//! 保存患者身份及当前队列快照。快照字段只允许调度器写入，
//! 外部调用方只能读取。

use carequeue_core::utils::is_valid_identifier;
use carequeue_core::{Patient, PatientStatus, QueueError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 患者列表过滤器
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientFilter {
    pub status: Option<PatientStatus>,
    pub department_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for PatientFilter {
    fn default() -> Self {
        Self {
            status: None,
            department_id: None,
            limit: Some(50),
            offset: Some(0),
        }
    }
}

/// 分页查询结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientPage {
    pub patients: Vec<Patient>,
    /// 分页前匹配过滤条件的总人数
    pub total: usize,
}

/// 各状态人数统计
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub none: usize,
    pub waiting: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
}

/// 患者注册表
#[derive(Debug, Default)]
pub struct PatientRegistry {
    patients: HashMap<String, Patient>,
    order: Vec<String>, // 注册顺序
}

impl PatientRegistry {
    /// 创建新的患者注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建患者，初始状态为 `none`
    pub fn create(&mut self, patient_id: &str, name: &str) -> Result<Patient> {
        if !is_valid_identifier(patient_id) {
            return Err(QueueError::Validation(format!("Invalid patient id: '{}'", patient_id)));
        }
        if name.trim().is_empty() {
            return Err(QueueError::Validation("Patient name cannot be empty".to_string()));
        }
        if self.patients.contains_key(patient_id) {
            return Err(QueueError::Validation(format!(
                "Patient {} already exists",
                patient_id
            )));
        }

        let patient = Patient::new(patient_id, name.trim());
        self.patients.insert(patient_id.to_string(), patient.clone());
        self.order.push(patient_id.to_string());

        tracing::info!("Created patient {}", patient_id);
        Ok(patient)
    }

    /// 获取患者
    pub fn get(&self, patient_id: &str) -> Result<&Patient> {
        self.patients
            .get(patient_id)
            .ok_or_else(|| QueueError::NotFound(format!("Patient {} not found", patient_id)))
    }

    /// 写入调度器计算出的快照字段
    pub(crate) fn set_snapshot<F>(&mut self, patient_id: &str, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Patient),
    {
        let patient = self
            .patients
            .get_mut(patient_id)
            .ok_or_else(|| QueueError::NotFound(format!("Patient {} not found", patient_id)))?;
        apply(patient);
        patient.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// 按注册顺序查询患者
    pub fn list(&self, filter: &PatientFilter) -> PatientPage {
        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);

        let matching: Vec<&Patient> = self
            .order
            .iter()
            .filter_map(|id| self.patients.get(id))
            .filter(|patient| filter.status.map_or(true, |status| patient.status == status))
            .filter(|patient| {
                filter
                    .department_id
                    .as_ref()
                    .map_or(true, |dept| patient.department.as_ref() == Some(dept))
            })
            .collect();

        PatientPage {
            total: matching.len(),
            patients: matching.into_iter().skip(offset).take(limit).cloned().collect(),
        }
    }

    /// 指定状态的患者ID，按注册顺序
    pub fn ids_with_status(&self, status: PatientStatus) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.patients.get(*id).map_or(false, |p| p.status == status))
            .cloned()
            .collect()
    }

    /// 统计各状态人数
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            total: self.patients.len(),
            ..Default::default()
        };

        for patient in self.patients.values() {
            match patient.status {
                PatientStatus::None => counts.none += 1,
                PatientStatus::Waiting => counts.waiting += 1,
                PatientStatus::InProgress => counts.in_progress += 1,
                PatientStatus::Completed => counts.completed += 1,
                PatientStatus::Cancelled => counts.cancelled += 1,
            }
        }

        counts
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }
}
