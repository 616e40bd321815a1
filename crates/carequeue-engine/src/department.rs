//! 科室注册表
//!
//! 保存各科室的等待基线与负载信息，按注册顺序稳定展示

use carequeue_core::utils::is_valid_identifier;
use carequeue_core::{Department, QueueError, Result};
use std::collections::HashMap;

/// 科室注册表
#[derive(Debug, Default)]
pub struct DepartmentRegistry {
    departments: Vec<Department>,
    index: HashMap<String, usize>, // department_id -> 位置
}

impl DepartmentRegistry {
    /// 创建新的科室注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册科室
    pub fn register(&mut self, mut department: Department) -> Result<()> {
        if !is_valid_identifier(&department.id) {
            return Err(QueueError::Validation(format!(
                "Invalid department id: '{}'",
                department.id
            )));
        }
        if self.index.contains_key(&department.id) {
            return Err(QueueError::Validation(format!(
                "Department {} already registered",
                department.id
            )));
        }
        if department.average_wait_minutes == 0 {
            return Err(QueueError::Validation(format!(
                "Department {} must have a positive average wait",
                department.id
            )));
        }
        if department.current_load_percent > 100 {
            return Err(QueueError::Validation(format!(
                "Department {} load {}% exceeds 100%",
                department.id, department.current_load_percent
            )));
        }

        department.waiting_count = 0;
        self.index.insert(department.id.clone(), self.departments.len());
        tracing::info!("Registered department {} ({})", department.id, department.name);
        self.departments.push(department);
        Ok(())
    }

    /// 获取科室
    pub fn get(&self, department_id: &str) -> Result<&Department> {
        self.index
            .get(department_id)
            .map(|&idx| &self.departments[idx])
            .ok_or_else(|| QueueError::NotFound(format!("Department {} not found", department_id)))
    }

    /// 按注册顺序列出所有科室
    pub fn list(&self) -> &[Department] {
        &self.departments
    }

    /// 更新科室负载，仅供展示，不参与排序
    pub fn update_load(&mut self, department_id: &str, percent: u8) -> Result<()> {
        if percent > 100 {
            return Err(QueueError::Validation(format!(
                "Load {}% is outside 0-100",
                percent
            )));
        }

        let idx = *self
            .index
            .get(department_id)
            .ok_or_else(|| QueueError::NotFound(format!("Department {} not found", department_id)))?;
        let department = &mut self.departments[idx];
        let old_load = department.current_load_percent;
        department.current_load_percent = percent;

        tracing::info!(
            "Updated department {} load from {}% to {}%",
            department_id,
            old_load,
            percent
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.departments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
    }
}
