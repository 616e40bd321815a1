//! 队列引擎
//!
//! 面向外部协作方（预约界面、护士站、聊天助手、通知层）的统一操作入口，
//! 读取操作带超时，避免引擎卡顿时调用方被无限期挂起。

use carequeue_core::utils::generate_patient_id;
use carequeue_core::{
    Department, Patient, PatientStatus, Priority, QueueEntry, QueueError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::notification::{NotificationHub, Subscription, SubscriptionTopic};
use crate::patient::{PatientFilter, PatientPage, StatusCounts};
use crate::scheduler::{InServiceRow, QueueScheduler, SnapshotRow};

/// 引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 客户端读取超时
    pub read_timeout: Duration,
    /// 每个订阅者的事件缓冲上限
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(2000),
            notification_capacity: 256,
        }
    }
}

/// 患者状态视图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientStatusView {
    pub patient_id: String,
    pub name: String,
    pub status: PatientStatus,
    pub department: Option<String>,
    pub priority: Option<Priority>,
    pub position: Option<usize>,
    pub estimated_wait_minutes: Option<u32>,
    pub service_started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Patient> for PatientStatusView {
    fn from(patient: Patient) -> Self {
        Self {
            patient_id: patient.id,
            name: patient.name,
            status: patient.status,
            department: patient.department,
            priority: patient.priority,
            position: patient.queue_position,
            estimated_wait_minutes: patient.estimated_wait_minutes,
            service_started_at: patient.service_started_at,
            finished_at: patient.finished_at,
        }
    }
}

/// 科室候诊列表中的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartmentQueueRow {
    pub patient_id: String,
    pub name: String,
    pub priority: Priority,
    pub position: usize,
    pub estimated_wait_minutes: u32,
}

/// 科室就诊中列表的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InProgressRow {
    pub patient_id: String,
    pub name: String,
    pub priority: Option<Priority>,
    pub started_at: DateTime<Utc>,
}

/// 科室统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartmentStats {
    pub department_id: String,
    pub name: String,
    pub waiting_count: usize,
    pub in_progress_count: usize,
    pub average_wait_minutes: u32,
    pub current_load_percent: u8,
    pub fast_track_ceiling_minutes: Option<u32>,
}

/// 队列总体统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub patients: StatusCounts,
    pub average_department_wait_minutes: u32,
    pub departments: Vec<DepartmentStats>,
}

/// 队列引擎
#[derive(Debug, Clone)]
pub struct QueueEngine {
    scheduler: Arc<QueueScheduler>,
    read_timeout: Duration,
}

impl QueueEngine {
    /// 创建新的队列引擎
    pub fn new(config: EngineConfig) -> Self {
        let hub = NotificationHub::new(config.notification_capacity);
        Self {
            scheduler: Arc::new(QueueScheduler::new(hub)),
            read_timeout: config.read_timeout,
        }
    }

    /// 注册科室
    pub async fn register_department(&self, department: Department) -> Result<()> {
        self.scheduler.register_department(department).await
    }

    /// 登记患者
    pub async fn register_patient(&self, patient_id: &str, name: &str) -> Result<Patient> {
        self.scheduler.create_patient(patient_id, name).await
    }

    /// 登记并直接预约（护士站"添加患者"）
    ///
    /// 入队失败时患者保留为 `none` 状态。
    pub async fn admit_patient(
        &self,
        name: &str,
        department_id: &str,
        priority: &str,
    ) -> Result<QueueEntry> {
        let priority: Priority = priority.parse()?;
        let patient_id = generate_patient_id();
        self.scheduler.create_patient(&patient_id, name).await?;
        self.scheduler.enqueue(&patient_id, department_id, priority).await
    }

    /// 预约就诊
    pub async fn book_appointment(
        &self,
        patient_id: &str,
        department_id: &str,
        priority: &str,
    ) -> Result<QueueEntry> {
        let priority: Priority = priority.parse()?;
        self.scheduler.enqueue(patient_id, department_id, priority).await
    }

    /// 取消预约
    pub async fn cancel_appointment(&self, patient_id: &str) -> Result<()> {
        self.scheduler.cancel(patient_id).await
    }

    /// 护士站推进患者状态
    pub async fn staff_advance_patient(&self, patient_id: &str) -> Result<Patient> {
        self.scheduler.advance(patient_id).await
    }

    /// 查询患者状态
    pub async fn get_patient_status(&self, patient_id: &str) -> Result<PatientStatusView> {
        let patient = self.with_deadline("patient status", self.scheduler.patient(patient_id)).await?;
        Ok(patient.into())
    }

    /// 查询科室候诊列表（展示顺序）
    pub async fn get_department_snapshot(&self, department_id: &str) -> Result<Vec<DepartmentQueueRow>> {
        let rows = self.snapshot(department_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| DepartmentQueueRow {
                priority: row.priority,
                patient_id: row.patient.id,
                name: row.patient.name,
                position: row.position,
                estimated_wait_minutes: row.estimated_wait_minutes,
            })
            .collect())
    }

    /// 当前排名
    pub async fn position(&self, patient_id: &str) -> Result<usize> {
        self.with_deadline("position", self.scheduler.position(patient_id)).await
    }

    /// 当前预计等待分钟数
    pub async fn eta(&self, patient_id: &str) -> Result<u32> {
        self.with_deadline("eta", self.scheduler.eta(patient_id)).await
    }

    /// 科室候诊快照
    pub async fn snapshot(&self, department_id: &str) -> Result<Vec<SnapshotRow>> {
        self.with_deadline("snapshot", self.scheduler.snapshot(department_id)).await
    }

    /// 科室就诊中患者
    pub async fn in_progress(&self, department_id: &str) -> Result<Vec<InProgressRow>> {
        let rows: Vec<InServiceRow> = self
            .with_deadline("in-progress board", self.scheduler.in_service(department_id))
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| InProgressRow {
                patient_id: row.patient.id,
                name: row.patient.name,
                priority: row.patient.priority,
                started_at: row.started_at,
            })
            .collect())
    }

    /// 获取科室
    pub async fn get_department(&self, department_id: &str) -> Result<Department> {
        self.with_deadline("department", self.scheduler.department(department_id)).await
    }

    /// 列出科室
    pub async fn list_departments(&self) -> Result<Vec<Department>> {
        self.with_deadline("departments", self.scheduler.departments()).await
    }

    /// 更新科室负载
    pub async fn update_department_load(&self, department_id: &str, percent: u8) -> Result<()> {
        self.scheduler.update_load(department_id, percent).await
    }

    /// 查询患者列表
    pub async fn list_patients(&self, filter: &PatientFilter) -> Result<PatientPage> {
        let patients = self.scheduler.list_patients(filter);
        self.with_deadline("patient list", async { Ok::<_, QueueError>(patients.await) })
            .await
    }

    /// 指定状态的患者ID
    pub async fn patient_ids_with_status(&self, status: PatientStatus) -> Vec<String> {
        self.scheduler.patient_ids_with_status(status).await
    }

    /// 科室统计
    pub async fn department_stats(&self, department_id: &str) -> Result<DepartmentStats> {
        let department = self.scheduler.department(department_id).await?;
        let (_, in_progress_count) = self.scheduler.queue_counts(department_id).await?;
        Ok(Self::to_stats(department, in_progress_count))
    }

    /// 队列总体统计
    pub async fn stats(&self) -> Result<QueueStats> {
        let patients = self.scheduler.status_counts().await;
        let departments = self.scheduler.departments().await?;

        let average_department_wait_minutes = if departments.is_empty() {
            0
        } else {
            let total: u32 = departments.iter().map(|d| d.average_wait_minutes).sum();
            (f64::from(total) / departments.len() as f64).round() as u32
        };

        let mut department_stats = Vec::with_capacity(departments.len());
        for department in departments {
            let (_, in_progress_count) = self.scheduler.queue_counts(&department.id).await?;
            department_stats.push(Self::to_stats(department, in_progress_count));
        }

        Ok(QueueStats {
            patients,
            average_department_wait_minutes,
            departments: department_stats,
        })
    }

    /// 订阅患者或科室的变更事件
    pub fn subscribe(&self, topic: SubscriptionTopic) -> Subscription {
        self.scheduler.subscribe(topic)
    }

    /// 获取调度器实例
    pub fn scheduler(&self) -> &QueueScheduler {
        &self.scheduler
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    fn to_stats(department: Department, in_progress_count: usize) -> DepartmentStats {
        DepartmentStats {
            department_id: department.id,
            name: department.name,
            waiting_count: department.waiting_count,
            in_progress_count,
            average_wait_minutes: department.average_wait_minutes,
            current_load_percent: department.current_load_percent,
            fast_track_ceiling_minutes: department.fast_track_ceiling_minutes,
        }
    }

    async fn with_deadline<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.read_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Read of {} timed out after {:?}", what, self.read_timeout);
                Err(QueueError::Timeout(format!(
                    "{} not available within {:?}",
                    what, self.read_timeout
                )))
            }
        }
    }
}

impl Default for QueueEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn engine() -> QueueEngine {
        let engine = QueueEngine::default();
        engine
            .register_department(Department::new("emergency", "Emergency", 30).with_fast_track_ceiling(5))
            .await
            .unwrap();
        engine
            .register_department(Department::new("radiology", "Radiology", 40).with_load(40))
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_book_with_invalid_priority() {
        let engine = engine().await;
        engine.register_patient("P1", "John Smith").await.unwrap();

        let err = engine.book_appointment("P1", "radiology", "urgent").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_priority");
        assert_eq!(
            engine.get_patient_status("P1").await.unwrap().status,
            PatientStatus::None
        );
    }

    #[tokio::test]
    async fn test_patient_status_view() {
        let engine = engine().await;
        engine.register_patient("P1", "John Smith").await.unwrap();
        engine.book_appointment("P1", "radiology", "high").await.unwrap();

        let view = engine.get_patient_status("P1").await.unwrap();
        assert_eq!(view.status, PatientStatus::Waiting);
        assert_eq!(view.department.as_deref(), Some("radiology"));
        assert_eq!(view.priority, Some(Priority::High));
        assert_eq!(view.position, Some(1));
        assert_eq!(view.estimated_wait_minutes, Some(28));
    }

    #[tokio::test]
    async fn test_fast_track_department() {
        let engine = engine().await;
        for i in 0..6 {
            let entry = engine
                .admit_patient(&format!("Patient {}", i), "emergency", "low")
                .await
                .unwrap();
            assert!(entry.estimated_wait_minutes <= 5);
        }

        let rows = engine.get_department_snapshot("emergency").await.unwrap();
        assert_eq!(rows.len(), 6);
        assert!(rows.iter().all(|row| row.estimated_wait_minutes == 5));
    }

    #[tokio::test]
    async fn test_admit_rejects_bad_input_before_creating() {
        let engine = engine().await;
        assert!(engine.admit_patient("Jane", "radiology", "asap").await.is_err());

        let err = engine.admit_patient("Jane", "oncology", "low").await.unwrap_err();
        assert_eq!(err.kind(), "unknown_department");

        let unqueued = engine
            .list_patients(&PatientFilter {
                status: Some(PatientStatus::None),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(unqueued.total, 1);
        assert_eq!(unqueued.patients[0].name, "Jane");
    }

    #[tokio::test]
    async fn test_in_progress_board_and_stats() {
        let engine = engine().await;
        let a = engine.admit_patient("Alice", "radiology", "medium").await.unwrap();
        engine.admit_patient("Bob", "radiology", "low").await.unwrap();
        engine.admit_patient("Cara", "emergency", "emergency").await.unwrap();

        engine.staff_advance_patient(&a.patient_id).await.unwrap();

        let board = engine.in_progress("radiology").await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].name, "Alice");

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.patients.total, 3);
        assert_eq!(stats.patients.waiting, 2);
        assert_eq!(stats.patients.in_progress, 1);
        assert_eq!(stats.average_department_wait_minutes, 35);

        let radiology = engine.department_stats("radiology").await.unwrap();
        assert_eq!(radiology.waiting_count, 1);
        assert_eq!(radiology.in_progress_count, 1);
        assert_eq!(radiology.current_load_percent, 40);
    }

    #[tokio::test]
    async fn test_update_department_load() {
        let engine = engine().await;
        engine.update_department_load("radiology", 90).await.unwrap();
        let department = engine.get_department("radiology").await.unwrap();
        assert_eq!(department.current_load_percent, 90);
        assert!(engine.update_department_load("radiology", 120).await.is_err());
    }
}
