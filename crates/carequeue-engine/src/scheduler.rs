//! 队列调度器
//!
//! 持有科室注册表、患者注册表和各科室的有序候诊队列，执行入队、取消、推进，
//! 并在每次变更后同步重新计算受影响科室的排名与等待时间。
//!
//! 锁顺序：科室队列互斥锁 → 科室注册表 → 患者注册表。排名在科室互斥锁下算好，
//! 患者注册表写锁只用于写入快照，读取方不会看到排名重算的中间状态。
//!
//! 活跃患者的状态只在其所在科室的互斥锁下改变，因此取消和推进在持有该锁时
//! 用读锁做的校验一直有效。入队涉及的患者不在任何科室，校验须在写锁内重做。

use carequeue_core::{
    Department, Patient, PatientStatus, Priority, QueueEntry, QueueError, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::department::DepartmentRegistry;
use crate::notification::{NotificationHub, QueueEvent, QueueEventType, Subscription, SubscriptionTopic};
use crate::patient::{PatientFilter, PatientPage, PatientRegistry, StatusCounts};
use crate::queue::{DepartmentQueue, QueueSlot, RankChange};
use crate::state_machine::{QueueAction, QueueStateMachine};

/// 查找患者所在科室与加锁之间患者被并发移动时的重试上限
const MAX_LOOKUP_ATTEMPTS: usize = 3;

/// 科室候诊快照中的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotRow {
    pub patient: Patient,
    pub priority: Priority,
    pub position: usize,
    pub estimated_wait_minutes: u32,
}

/// 科室就诊中列表的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InServiceRow {
    pub patient: Patient,
    pub started_at: DateTime<Utc>,
}

type SharedQueue = Arc<Mutex<DepartmentQueue>>;

/// 队列调度器
#[derive(Debug)]
pub struct QueueScheduler {
    departments: RwLock<DepartmentRegistry>,
    patients: RwLock<PatientRegistry>,
    queues: RwLock<HashMap<String, SharedQueue>>,
    state_machine: QueueStateMachine,
    hub: NotificationHub,
    sequence: AtomicU64,
}

impl QueueScheduler {
    /// 创建新的调度器
    pub fn new(hub: NotificationHub) -> Self {
        Self {
            departments: RwLock::new(DepartmentRegistry::new()),
            patients: RwLock::new(PatientRegistry::new()),
            queues: RwLock::new(HashMap::new()),
            state_machine: QueueStateMachine::new(),
            hub,
            sequence: AtomicU64::new(0),
        }
    }

    /// 注册科室并为其创建候诊队列
    pub async fn register_department(&self, department: Department) -> Result<()> {
        let department_id = department.id.clone();
        let mut departments = self.departments.write().await;
        departments.register(department)?;

        self.queues.write().await.insert(
            department_id.clone(),
            Arc::new(Mutex::new(DepartmentQueue::new(department_id))),
        );
        Ok(())
    }

    /// 创建患者
    pub async fn create_patient(&self, patient_id: &str, name: &str) -> Result<Patient> {
        self.patients.write().await.create(patient_id, name)
    }

    /// 患者入队
    pub async fn enqueue(
        &self,
        patient_id: &str,
        department_id: &str,
        priority: Priority,
    ) -> Result<QueueEntry> {
        {
            let patients = self.patients.read().await;
            Self::ensure_not_queued(patients.get(patient_id)?)?;
        }

        let queue = self
            .queue_for(department_id)
            .await
            .ok_or_else(|| QueueError::UnknownDepartment(department_id.to_string()))?;
        let mut queue = queue.lock().await;

        let departments = self.departments.read().await;
        let department = departments
            .get(department_id)
            .map_err(|_| QueueError::UnknownDepartment(department_id.to_string()))?;

        // 上一次就诊已结束的患者开启新的条目
        let status = self.state_machine.transition(PatientStatus::None, QueueAction::Book)?;
        let arrival_time = Utc::now();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);

        queue.insert(QueueSlot::new(patient_id, priority, arrival_time, sequence));
        let changes = queue.rerank(department);

        let mut patients = self.patients.write().await;
        // 其他科室可能已抢先入队
        let recheck = patients.get(patient_id).and_then(Self::ensure_not_queued);
        if let Err(e) = recheck {
            drop(patients);
            queue.remove_waiting(patient_id);
            queue.rerank(department);
            debug!("Rolled back enqueue of {} in {}: {}", patient_id, department_id, e);
            return Err(e);
        }

        patients.set_snapshot(patient_id, |p| {
            p.department = Some(department_id.to_string());
            p.priority = Some(priority);
            p.status = status;
            p.arrival_time = Some(arrival_time);
            p.queue_position = None;
            p.estimated_wait_minutes = None;
            p.service_started_at = None;
            p.finished_at = None;
        })?;
        Self::apply_rank_changes(&mut patients, &changes)?;

        let slot = queue.slot(patient_id).ok_or_else(|| {
            QueueError::Internal(format!("Patient {} missing after enqueue", patient_id))
        })?;
        let entry = QueueEntry {
            patient_id: patient_id.to_string(),
            department_id: department_id.to_string(),
            priority,
            arrival_time,
            position: slot.position,
            estimated_wait_minutes: slot.estimated_wait_minutes,
        };
        drop(patients);
        drop(departments);

        self.hub.publish(
            QueueEvent::new(QueueEventType::Enqueued, patient_id, department_id, status)
                .with_rank(entry.position, entry.estimated_wait_minutes),
        );
        self.publish_rank_changes(department_id, &changes, Some(patient_id));

        info!(
            "Enqueued patient {} in {} with priority {} at position {} (eta {} min)",
            patient_id, department_id, priority, entry.position, entry.estimated_wait_minutes
        );
        Ok(entry)
    }

    /// 取消患者的活跃条目
    pub async fn cancel(&self, patient_id: &str) -> Result<()> {
        for _ in 0..MAX_LOOKUP_ATTEMPTS {
            let department_id = self.active_department(patient_id, QueueAction::Cancel).await?;
            let queue = self.queue_for(&department_id).await.ok_or_else(|| {
                QueueError::Internal(format!("Queue for department {} missing", department_id))
            })?;
            let mut queue = queue.lock().await;

            let departments = self.departments.read().await;
            let department = departments.get(&department_id)?;

            let (from, current_department) = {
                let patients = self.patients.read().await;
                let patient = patients.get(patient_id)?;
                self.check_entry(patient, QueueAction::Cancel)?;
                (patient.status, patient.department.clone())
            };
            if current_department.as_deref() != Some(department_id.as_str()) {
                debug!("Patient {} moved while cancelling, retrying", patient_id);
                continue;
            }

            let to = self.state_machine.transition(from, QueueAction::Cancel)?;
            let changes = if from == PatientStatus::Waiting {
                queue.remove_waiting(patient_id);
                queue.rerank(department)
            } else {
                queue.finish_service(patient_id);
                Vec::new()
            };

            let finished_at = Utc::now();
            let mut patients = self.patients.write().await;
            patients.set_snapshot(patient_id, |p| {
                p.status = to;
                p.department = None;
                p.priority = None;
                p.arrival_time = None;
                p.queue_position = None;
                p.estimated_wait_minutes = None;
                p.finished_at = Some(finished_at);
            })?;
            Self::apply_rank_changes(&mut patients, &changes)?;
            drop(patients);
            drop(departments);

            self.hub.publish(QueueEvent::new(
                QueueEventType::StatusChanged,
                patient_id,
                department_id.as_str(),
                to,
            ));
            self.publish_rank_changes(&department_id, &changes, None);

            info!(
                "Cancelled patient {} in {} (was {})",
                patient_id, department_id, from
            );
            return Ok(());
        }

        Err(QueueError::Internal(format!(
            "Patient {} changed department during cancel",
            patient_id
        )))
    }

    /// 推进患者状态：waiting → in-progress → completed
    pub async fn advance(&self, patient_id: &str) -> Result<Patient> {
        for _ in 0..MAX_LOOKUP_ATTEMPTS {
            let department_id = self.active_department(patient_id, QueueAction::Advance).await?;
            let queue = self.queue_for(&department_id).await.ok_or_else(|| {
                QueueError::Internal(format!("Queue for department {} missing", department_id))
            })?;
            let mut queue = queue.lock().await;

            let departments = self.departments.read().await;
            let department = departments.get(&department_id)?;

            let (from, current_department) = {
                let patients = self.patients.read().await;
                let patient = patients.get(patient_id)?;
                self.check_entry(patient, QueueAction::Advance)?;
                (patient.status, patient.department.clone())
            };
            if current_department.as_deref() != Some(department_id.as_str()) {
                debug!("Patient {} moved while advancing, retrying", patient_id);
                continue;
            }

            let to = self.state_machine.transition(from, QueueAction::Advance)?;
            let now = Utc::now();
            let changes = if from == PatientStatus::Waiting {
                let slot = queue.remove_waiting(patient_id).ok_or_else(|| {
                    QueueError::Internal(format!(
                        "Patient {} not found in {} queue",
                        patient_id, department_id
                    ))
                })?;
                queue.start_service(slot, now);
                queue.rerank(department)
            } else {
                queue.finish_service(patient_id);
                Vec::new()
            };

            let mut patients = self.patients.write().await;
            patients.set_snapshot(patient_id, |p| {
                p.status = to;
                p.queue_position = None;
                p.estimated_wait_minutes = None;
                if to == PatientStatus::InProgress {
                    p.service_started_at = Some(now);
                } else {
                    p.finished_at = Some(now);
                }
            })?;
            Self::apply_rank_changes(&mut patients, &changes)?;
            let updated = patients.get(patient_id)?.clone();
            drop(patients);
            drop(departments);

            self.hub.publish(QueueEvent::new(
                QueueEventType::StatusChanged,
                patient_id,
                department_id.as_str(),
                to,
            ));
            self.publish_rank_changes(&department_id, &changes, None);

            info!(
                "Advanced patient {} in {} from {} to {}",
                patient_id, department_id, from, to
            );
            return Ok(updated);
        }

        Err(QueueError::Internal(format!(
            "Patient {} changed department during advance",
            patient_id
        )))
    }

    /// 当前排名，仅候诊时有效
    pub async fn position(&self, patient_id: &str) -> Result<usize> {
        let patients = self.patients.read().await;
        let patient = patients.get(patient_id)?;
        match (patient.status, patient.queue_position) {
            (PatientStatus::Waiting, Some(position)) => Ok(position),
            _ => Err(Self::not_waiting(patient_id)),
        }
    }

    /// 当前预计等待分钟数，仅候诊时有效
    pub async fn eta(&self, patient_id: &str) -> Result<u32> {
        let patients = self.patients.read().await;
        let patient = patients.get(patient_id)?;
        match (patient.status, patient.estimated_wait_minutes) {
            (PatientStatus::Waiting, Some(eta)) => Ok(eta),
            _ => Err(Self::not_waiting(patient_id)),
        }
    }

    /// 科室候诊快照（展示顺序）
    pub async fn snapshot(&self, department_id: &str) -> Result<Vec<SnapshotRow>> {
        let queue = self.existing_queue(department_id).await?;
        let queue = queue.lock().await;
        let patients = self.patients.read().await;

        queue
            .waiting()
            .iter()
            .map(|slot| {
                Ok(SnapshotRow {
                    patient: patients.get(&slot.patient_id)?.clone(),
                    priority: slot.priority,
                    position: slot.position,
                    estimated_wait_minutes: slot.estimated_wait_minutes,
                })
            })
            .collect()
    }

    /// 科室就诊中患者
    pub async fn in_service(&self, department_id: &str) -> Result<Vec<InServiceRow>> {
        let queue = self.existing_queue(department_id).await?;
        let queue = queue.lock().await;
        let patients = self.patients.read().await;

        queue
            .in_service()
            .iter()
            .map(|slot| {
                Ok(InServiceRow {
                    patient: patients.get(&slot.patient_id)?.clone(),
                    started_at: slot.started_at,
                })
            })
            .collect()
    }

    /// 获取患者
    pub async fn patient(&self, patient_id: &str) -> Result<Patient> {
        self.patients.read().await.get(patient_id).cloned()
    }

    /// 查询患者列表
    pub async fn list_patients(&self, filter: &PatientFilter) -> PatientPage {
        self.patients.read().await.list(filter)
    }

    /// 指定状态的患者ID
    pub async fn patient_ids_with_status(&self, status: PatientStatus) -> Vec<String> {
        self.patients.read().await.ids_with_status(status)
    }

    /// 各状态人数
    pub async fn status_counts(&self) -> StatusCounts {
        self.patients.read().await.status_counts()
    }

    /// 获取科室，附带候诊人数
    pub async fn department(&self, department_id: &str) -> Result<Department> {
        let mut department = self.departments.read().await.get(department_id)?.clone();
        let (waiting, _) = self.queue_counts(department_id).await?;
        department.waiting_count = waiting;
        Ok(department)
    }

    /// 按注册顺序列出科室，附带候诊人数
    pub async fn departments(&self) -> Result<Vec<Department>> {
        // 先释放注册表读锁再获取队列锁，保持锁顺序
        let mut departments = self.departments.read().await.list().to_vec();
        for department in departments.iter_mut() {
            let (waiting, _) = self.queue_counts(&department.id).await?;
            department.waiting_count = waiting;
        }
        Ok(departments)
    }

    /// 科室（候诊人数, 就诊中人数）
    pub async fn queue_counts(&self, department_id: &str) -> Result<(usize, usize)> {
        let queue = self.existing_queue(department_id).await?;
        let queue = queue.lock().await;
        Ok((queue.waiting_count(), queue.in_service_count()))
    }

    /// 更新科室负载
    pub async fn update_load(&self, department_id: &str, percent: u8) -> Result<()> {
        self.departments.write().await.update_load(department_id, percent)
    }

    /// 订阅队列事件
    pub fn subscribe(&self, topic: SubscriptionTopic) -> Subscription {
        self.hub.subscribe(topic)
    }

    async fn queue_for(&self, department_id: &str) -> Option<SharedQueue> {
        self.queues.read().await.get(department_id).cloned()
    }

    async fn existing_queue(&self, department_id: &str) -> Result<SharedQueue> {
        self.queue_for(department_id)
            .await
            .ok_or_else(|| QueueError::NotFound(format!("Department {} not found", department_id)))
    }

    /// 读取患者当前活跃条目所在科室
    async fn active_department(&self, patient_id: &str, action: QueueAction) -> Result<String> {
        let patients = self.patients.read().await;
        let patient = patients.get(patient_id)?;
        self.check_entry(patient, action)?;
        patient.department.clone().ok_or_else(|| {
            QueueError::Internal(format!("Active patient {} has no department", patient_id))
        })
    }

    /// 校验患者可执行指定动作
    ///
    /// 未排队或已取消的患者没有条目，返回 NotFound；其余非法转换由状态机拒绝。
    fn check_entry(&self, patient: &Patient, action: QueueAction) -> Result<()> {
        match (patient.status, action) {
            (PatientStatus::None, _) | (PatientStatus::Cancelled, QueueAction::Cancel) => Err(
                QueueError::NotFound(format!("Patient {} has no active queue entry", patient.id)),
            ),
            (status, action) => self.state_machine.transition(status, action).map(|_| ()),
        }
    }

    fn ensure_not_queued(patient: &Patient) -> Result<()> {
        if patient.status.is_active() {
            return Err(QueueError::AlreadyQueued(format!(
                "Patient {} is already {} in {}",
                patient.id,
                patient.status,
                patient.department.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(())
    }

    fn not_waiting(patient_id: &str) -> QueueError {
        QueueError::NotFound(format!("Patient {} is not waiting", patient_id))
    }

    fn apply_rank_changes(patients: &mut PatientRegistry, changes: &[RankChange]) -> Result<()> {
        for change in changes {
            patients.set_snapshot(&change.patient_id, |p| {
                p.queue_position = Some(change.position);
                p.estimated_wait_minutes = Some(change.estimated_wait_minutes);
            })?;
        }
        Ok(())
    }

    fn publish_rank_changes(&self, department_id: &str, changes: &[RankChange], skip: Option<&str>) {
        for change in changes {
            if Some(change.patient_id.as_str()) == skip {
                continue;
            }
            self.hub.publish(
                QueueEvent::new(
                    QueueEventType::PositionChanged,
                    change.patient_id.as_str(),
                    department_id,
                    PatientStatus::Waiting,
                )
                .with_rank(change.position, change.estimated_wait_minutes),
            );
        }
    }
}
