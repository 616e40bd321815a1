//! 科室候诊队列
//!
//! 每个科室一条有序队列：候诊者按 `(优先级排名, 到达时间, 到达序号)` 升序排列，
//! 每次变更后整体重新计算排名与等待时间。

use carequeue_core::{Department, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::eta::estimate_wait_minutes;

/// 候诊槽位
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueSlot {
    pub patient_id: String,
    pub priority: Priority,
    pub arrival_time: DateTime<Utc>,
    pub sequence: u64,
    pub position: usize,
    pub estimated_wait_minutes: u32,
}

impl QueueSlot {
    pub fn new(
        patient_id: impl Into<String>,
        priority: Priority,
        arrival_time: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            priority,
            arrival_time,
            sequence,
            position: 0,
            estimated_wait_minutes: 0,
        }
    }

    fn sort_key(&self) -> (u8, DateTime<Utc>, u64) {
        (self.priority.rank(), self.arrival_time, self.sequence)
    }
}

/// 就诊中槽位
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSlot {
    pub patient_id: String,
    pub priority: Priority,
    pub started_at: DateTime<Utc>,
}

/// 重新排名后发生变化的候诊者
#[derive(Debug, Clone, PartialEq)]
pub struct RankChange {
    pub patient_id: String,
    pub position: usize,
    pub estimated_wait_minutes: u32,
}

/// 科室候诊队列
#[derive(Debug)]
pub struct DepartmentQueue {
    department_id: String,
    waiting: Vec<QueueSlot>,
    in_service: Vec<ServiceSlot>,
}

impl DepartmentQueue {
    pub fn new(department_id: impl Into<String>) -> Self {
        Self {
            department_id: department_id.into(),
            waiting: Vec::new(),
            in_service: Vec::new(),
        }
    }

    /// 按排序键插入候诊者，返回插入下标
    pub fn insert(&mut self, slot: QueueSlot) -> usize {
        let key = slot.sort_key();
        let idx = self.waiting.partition_point(|existing| existing.sort_key() <= key);
        self.waiting.insert(idx, slot);
        idx
    }

    /// 移出候诊者
    pub fn remove_waiting(&mut self, patient_id: &str) -> Option<QueueSlot> {
        let idx = self.waiting.iter().position(|s| s.patient_id == patient_id)?;
        Some(self.waiting.remove(idx))
    }

    /// 候诊者开始就诊
    pub fn start_service(&mut self, slot: QueueSlot, started_at: DateTime<Utc>) {
        self.in_service.push(ServiceSlot {
            patient_id: slot.patient_id,
            priority: slot.priority,
            started_at,
        });
    }

    /// 结束就诊（完成或取消）
    pub fn finish_service(&mut self, patient_id: &str) -> Option<ServiceSlot> {
        let idx = self.in_service.iter().position(|s| s.patient_id == patient_id)?;
        Some(self.in_service.remove(idx))
    }

    /// 重新计算全部候诊者的排名与等待时间，返回发生变化的条目
    pub fn rerank(&mut self, department: &Department) -> Vec<RankChange> {
        let mut changes = Vec::new();

        for (idx, slot) in self.waiting.iter_mut().enumerate() {
            let position = idx + 1;
            let eta = estimate_wait_minutes(department, slot.priority, position);

            if slot.position != position || slot.estimated_wait_minutes != eta {
                slot.position = position;
                slot.estimated_wait_minutes = eta;
                changes.push(RankChange {
                    patient_id: slot.patient_id.clone(),
                    position,
                    estimated_wait_minutes: eta,
                });
            }
        }

        tracing::debug!(
            "Reranked department {}: {} waiting, {} changed",
            self.department_id,
            self.waiting.len(),
            changes.len()
        );
        changes
    }

    /// 候诊者（展示顺序）
    pub fn waiting(&self) -> &[QueueSlot] {
        &self.waiting
    }

    /// 就诊中患者（开始就诊顺序）
    pub fn in_service(&self) -> &[ServiceSlot] {
        &self.in_service
    }

    pub fn slot(&self, patient_id: &str) -> Option<&QueueSlot> {
        self.waiting.iter().find(|s| s.patient_id == patient_id)
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn in_service_count(&self) -> usize {
        self.in_service.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn slot(id: &str, priority: Priority, offset_secs: i64, sequence: u64) -> QueueSlot {
        let base = DateTime::parse_from_rfc3339("2024-01-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        QueueSlot::new(id, priority, base + Duration::seconds(offset_secs), sequence)
    }

    fn ids(queue: &DepartmentQueue) -> Vec<&str> {
        queue.waiting().iter().map(|s| s.patient_id.as_str()).collect()
    }

    #[test]
    fn test_insert_orders_by_priority_then_arrival() {
        let mut queue = DepartmentQueue::new("radiology");
        queue.insert(slot("low-early", Priority::Low, 0, 0));
        queue.insert(slot("medium", Priority::Medium, 10, 1));
        queue.insert(slot("emergency", Priority::Emergency, 20, 2));
        queue.insert(slot("low-late", Priority::Low, 30, 3));
        queue.insert(slot("high", Priority::High, 40, 4));

        assert_eq!(ids(&queue), vec!["emergency", "high", "medium", "low-early", "low-late"]);
    }

    #[test]
    fn test_identical_arrival_uses_sequence() {
        let mut queue = DepartmentQueue::new("radiology");
        queue.insert(slot("second", Priority::Medium, 0, 2));
        queue.insert(slot("first", Priority::Medium, 0, 1));
        assert_eq!(ids(&queue), vec!["first", "second"]);
    }

    #[test]
    fn test_rerank_reports_changes_and_compacts() {
        let dept = Department::new("radiology", "Radiology", 40);
        let mut queue = DepartmentQueue::new("radiology");
        queue.insert(slot("x", Priority::Low, 0, 0));
        queue.insert(slot("y", Priority::Medium, 1, 1));
        queue.insert(slot("z", Priority::Emergency, 2, 2));

        let changes = queue.rerank(&dept);
        assert_eq!(changes.len(), 3);
        let etas: Vec<u32> = queue.waiting().iter().map(|s| s.estimated_wait_minutes).collect();
        assert_eq!(etas, vec![12, 40, 90]);

        queue.remove_waiting("y").unwrap();
        let changes = queue.rerank(&dept);
        assert_eq!(
            changes,
            vec![RankChange {
                patient_id: "x".to_string(),
                position: 2,
                estimated_wait_minutes: 60,
            }]
        );
        let positions: Vec<usize> = queue.waiting().iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![1, 2]);
    }

    #[test]
    fn test_service_lifecycle() {
        let mut queue = DepartmentQueue::new("cardiology");
        queue.insert(slot("a", Priority::High, 0, 0));

        let removed = queue.remove_waiting("a").unwrap();
        queue.start_service(removed, Utc::now());
        assert_eq!(queue.waiting_count(), 0);
        assert_eq!(queue.in_service_count(), 1);

        assert!(queue.finish_service("a").is_some());
        assert!(queue.finish_service("a").is_none());
        assert!(queue.remove_waiting("a").is_none());
    }
}
