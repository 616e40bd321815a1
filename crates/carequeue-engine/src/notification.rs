//! 队列变更通知中心
//!
//! 向订阅者（界面、聊天助手等）扇出"排名/状态变更"事件：
//! - 按患者或科室订阅
//! - 发布时按主题分发到每个订阅者独立的有界缓冲，落后时丢弃最旧事件
//! - 发布永不阻塞调度器

use carequeue_core::PatientStatus;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// 队列事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueEventType {
    Enqueued,
    PositionChanged,
    StatusChanged,
}

impl QueueEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enqueued => "queue.enqueued",
            Self::PositionChanged => "queue.position_changed",
            Self::StatusChanged => "queue.status_changed",
        }
    }
}

/// 队列事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEvent {
    pub id: Uuid,
    pub event_type: QueueEventType,
    pub patient_id: String,
    pub department_id: String,
    pub status: PatientStatus,
    pub position: Option<usize>,
    pub estimated_wait_minutes: Option<u32>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl QueueEvent {
    pub fn new(
        event_type: QueueEventType,
        patient_id: impl Into<String>,
        department_id: impl Into<String>,
        status: PatientStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            patient_id: patient_id.into(),
            department_id: department_id.into(),
            status,
            position: None,
            estimated_wait_minutes: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_rank(mut self, position: usize, estimated_wait_minutes: u32) -> Self {
        self.position = Some(position);
        self.estimated_wait_minutes = Some(estimated_wait_minutes);
        self
    }
}

/// 订阅主题
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionTopic {
    Patient(String),
    Department(String),
    All,
}

impl SubscriptionTopic {
    /// 检查是否对指定事件感兴趣
    pub fn matches(&self, event: &QueueEvent) -> bool {
        match self {
            Self::Patient(id) => event.patient_id == *id,
            Self::Department(id) => event.department_id == *id,
            Self::All => true,
        }
    }
}

/// 通知中心
///
/// 每个订阅者持有独立的有界缓冲，事件在发布时按主题分发，
/// 其他患者或科室的流量不会挤占订阅者自己的缓冲。
#[derive(Debug, Clone)]
pub struct NotificationHub {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    capacity: usize,
}

#[derive(Debug)]
struct Subscriber {
    topic: SubscriptionTopic,
    sender: broadcast::Sender<QueueEvent>,
}

impl NotificationHub {
    /// 创建通知中心，`capacity` 为每个订阅者的缓冲上限
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 发布事件，只投递给主题匹配的订阅者；缓冲已满时挤掉最旧的事件
    pub fn publish(&self, event: QueueEvent) {
        debug!(
            "Publishing {} for patient {} in {}",
            event.event_type.as_str(),
            event.patient_id,
            event.department_id
        );

        let mut subscribers = self.subscribers();
        subscribers.retain(|s| s.sender.receiver_count() > 0);

        let mut delivered = 0;
        for subscriber in subscribers.iter().filter(|s| s.topic.matches(&event)) {
            if subscriber.sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        if delivered == 0 {
            debug!("No subscribers for queue event");
        }
    }

    /// 订阅事件流；不回放历史
    pub fn subscribe(&self, topic: SubscriptionTopic) -> Subscription {
        debug!("New subscription: {:?}", topic);
        let (sender, receiver) = broadcast::channel(self.capacity);
        self.subscribers().push(Subscriber {
            topic: topic.clone(),
            sender,
        });

        Subscription {
            receiver,
            topic,
            dropped: 0,
        }
    }

    /// 当前仍在接收的订阅者数
    pub fn subscriber_count(&self) -> usize {
        self.subscribers()
            .iter()
            .filter(|s| s.sender.receiver_count() > 0)
            .count()
    }
}

/// 单个订阅者的事件流
///
/// 丢弃即取消订阅；重新订阅可从当前时刻重新开始。
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<QueueEvent>,
    topic: SubscriptionTopic,
    dropped: u64,
}

impl Subscription {
    /// 等待下一条事件；通知中心关闭时返回 `None`
    pub async fn recv(&mut self) -> Option<QueueEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞读取下一条事件
    pub fn try_recv(&mut self) -> Option<QueueEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(_) => return None,
            }
        }
    }

    fn record_lag(&mut self, skipped: u64) {
        self.dropped += skipped;
        warn!(
            "Subscriber {:?} lagging, dropped {} oldest events",
            self.topic, skipped
        );
    }

    /// 因落后而丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 取消订阅
    pub fn unsubscribe(self) {
        debug!("Unsubscribed: {:?}", self.topic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(patient: &str, department: &str) -> QueueEvent {
        QueueEvent::new(
            QueueEventType::StatusChanged,
            patient,
            department,
            PatientStatus::Waiting,
        )
    }

    #[tokio::test]
    async fn test_topic_filtering() {
        let hub = NotificationHub::new(16);
        let mut by_patient = hub.subscribe(SubscriptionTopic::Patient("P1".into()));
        let mut by_department = hub.subscribe(SubscriptionTopic::Department("radiology".into()));

        hub.publish(event("P2", "radiology"));
        hub.publish(event("P1", "cardiology"));

        assert_eq!(by_patient.recv().await.unwrap().department_id, "cardiology");
        assert_eq!(by_department.recv().await.unwrap().patient_id, "P2");
        assert!(by_department.try_recv().is_none());
    }

    #[test]
    fn test_slow_subscriber_drops_oldest() {
        let hub = NotificationHub::new(2);
        let mut slow = hub.subscribe(SubscriptionTopic::All);

        for i in 0..5 {
            hub.publish(event(&format!("P{}", i), "radiology"));
        }

        let first = slow.try_recv().unwrap();
        assert_eq!(first.patient_id, "P3");
        assert_eq!(slow.dropped(), 3);
        assert_eq!(slow.try_recv().unwrap().patient_id, "P4");
        assert!(slow.try_recv().is_none());
    }

    #[test]
    fn test_unrelated_traffic_does_not_evict_own_events() {
        let hub = NotificationHub::new(4);
        let mut own = hub.subscribe(SubscriptionTopic::Patient("X".into()));

        hub.publish(event("X", "radiology"));
        for i in 0..10 {
            hub.publish(event(&format!("C{}", i), "cardiology"));
        }

        assert_eq!(own.try_recv().unwrap().patient_id, "X");
        assert!(own.try_recv().is_none());
        assert_eq!(own.dropped(), 0);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = NotificationHub::new(4);
        hub.publish(event("P1", "radiology"));
        assert_eq!(hub.subscriber_count(), 0);

        let subscription = hub.subscribe(SubscriptionTopic::All);
        assert_eq!(hub.subscriber_count(), 1);
        subscription.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);
    }
}
