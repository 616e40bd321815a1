//! # 候诊队列引擎
//!
//! 提供科室候诊队列的调度与等待时间估算，包括：
//! - 科室注册表与患者注册表
//! - 按优先级和到达时间排序的科室队列，自动重算排名与预计等待时间
//! - 候诊状态机：waiting → in-progress → completed / cancelled
//! - 通知中心：向订阅者扇出排名与状态变更
//! - 可选的模拟进度（演示/测试模式）

pub mod department;
pub mod engine;
pub mod eta;
pub mod notification;
pub mod patient;
pub mod queue;
pub mod scheduler;
pub mod simulation;
pub mod state_machine;

// 重新导出主要类型
pub use department::DepartmentRegistry;
pub use engine::{
    DepartmentQueueRow, DepartmentStats, EngineConfig, InProgressRow, PatientStatusView,
    QueueEngine, QueueStats,
};
pub use eta::estimate_wait_minutes;
pub use notification::{
    NotificationHub, QueueEvent, QueueEventType, Subscription, SubscriptionTopic,
};
pub use patient::{PatientFilter, PatientPage, PatientRegistry, StatusCounts};
pub use queue::{DepartmentQueue, QueueSlot};
pub use scheduler::{InServiceRow, QueueScheduler, SnapshotRow};
pub use simulation::{ProgressSimulator, SimulationConfig, TickReport};
pub use state_machine::{QueueAction, QueueStateMachine};
