//! 模拟进度（演示/测试模式）
//!
//! 按固定间隔随机推进患者：每次触发时，每位候诊者以 `start_probability`
//! 开始就诊，每位就诊中患者以 `complete_probability` 完成就诊。
//! 生产环境应由护士站显式调用推进；随机源可注入，测试可复现。

use carequeue_core::{PatientStatus, QueueError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::QueueEngine;

/// 模拟配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub tick_interval: Duration,
    pub start_probability: f64,
    pub complete_probability: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(10),
            start_probability: 0.10,
            complete_probability: 0.05,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(QueueError::Validation("Tick interval must be positive".to_string()));
        }
        for (name, p) in [
            ("start_probability", self.start_probability),
            ("complete_probability", self.complete_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(QueueError::Validation(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

/// 单次触发结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TickReport {
    pub started: Vec<String>,
    pub completed: Vec<String>,
}

/// 进度模拟器
pub struct ProgressSimulator<R: Rng> {
    config: SimulationConfig,
    rng: R,
}

impl<R: Rng + Send> ProgressSimulator<R> {
    pub fn new(config: SimulationConfig, rng: R) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, rng })
    }

    /// 执行一次触发
    ///
    /// 每位患者按触发开始时的状态只推进一步。
    pub async fn tick(&mut self, engine: &QueueEngine) -> TickReport {
        let waiting = engine.patient_ids_with_status(PatientStatus::Waiting).await;
        let in_progress = engine.patient_ids_with_status(PatientStatus::InProgress).await;
        let mut report = TickReport::default();

        for patient_id in waiting {
            if self.rng.gen_bool(self.config.start_probability) {
                match engine.staff_advance_patient(&patient_id).await {
                    Ok(_) => report.started.push(patient_id),
                    Err(e) => debug!("Simulation skipped patient {}: {}", patient_id, e),
                }
            }
        }

        for patient_id in in_progress {
            if self.rng.gen_bool(self.config.complete_probability) {
                match engine.staff_advance_patient(&patient_id).await {
                    Ok(_) => report.completed.push(patient_id),
                    Err(e) => debug!("Simulation skipped patient {}: {}", patient_id, e),
                }
            }
        }

        debug!(
            "Simulation tick: {} started, {} completed",
            report.started.len(),
            report.completed.len()
        );
        report
    }

    /// 按间隔持续触发，直到收到停止信号；返回触发次数
    pub async fn run(mut self, engine: QueueEngine, mut shutdown: watch::Receiver<bool>) -> u64 {
        warn!(
            "Simulated progress enabled (every {:?}, p_start={}, p_complete={}); not for production use",
            self.config.tick_interval, self.config.start_probability, self.config.complete_probability
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.tick().await;
        let mut ticks = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(&engine).await;
                    ticks += 1;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Simulation stopped after {} ticks", ticks);
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carequeue_core::Department;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn engine_with_patients(count: usize) -> (QueueEngine, Vec<String>) {
        let engine = QueueEngine::default();
        engine
            .register_department(Department::new("radiology", "Radiology", 40))
            .await
            .unwrap();
        let mut ids = Vec::new();
        for i in 0..count {
            let entry = engine
                .admit_patient(&format!("Patient {}", i), "radiology", "medium")
                .await
                .unwrap();
            ids.push(entry.patient_id);
        }
        (engine, ids)
    }

    fn config(start: f64, complete: f64) -> SimulationConfig {
        SimulationConfig {
            tick_interval: Duration::from_millis(10),
            start_probability: start,
            complete_probability: complete,
        }
    }

    #[test]
    fn test_rejects_invalid_probability() {
        assert!(ProgressSimulator::new(config(1.5, 0.0), StdRng::seed_from_u64(1)).is_err());
        assert!(ProgressSimulator::new(config(0.1, -0.1), StdRng::seed_from_u64(1)).is_err());
        let zero_interval = SimulationConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());
    }

    #[tokio::test]
    async fn test_one_step_per_tick() {
        let (engine, ids) = engine_with_patients(3).await;
        let mut simulator =
            ProgressSimulator::new(config(1.0, 1.0), StdRng::seed_from_u64(7)).unwrap();

        let first = simulator.tick(&engine).await;
        assert_eq!(first.started, ids);
        assert!(first.completed.is_empty());

        let second = simulator.tick(&engine).await;
        assert!(second.started.is_empty());
        assert_eq!(second.completed, ids);

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.patients.completed, 3);
    }

    #[tokio::test]
    async fn test_zero_probability_never_moves() {
        let (engine, _) = engine_with_patients(4).await;
        let mut simulator =
            ProgressSimulator::new(config(0.0, 0.0), StdRng::seed_from_u64(7)).unwrap();

        for _ in 0..5 {
            assert_eq!(simulator.tick(&engine).await, TickReport::default());
        }
        assert_eq!(engine.snapshot("radiology").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_seeded_runs_are_reproducible() {
        let mut reports = Vec::new();
        for _ in 0..2 {
            let engine = QueueEngine::default();
            engine
                .register_department(Department::new("radiology", "Radiology", 40))
                .await
                .unwrap();
            for i in 0..20 {
                let id = format!("P{:02}", i);
                engine.register_patient(&id, "Patient").await.unwrap();
                engine.book_appointment(&id, "radiology", "low").await.unwrap();
            }

            let mut simulator =
                ProgressSimulator::new(config(0.3, 0.5), StdRng::seed_from_u64(42)).unwrap();
            let mut run = Vec::new();
            for _ in 0..4 {
                run.push(simulator.tick(&engine).await);
            }
            reports.push(run);
        }
        assert_eq!(reports[0], reports[1]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (engine, _) = engine_with_patients(1).await;
        let simulator =
            ProgressSimulator::new(config(0.0, 0.0), StdRng::seed_from_u64(3)).unwrap();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(simulator.run(engine, rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let ticks = handle.await.unwrap();
        assert!(ticks >= 1);
    }
}
