//! 等待时间估算
//!
//! `eta = max(1, round(average_wait * priority_multiplier * max(1, position / 2)))`，
//! 设有快速通道上限的科室再取 `min(eta, ceiling)`。

use carequeue_core::{Department, Priority};

/// 排名系数，前两位均为 1
pub fn position_factor(position: usize) -> f64 {
    (position as f64 / 2.0).max(1.0)
}

/// 估算指定科室、优先级和排名下的等待分钟数，结果不小于 1
pub fn estimate_wait_minutes(department: &Department, priority: Priority, position: usize) -> u32 {
    let raw = f64::from(department.average_wait_minutes)
        * priority.wait_multiplier()
        * position_factor(position);
    // 超出 u32 范围时取上限
    let estimate = raw.round().clamp(1.0, f64::from(u32::MAX)) as u32;

    match department.fast_track_ceiling_minutes {
        Some(ceiling) => estimate.min(ceiling).max(1),
        None => estimate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radiology() -> Department {
        Department::new("radiology", "Radiology", 40)
    }

    #[test]
    fn test_position_factor() {
        assert_eq!(position_factor(1), 1.0);
        assert_eq!(position_factor(2), 1.0);
        assert_eq!(position_factor(3), 1.5);
        assert_eq!(position_factor(10), 5.0);
    }

    #[test]
    fn test_priority_multipliers() {
        let dept = radiology();
        assert_eq!(estimate_wait_minutes(&dept, Priority::Emergency, 1), 12);
        assert_eq!(estimate_wait_minutes(&dept, Priority::High, 1), 28);
        assert_eq!(estimate_wait_minutes(&dept, Priority::Medium, 1), 40);
        assert_eq!(estimate_wait_minutes(&dept, Priority::Low, 1), 60);
        assert_eq!(estimate_wait_minutes(&dept, Priority::Low, 3), 90);
    }

    #[test]
    fn test_floor_of_one_minute() {
        let dept = Department::new("triage", "Triage", 1);
        assert_eq!(estimate_wait_minutes(&dept, Priority::Emergency, 1), 1);

        let zero = Department::new("empty", "Empty", 0);
        for priority in Priority::all() {
            assert_eq!(estimate_wait_minutes(&zero, priority, 7), 1);
        }
    }

    #[test]
    fn test_fast_track_ceiling() {
        let emergency = Department::new("emergency", "Emergency", 30).with_fast_track_ceiling(5);
        assert_eq!(estimate_wait_minutes(&emergency, Priority::Low, 8), 5);
        assert_eq!(estimate_wait_minutes(&emergency, Priority::Emergency, 1), 5);

        let short = Department::new("minor", "Minor Injuries", 10).with_fast_track_ceiling(5);
        assert_eq!(estimate_wait_minutes(&short, Priority::Emergency, 1), 3);
    }

    #[test]
    fn test_huge_estimate_clamps_to_max() {
        let backlog = Department::new("backlog", "Backlog", u32::MAX);
        assert_eq!(estimate_wait_minutes(&backlog, Priority::Low, usize::MAX), u32::MAX);
        assert_eq!(estimate_wait_minutes(&backlog, Priority::Medium, 1), u32::MAX);
    }
}
