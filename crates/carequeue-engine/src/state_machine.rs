//! 患者队列状态机
//!
//! 管理候诊条目的完整生命周期状态转换

use carequeue_core::{PatientStatus, QueueError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// 状态转换动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueueAction {
    Book,
    Advance,
    Cancel,
}

impl fmt::Display for QueueAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Book => "book",
            Self::Advance => "advance",
            Self::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

/// 候诊状态机
///
/// ```text
/// [none] --Book--> [waiting] --Advance--> [in-progress] --Advance--> [completed]
/// [waiting] --Cancel--> [cancelled]
/// [in-progress] --Cancel--> [cancelled]
/// ```
#[derive(Debug)]
pub struct QueueStateMachine {
    transitions: HashMap<(PatientStatus, QueueAction), PatientStatus>,
}

impl QueueStateMachine {
    /// 创建新的状态机实例
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((PatientStatus::None, QueueAction::Book), PatientStatus::Waiting);
        transitions.insert((PatientStatus::Waiting, QueueAction::Advance), PatientStatus::InProgress);
        transitions.insert((PatientStatus::InProgress, QueueAction::Advance), PatientStatus::Completed);
        transitions.insert((PatientStatus::Waiting, QueueAction::Cancel), PatientStatus::Cancelled);
        transitions.insert((PatientStatus::InProgress, QueueAction::Cancel), PatientStatus::Cancelled);

        Self { transitions }
    }

    /// 检查状态转换是否有效
    pub fn can_transition(&self, from: PatientStatus, action: QueueAction) -> bool {
        self.transitions.contains_key(&(from, action))
    }

    /// 执行状态转换
    pub fn transition(&self, from: PatientStatus, action: QueueAction) -> Result<PatientStatus> {
        self.transitions
            .get(&(from, action))
            .copied()
            .ok_or_else(|| QueueError::IllegalTransition {
                from: from.to_string(),
                action: action.to_string(),
            })
    }

    /// 获取状态的所有可能动作
    pub fn possible_actions(&self, current: PatientStatus) -> Vec<QueueAction> {
        let mut actions: Vec<QueueAction> = self
            .transitions
            .keys()
            .filter(|(state, _)| *state == current)
            .map(|(_, action)| *action)
            .collect();
        actions.sort_by_key(|action| *action as u8);
        actions
    }
}

impl Default for QueueStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let sm = QueueStateMachine::new();

        assert!(sm.can_transition(PatientStatus::None, QueueAction::Book));
        assert!(sm.can_transition(PatientStatus::Waiting, QueueAction::Advance));
        assert!(sm.can_transition(PatientStatus::InProgress, QueueAction::Advance));
        assert!(sm.can_transition(PatientStatus::InProgress, QueueAction::Cancel));
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let sm = QueueStateMachine::new();

        for terminal in [PatientStatus::Completed, PatientStatus::Cancelled] {
            assert!(sm.possible_actions(terminal).is_empty());
            assert!(sm.transition(terminal, QueueAction::Advance).is_err());
            assert!(sm.transition(terminal, QueueAction::Cancel).is_err());
        }
    }

    #[test]
    fn test_state_execution() {
        let sm = QueueStateMachine::new();

        let result = sm.transition(PatientStatus::Waiting, QueueAction::Advance);
        assert_eq!(result.unwrap(), PatientStatus::InProgress);

        let err = sm.transition(PatientStatus::None, QueueAction::Advance).unwrap_err();
        assert_eq!(err.kind(), "illegal_transition");
    }

    #[test]
    fn test_possible_actions() {
        let sm = QueueStateMachine::new();
        assert_eq!(
            sm.possible_actions(PatientStatus::Waiting),
            vec![QueueAction::Advance, QueueAction::Cancel]
        );
        assert_eq!(sm.possible_actions(PatientStatus::None), vec![QueueAction::Book]);
    }
}
