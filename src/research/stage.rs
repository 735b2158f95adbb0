//! Pipeline stage state machine
//!
//! ```text
//! Initialized ─┬─> Clarification ─> Brief ─> Execution ─> Report ─> Complete
//!              └──────────────────> Brief            (clarification skipped)
//!
//! Any non-terminal stage ─> Failed
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Stage {
    #[serde(rename = "initialization")]
    Initialized,
    #[serde(rename = "clarification")]
    Clarification,
    #[serde(rename = "research_brief")]
    Brief,
    #[serde(rename = "research_execution")]
    Execution,
    #[serde(rename = "final_report")]
    Report,
    #[serde(rename = "completed")]
    Complete,
    #[serde(rename = "failed")]
    Failed,
}

impl Stage {
    /// Stages that perform provider work and report timings
    pub const WORK_STAGES: [Stage; 4] = [
        Stage::Clarification,
        Stage::Brief,
        Stage::Execution,
        Stage::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initialized => "initialization",
            Stage::Clarification => "clarification",
            Stage::Brief => "research_brief",
            Stage::Execution => "research_execution",
            Stage::Report => "final_report",
            Stage::Complete => "completed",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }

    /// Explicit transition table. Anything not listed here is illegal.
    pub fn can_transition_to(&self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Complete | Failed, _) => false,
            (_, Failed) => true,
            (Initialized, Clarification) => true,
            (Initialized, Brief) => true,
            (Clarification, Brief) => true,
            (Brief, Execution) => true,
            (Execution, Report) => true,
            (Report, Complete) => true,
            _ => false,
        }
    }

    /// The next stage on the success path.
    pub fn next(&self, allow_clarification: bool) -> Option<Stage> {
        match self {
            Stage::Initialized if allow_clarification => Some(Stage::Clarification),
            Stage::Initialized => Some(Stage::Brief),
            Stage::Clarification => Some(Stage::Brief),
            Stage::Brief => Some(Stage::Execution),
            Stage::Execution => Some(Stage::Report),
            Stage::Report => Some(Stage::Complete),
            Stage::Complete | Stage::Failed => None,
        }
    }

    /// Work stages visited on the success path, in order.
    pub fn plan(allow_clarification: bool) -> Vec<Stage> {
        let mut stages = Vec::with_capacity(4);
        let mut current = Stage::Initialized;
        while let Some(next) = current.next(allow_clarification) {
            if next.is_terminal() {
                break;
            }
            stages.push(next);
            current = next;
        }
        stages
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the current stage and rejects illegal transitions.
#[derive(Debug, Clone)]
pub struct StageMachine {
    current: Stage,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StageMachine {
    pub fn new() -> Self {
        Self {
            current: Stage::Initialized,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), IllegalTransition> {
        if !self.current.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal stage transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: Stage,
    pub to: Stage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_with_clarification() {
        assert_eq!(
            Stage::plan(true),
            vec![
                Stage::Clarification,
                Stage::Brief,
                Stage::Execution,
                Stage::Report
            ]
        );
    }

    #[test]
    fn test_plan_skips_clarification() {
        assert_eq!(
            Stage::plan(false),
            vec![Stage::Brief, Stage::Execution, Stage::Report]
        );
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal_stage() {
        for stage in [
            Stage::Initialized,
            Stage::Clarification,
            Stage::Brief,
            Stage::Execution,
            Stage::Report,
        ] {
            assert!(stage.can_transition_to(Stage::Failed), "{}", stage);
        }
        assert!(!Stage::Complete.can_transition_to(Stage::Failed));
        assert!(!Stage::Failed.can_transition_to(Stage::Failed));
    }

    #[test]
    fn test_machine_rejects_out_of_order_stage() {
        let mut machine = StageMachine::new();
        machine.advance(Stage::Brief).unwrap();
        let err = machine.advance(Stage::Report).unwrap_err();
        assert_eq!(err.from, Stage::Brief);
        assert_eq!(err.to, Stage::Report);
        assert_eq!(machine.current(), Stage::Brief);
    }

    #[test]
    fn test_no_exit_from_terminal() {
        let mut machine = StageMachine::new();
        machine.advance(Stage::Failed).unwrap();
        assert!(machine.advance(Stage::Brief).is_err());
    }
}
