//! Phase state machine with transition validation.
//!
//! `PhaseMachine` tracks the current TDD phase and records every
//! transition, rejecting moves the RED/YELLOW/GREEN cycle does not allow.

use crate::error::{Error, Result};
use crate::zlog_debug;

use super::{PhaseTransition, TddPhase};

/// Current TDD phase plus the history of how it got there.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    current: TddPhase,
    history: Vec<PhaseTransition>,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    /// Start in RED with an empty history.
    pub fn new() -> Self {
        Self {
            current: TddPhase::Red,
            history: Vec::new(),
        }
    }

    /// Check whether `target` is reachable from the current phase.
    ///
    /// Same-phase moves on RED and YELLOW record failed attempts;
    /// GREEN -> RED starts the next feature.
    pub fn can_transition(&self, target: TddPhase) -> bool {
        matches!(
            (self.current, target),
            (TddPhase::Red, TddPhase::Yellow)
                | (TddPhase::Red, TddPhase::Red)
                | (TddPhase::Yellow, TddPhase::Green)
                | (TddPhase::Yellow, TddPhase::Yellow)
                | (TddPhase::Green, TddPhase::Yellow)
                | (TddPhase::Green, TddPhase::Red)
        )
    }

    /// Move to `target`, recording the transition.
    pub fn transition(
        &mut self,
        target: TddPhase,
        validation_passed: bool,
        reason: impl Into<String>,
    ) -> Result<PhaseTransition> {
        if !self.can_transition(target) {
            return Err(Error::InvalidPhaseTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }

        let transition = PhaseTransition::new(self.current, target, validation_passed, reason);
        zlog_debug!("{}", transition.describe());
        self.current = target;
        self.history.push(transition.clone());
        Ok(transition)
    }

    /// Abandon the current cycle and return to RED without recording a transition.
    pub fn restart(&mut self) {
        self.current = TddPhase::Red;
    }

    pub fn current_phase(&self) -> TddPhase {
        self.current
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    pub fn into_history(self) -> Vec<PhaseTransition> {
        self.history
    }
}
