//! Finite state of one in-flight or completed submission.

/// Phase of the submission lifecycle. Every phase returns to `Idle` when the
/// underlying payload changes; only the two in-flight phases refuse a new
/// `submit()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionPhase {
    Idle,
    ValidationFailed { message: String },
    CheckingCredits,
    Blocked,
    Submitting,
    Succeeded,
    Failed { message: String },
}

impl SubmissionPhase {
    /// A collaborator call is outstanding for the current generation.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::CheckingCredits | Self::Submitting)
    }

    /// Whether `submit()` may start a new attempt from this phase. Every
    /// terminal phase must answer true so the primary action is always
    /// re-actionable after a failure.
    pub fn accepts_submission(&self) -> bool {
        !self.is_in_flight()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ValidationFailed { .. } => "validation_failed",
            Self::CheckingCredits => "checking_credits",
            Self::Blocked => "blocked",
            Self::Submitting => "submitting",
            Self::Succeeded => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

impl Default for SubmissionPhase {
    fn default() -> Self {
        Self::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_phases_reject_submission() {
        assert!(!SubmissionPhase::CheckingCredits.accepts_submission());
        assert!(!SubmissionPhase::Submitting.accepts_submission());
    }

    #[test]
    fn every_terminal_phase_accepts_resubmission() {
        let terminal = [
            SubmissionPhase::Idle,
            SubmissionPhase::ValidationFailed {
                message: "missing file".into(),
            },
            SubmissionPhase::Blocked,
            SubmissionPhase::Succeeded,
            SubmissionPhase::Failed {
                message: "operation failed".into(),
            },
        ];
        for phase in terminal {
            assert!(
                phase.accepts_submission(),
                "phase {} must remain re-actionable",
                phase.label()
            );
        }
    }

    #[test]
    fn initial_phase_is_idle() {
        assert_eq!(SubmissionPhase::default(), SubmissionPhase::Idle);
    }
}
