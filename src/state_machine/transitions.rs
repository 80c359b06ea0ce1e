//! Allowed-transition table for [`BatchState`].
//!
//! Stores apply the table inside their conditional update (`status = ANY(allowed_from)`)
//! so an invalid transition is rejected by the same statement that would perform it.

use super::states::BatchState;
use crate::error::{BatchError, Result};

/// States from which `target` may be entered. Self-transitions refresh fields
/// (for example a new `output_file_id`) without changing state.
pub fn allowed_predecessors(target: BatchState) -> &'static [BatchState] {
    use BatchState::*;

    match target {
        Submitted => &[Submitted],
        InProgress => &[Submitted, InProgress],
        Completed => &[Submitted, InProgress, Completed],
        Applied => &[Completed, Applied],
        Failed => &[Submitted, InProgress, Completed],
        Expired => &[Submitted, InProgress],
    }
}

pub fn can_transition(from: BatchState, to: BatchState) -> bool {
    allowed_predecessors(to).contains(&from)
}

pub fn validate_transition(from: BatchState, to: BatchState) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(BatchError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// String form of [`allowed_predecessors`] for binding into SQL
pub fn allowed_predecessor_names(target: BatchState) -> Vec<String> {
    allowed_predecessors(target)
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use BatchState::*;

    #[test]
    fn test_happy_path_is_allowed() {
        assert!(can_transition(Submitted, InProgress));
        assert!(can_transition(InProgress, Completed));
        assert!(can_transition(Completed, Applied));
    }

    #[test]
    fn test_terminal_states_never_leave() {
        for terminal in [Applied, Failed, Expired] {
            for target in BatchState::ALL {
                if terminal == Applied && target == Applied {
                    continue;
                }
                assert!(
                    !can_transition(terminal, target),
                    "{terminal} -> {target} must be rejected"
                );
            }
        }
    }

    #[test]
    fn test_failed_reachable_from_every_non_terminal_state() {
        for state in BatchState::NON_TERMINAL {
            assert!(can_transition(state, Failed));
        }
    }

    #[test]
    fn test_applied_requires_completed() {
        assert!(!can_transition(Submitted, Applied));
        assert!(!can_transition(InProgress, Applied));
    }

    #[test]
    fn test_validate_transition_error() {
        let err = validate_transition(Applied, Submitted).unwrap_err();
        assert!(matches!(
            err,
            BatchError::InvalidTransition { ref from, ref to } if from == "applied" && to == "submitted"
        ));
    }
}
