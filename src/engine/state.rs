use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Flow execution states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Initializing {
        nodes: usize,
    },
    Running {
        #[serde(skip)]
        start_time: Option<Instant>,
        nodes: usize,
    },
    Completed {
        #[serde(skip)]
        duration: Option<Duration>,
        cancelled: bool,
    },
    Error {
        error_msg: String,
        node: Option<String>,
    },
}

impl FlowState {
    /// Check if transition from current state to target state is valid
    pub fn can_transition_to(&self, target: &FlowState) -> bool {
        use FlowState::*;

        matches!(
            (self, target),
            (Idle, Initializing { .. })
                | (Initializing { .. }, Running { .. })
                | (Initializing { .. }, Error { .. })
                | (Running { .. }, Completed { .. })
                | (Running { .. }, Error { .. })
        )
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Idle => "Idle",
            Self::Initializing { .. } => "Initializing",
            Self::Running { .. } => "Running",
            Self::Completed { .. } => "Completed",
            Self::Error { .. } => "Error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let idle = FlowState::Idle;
        let init = FlowState::Initializing { nodes: 3 };

        assert!(idle.can_transition_to(&init));
        assert!(!init.can_transition_to(&idle));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let completed = FlowState::Completed {
            duration: None,
            cancelled: false,
        };
        let error = FlowState::Error {
            error_msg: "boom".to_string(),
            node: Some("op".to_string()),
        };

        assert!(completed.is_terminal() && error.is_terminal());
        assert!(!completed.can_transition_to(&FlowState::Idle));
        assert!(!error.can_transition_to(&FlowState::Initializing { nodes: 1 }));
    }

    #[test]
    fn test_running_cannot_restart() {
        let running = FlowState::Running {
            start_time: None,
            nodes: 2,
        };
        assert!(!running.can_transition_to(&FlowState::Initializing { nodes: 2 }));
        assert_eq!(running.name(), "Running");
    }
}
