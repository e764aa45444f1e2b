//! Lifecycle state of a supervised worker.

use serde::{Deserialize, Serialize};

/// State of the worker process owned by a [`WorkerSupervisor`](crate::WorkerSupervisor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// Supervisor constructed, nothing spawned yet
    #[default]
    NotStarted,
    /// Spawn in progress
    Starting,
    /// Child process alive
    Running,
    /// Terminated by an explicit stop()
    Stopped,
    /// Exited on its own while running
    Crashed,
}

impl WorkerState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// True once the child is gone (or never existed) and start() would spawn a new one.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::NotStarted | Self::Stopped | Self::Crashed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_state_default_is_not_started() {
        assert_eq!(WorkerState::default(), WorkerState::NotStarted);
    }

    #[test]
    fn worker_state_serializes_screaming_snake_case() {
        insta::assert_json_snapshot!(
            [
                WorkerState::NotStarted,
                WorkerState::Starting,
                WorkerState::Running,
                WorkerState::Stopped,
                WorkerState::Crashed,
            ],
            @r#"
        [
          "NOT_STARTED",
          "STARTING",
          "RUNNING",
          "STOPPED",
          "CRASHED"
        ]
        "#
        );
    }

    #[test]
    fn worker_state_deserializes_screaming_snake_case() {
        assert_eq!(
            serde_json::from_str::<WorkerState>("\"CRASHED\"").unwrap(),
            WorkerState::Crashed
        );
        assert_eq!(
            serde_json::from_str::<WorkerState>("\"NOT_STARTED\"").unwrap(),
            WorkerState::NotStarted
        );
    }

    #[test]
    fn only_terminal_or_fresh_states_can_start() {
        assert!(WorkerState::NotStarted.can_start());
        assert!(WorkerState::Stopped.can_start());
        assert!(WorkerState::Crashed.can_start());
        assert!(!WorkerState::Starting.can_start());
        assert!(!WorkerState::Running.can_start());
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(WorkerState::Crashed.to_string(), "crashed");
        assert_eq!(WorkerState::NotStarted.to_string(), "not_started");
    }
}
