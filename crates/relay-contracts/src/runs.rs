use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle states reported by the remote service for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Cancelling,
    RequiresAction,
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
}

impl RunStatus {
    /// Whether polling should stop. `requires_action` counts as terminal:
    /// the relay never submits tool outputs, so such a run cannot progress.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Queued | Self::InProgress | Self::Cancelling)
    }

    pub fn is_success(self) -> bool {
        self == Self::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Cancelling => "cancelling",
            Self::RequiresAction => "requires_action",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let status = match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "in_progress" => Self::InProgress,
            "cancelling" => Self::Cancelling,
            "requires_action" => Self::RequiresAction,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            "expired" => Self::Expired,
            "incomplete" => Self::Incomplete,
            other => return Err(format!("unknown run status '{other}'")),
        };
        Ok(status)
    }
}

/// One run of the assistant against the session thread. Lives only for the
/// duration of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub thread_id: String,
    pub run_id: String,
    pub status: RunStatus,
}

#[cfg(test)]
mod tests {
    use super::RunStatus;

    #[test]
    fn terminal_statuses_stop_polling() {
        for status in [
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
            RunStatus::Expired,
            RunStatus::Incomplete,
            RunStatus::RequiresAction,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        for status in [RunStatus::Queued, RunStatus::InProgress, RunStatus::Cancelling] {
            assert!(!status.is_terminal(), "{status} should keep polling");
        }
        assert!(RunStatus::Completed.is_success());
        assert!(!RunStatus::Failed.is_success());
    }

    #[test]
    fn parses_service_spellings() {
        assert_eq!("in_progress".parse::<RunStatus>(), Ok(RunStatus::InProgress));
        assert_eq!(" Completed ".parse::<RunStatus>(), Ok(RunStatus::Completed));
        assert_eq!("canceled".parse::<RunStatus>(), Ok(RunStatus::Cancelled));
        assert_eq!(
            "paused".parse::<RunStatus>(),
            Err("unknown run status 'paused'".to_string())
        );
    }
}
