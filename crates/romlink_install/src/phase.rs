use serde::{Deserialize, Serialize};

/// Stage of the install pipeline. Phases only move forward, except for
/// `Failed` and `Cancelled`, which are reachable from any non-terminal phase.
#[derive(
    Serialize, Deserialize, Default, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug,
)]
pub enum InstallPhase {
    #[default]
    Pending,
    ResolvingMetadata,
    ResolvingDestination,
    Downloading,
    Extracting,
    Installing,
    PostProcessing,
    Completed,
    Failed,
    Cancelled,
}

impl InstallPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstallPhase::Completed | InstallPhase::Failed | InstallPhase::Cancelled
        )
    }

    #[must_use]
    pub fn can_advance_to(self, next: InstallPhase) -> bool {
        if self.is_terminal() {
            return false;
        }

        match next {
            InstallPhase::Failed | InstallPhase::Cancelled => true,
            _ => next >= self,
        }
    }
}

impl std::fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InstallPhase::Pending => "Pending",
            InstallPhase::ResolvingMetadata => "Resolving metadata",
            InstallPhase::ResolvingDestination => "Resolving destination",
            InstallPhase::Downloading => "Downloading",
            InstallPhase::Extracting => "Extracting",
            InstallPhase::Installing => "Installing",
            InstallPhase::PostProcessing => "Post-processing",
            InstallPhase::Completed => "Completed",
            InstallPhase::Failed => "Failed",
            InstallPhase::Cancelled => "Cancelled",
        })
    }
}

/// Coarse install status stored in the snapshot.
#[derive(Serialize, Deserialize, Default, Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum InstallStatus {
    #[default]
    NotInstalled,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            InstallStatus::NotInstalled => "NotInstalled",
            InstallStatus::InProgress => "InProgress",
            InstallStatus::Completed => "Completed",
            InstallStatus::Failed => "Failed",
            InstallStatus::Cancelled => "Cancelled",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::InstallPhase::{
        Cancelled, Completed, Downloading, Extracting, Failed, Installing, Pending,
        ResolvingMetadata,
    };

    #[test]
    fn forward_only() {
        assert!(Pending.can_advance_to(ResolvingMetadata));
        assert!(Downloading.can_advance_to(Extracting));
        assert!(Extracting.can_advance_to(Installing));
        assert!(Downloading.can_advance_to(Installing));
        assert!(!Installing.can_advance_to(Downloading));
    }

    #[test]
    fn terminal() {
        assert!(Downloading.can_advance_to(Failed));
        assert!(Pending.can_advance_to(Cancelled));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Cancelled));
        assert!(!Cancelled.can_advance_to(ResolvingMetadata));
    }
}
