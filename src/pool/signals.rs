//! Exit analysis for worker processes.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// Reason why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled(Signal),
    /// Unknown termination reason.
    Unknown,
}

impl TerminationReason {
    /// Check if this is a successful exit.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {}", code),
            Self::Signaled(Signal::SIGKILL) => "killed by SIGKILL".to_string(),
            Self::Signaled(Signal::SIGSEGV) => "crashed with SIGSEGV".to_string(),
            Self::Signaled(sig) => format!("killed by signal {:?}", sig),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze an `ExitStatus` to determine the termination reason.
pub fn analyze_exit_status(status: ExitStatus) -> TerminationReason {
    if let Some(code) = status.code() {
        return TerminationReason::Exited(code);
    }
    match status.signal().map(Signal::try_from) {
        Some(Ok(signal)) => TerminationReason::Signaled(signal),
        _ => TerminationReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_exit_code() {
        let status = ExitStatus::from_raw(0);
        assert_eq!(analyze_exit_status(status), TerminationReason::Exited(0));
        assert!(analyze_exit_status(status).is_success());

        // Exit code lives in the high byte of the wait status.
        let status = ExitStatus::from_raw(3 << 8);
        assert_eq!(analyze_exit_status(status), TerminationReason::Exited(3));
    }

    #[test]
    fn test_analyze_signal() {
        let status = ExitStatus::from_raw(Signal::SIGKILL as i32);
        assert_eq!(
            analyze_exit_status(status),
            TerminationReason::Signaled(Signal::SIGKILL)
        );
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(
            TerminationReason::Exited(1).to_string(),
            "exited with code 1"
        );
        assert!(
            TerminationReason::Signaled(Signal::SIGKILL)
                .to_string()
                .contains("SIGKILL")
        );
        assert!(
            TerminationReason::Signaled(Signal::SIGTERM)
                .to_string()
                .contains("SIGTERM")
        );
    }
}
