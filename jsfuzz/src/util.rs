use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::libafl::executors::ExitKind;

/// Outcome of executing one testcase in the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    NewCoverage,
    Exception,
    Timeout,
    Crash,
}

impl ExecutionStatus {
    /// Whether the execution ran to completion without throwing.
    pub fn is_valid(self) -> bool {
        matches!(self, ExecutionStatus::Success | ExecutionStatus::NewCoverage)
    }
}

impl From<ExecutionStatus> for ExitKind {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Success | ExecutionStatus::NewCoverage | ExecutionStatus::Exception => {
                ExitKind::Ok
            }
            ExecutionStatus::Timeout => ExitKind::Timeout,
            ExecutionStatus::Crash => ExitKind::Crash,
        }
    }
}

/// The status a libafl executor outcome stands for. Coverage and exceptions are
/// not visible in an [`ExitKind`], so every non-fatal exit reads as a success.
pub fn status_from_exit_kind(kind: ExitKind) -> ExecutionStatus {
    match kind {
        ExitKind::Crash | ExitKind::Oom => ExecutionStatus::Crash,
        ExitKind::Timeout => ExecutionStatus::Timeout,
        _ => ExecutionStatus::Success,
    }
}

pub fn read_testcase_file(path: &Path) -> anyhow::Result<String> {
    use anyhow::Context;
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Lower-case hexadecimal rendering of `bytes`, for attaching binary state to
/// log records.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_kinds_round_trip_for_fatal_statuses() {
        for status in [ExecutionStatus::Timeout, ExecutionStatus::Crash] {
            assert_eq!(status_from_exit_kind(ExitKind::from(status)), status);
        }
        assert_eq!(ExitKind::from(ExecutionStatus::Exception), ExitKind::Ok);
        assert_eq!(status_from_exit_kind(ExitKind::Oom), ExecutionStatus::Crash);
    }

    #[test]
    fn hex_is_two_digits_per_byte() {
        assert_eq!(hex(&[0x00, 0xa1, 0xff]), "00a1ff");
    }
}
