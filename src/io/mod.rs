//! Output handling shared by the CLI and the MCP server: the [`Envelope`] shape both
//! surfaces serialize to under `--json`/tool results, and the process [`ExitCode`] the
//! CLI binary maps an envelope's [`Status`] down to.

pub mod envelope;

pub use envelope::{Envelope, ErrorDetails, Meta, Status};

/// Process exit codes for the CLI binary. Kept separate from [`Status`] since a caller
/// may want `NotFound`/`Ambiguous` to exit non-zero for scripting without losing the
/// distinction from a hard `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    NotFound = 1,
    Ambiguous = 2,
    Error = 3,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::Success,
            Status::NotFound => ExitCode::NotFound,
            Status::Ambiguous => ExitCode::Ambiguous,
            Status::Error => ExitCode::Error,
        }
    }
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_maps_to_matching_exit_code() {
        assert_eq!(ExitCode::from(Status::Success).as_i32(), 0);
        assert_eq!(ExitCode::from(Status::NotFound).as_i32(), 1);
        assert_eq!(ExitCode::from(Status::Ambiguous).as_i32(), 2);
        assert_eq!(ExitCode::from(Status::Error).as_i32(), 3);
    }
}
