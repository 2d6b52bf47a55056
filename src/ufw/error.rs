use thiserror::Error;

#[derive(Error, Debug)]
pub enum UfwError {
    #[error("ufw binary not found; install ufw or put it on PATH")]
    NotInstalled,

    #[error("'{command}' must run as root; rerun with sudo")]
    NotRoot { command: String },

    #[error("Failed to run '{command}'")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Unparsable ufw status line '{line}': {reason}")]
    Parse { line: String, reason: String },
}

impl UfwError {
    pub fn command_failed(
        command: impl Into<String>,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn parse(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            line: line.into(),
            reason: reason.into(),
        }
    }

    /// A missing tool or privilege is a host setup problem, not a failed mutation
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NotInstalled | Self::NotRoot { .. })
    }
}
