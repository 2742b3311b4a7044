/// Build pipeline error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    /// The sole error crossing the external-tool boundary: a child process
    /// exited non-zero, or a declared output directory was missing after an
    /// otherwise-successful run (exit code 1, diagnostic in `stderr`).
    #[error("command `{command}` failed with exit code {exit_code}\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    ToolFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error at {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error(transparent)]
    Package(#[from] tsforge_package::PackageError),
}

impl BuildError {
    /// Create a failed-tool error from a captured child process
    pub fn tool(
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ToolFailed {
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            error,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// The child process exit code to propagate at the process boundary
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ToolFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
