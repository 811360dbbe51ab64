use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Problems detected while validating the startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("archive root {0} does not exist")]
    RootMissing(PathBuf),

    #[error("archive root {0} is not a directory")]
    RootNotDirectory(PathBuf),

    #[error("archive root {path} is not readable: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
}

/// Why an archive identifier could not be turned into a folder.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("archive `{0}` does not exist")]
    NotFound(String),

    #[error("archive identifier `{0}` escapes the archive root")]
    Traversal(String),

    #[error("failed to inspect archive `{identifier}`: {source}")]
    Io {
        identifier: String,
        #[source]
        source: io::Error,
    },
}

impl LocateError {
    /// Whether the caller should answer with a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LocateError::NotFound(_) | LocateError::Traversal(_))
    }
}

/// A fault that ended a relay before the archive was fully delivered.
#[derive(Debug, Error)]
pub enum StreamFault {
    #[error("failed to start the archiver: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to read archiver output: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write to client: {0}")]
    Write(#[source] io::Error),

    #[error("archiver exited with {status}")]
    ToolExit { status: ExitStatus, stderr: String },
}

impl StreamFault {
    /// Short category name used in log lines.
    pub fn category(&self) -> &'static str {
        match self {
            StreamFault::Spawn(_) => "spawn",
            StreamFault::Read(_) => "read",
            StreamFault::Write(_) => "write",
            StreamFault::ToolExit { .. } => "tool-exit",
        }
    }
}
