use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The line carries no usable source name. Callers skip the line.
    #[error("blank or malformed title column")]
    InvalidTitleColumn,
    /// No recognised output file with this base name exists under the root.
    #[error("'{name}' not found under '{root}'")]
    NotFound { root: PathBuf, name: String },
    #[error("Failed to scan destination root '{root}': {source}")]
    Walk {
        root: PathBuf,
        source: walkdir::Error,
    },
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The transcode-argument column could not be split into words.
    #[error("Malformed transcode arguments '{value}': {reason}")]
    ArgumentSyntax { value: String, reason: String },
    #[error("Invalid transcode flags: {reason}")]
    InvalidTranscodeFlags { reason: String },
    #[error("HandBrake executable not found in system PATH. Searched paths: {searched_paths:?}")]
    ExecutableNotFound { searched_paths: Vec<PathBuf> },
    #[error("Invalid HandBrake executable at '{path}': {reason}")]
    InvalidExecutable { path: PathBuf, reason: String },
    #[error("Failed to spawn HandBrake process: {source}")]
    ProcessSpawnFailed { source: std::io::Error },
    #[error("Transcode of '{input}' failed: {reason}")]
    TranscodeFailed { input: PathBuf, reason: String },
    #[error("Failed to {action} HandBrake process: {source}")]
    ControlFailed {
        action: &'static str,
        source: std::io::Error,
    },
}

impl Error {
    /// True for the classifications a caller should treat as "skip this line"
    /// rather than "abort the run".
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::InvalidTitleColumn | Error::NotFound { .. })
    }
}
