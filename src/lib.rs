//! Batch-drive `HandBrakeCLI` from titlemap listings.
//!
//! A titlemap line names one video title: its source media, the HandBrake
//! arguments that select and encode it, and the output it should become.
//! [`parse`] turns lines into [`TitleRecord`]s; [`DestinationIndex`] and
//! [`Inventory`] answer whether a title's output already exists or its source
//! is offline; [`HandBrake`] runs the transcodes that remain.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub mod args;
pub mod destination;
mod error;
mod event;
mod handle;
pub mod inventory;
pub mod job;
#[doc(hidden)]
pub mod testing;
pub mod title;

pub use args::TranscodeArgs;
pub use destination::{DestinationIndex, DirectoryWalker, FsWalker};
pub use error::Error;
pub use event::{
    Config, DestinationConfig, JobEvent, JobFailure, Log, Progress, SourceConfig, VideoConfig,
};
pub use handle::{JobControl, JobHandle};
pub use inventory::Inventory;
pub use job::TranscodeJob;
pub use title::{ParseOutcome, TitleRecord, parse};

/// Extensions of source media, tried in this order.
pub const SOURCE_EXTENSIONS: &[&str] = &[".dvdmedia", ".mkv", ".bluray"];

/// Extensions of transcoded output media.
pub const OUTPUT_EXTENSIONS: &[&str] = &[".m4v", ".mp4"];

const EXECUTABLE_NAME: &str = "HandBrakeCLI";

/// Validates that the given path points to a runnable HandBrakeCLI executable.
/// Runs `HandBrakeCLI --version` and checks the exit code.
async fn validate_executable(path: &Path) -> Result<String, Error> {
    let invalid = |reason: String| Error::InvalidExecutable {
        path: path.to_path_buf(),
        reason,
    };

    let output = Command::new(path)
        .arg("--version")
        .output()
        .await
        .map_err(|e| invalid(e.to_string()))?;

    if !output.status.success() {
        return Err(invalid(format!(
            "'--version' command failed with exit code: {:?}",
            output.status.code()
        )));
    }

    let version = String::from_utf8(output.stdout)
        .map_err(|e| invalid(format!("Failed to parse version output as UTF-8: {}", e)))?
        .trim()
        .to_string();

    if version.is_empty() {
        return Err(invalid(
            "HandBrakeCLI --version returned empty output".to_string(),
        ));
    }

    Ok(version)
}

/// Searches the given PATH string for the HandBrake executable.
fn find_executable_in_path(path_env: &OsStr) -> Result<PathBuf, Error> {
    let paths = env::split_paths(path_env).collect::<Vec<_>>();
    paths
        .iter()
        .map(|dir| dir.join(EXECUTABLE_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| Error::ExecutableNotFound {
            searched_paths: paths.clone(),
        })
}

/// A validated HandBrakeCLI executable.
#[derive(Debug, Clone)]
pub struct HandBrake {
    executable_path: PathBuf,
    version: String,
}

impl HandBrake {
    /// Discovers the HandBrake executable in the system PATH.
    pub async fn new() -> Result<Self, Error> {
        let path_var = env::var_os("PATH").unwrap_or_default();
        let executable_path = find_executable_in_path(&path_var)?;
        Self::new_with_path(executable_path).await
    }

    /// Uses the executable at `path`, which must answer `--version`.
    pub async fn new_with_path(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let executable_path = path.into();
        let version = validate_executable(&executable_path).await?;
        Ok(Self {
            executable_path,
            version,
        })
    }

    /// What `HandBrakeCLI --version` printed, trimmed.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn executable_path(&self) -> &Path {
        &self.executable_path
    }

    /// Starts describing a transcode of `input` into `output`.
    pub fn job(&self, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> TranscodeJob {
        TranscodeJob::new(self.executable_path.clone(), input, output)
    }
}
