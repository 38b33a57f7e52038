use serde::Deserialize;
use std::{process::ExitStatus, time::Duration};

/// An event emitted by a running transcode.
#[derive(Debug)]
pub enum JobEvent {
    /// The job configuration HandBrake prints as JSON before encoding.
    Config(Config),
    /// A progress update, typically emitted every second during an encode.
    Progress(Progress),
    /// A `stderr` line, emitted only when the job has no log file.
    Log(Log),
    /// Signals that the `HandBrakeCLI` process has terminated.
    /// Contains the final `ExitStatus`, or a `JobFailure` if it could not be
    /// waited on.
    Done(Result<ExitStatus, JobFailure>),
}

/// The part of HandBrake's job JSON worth confirming before an encode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub video: VideoConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SourceConfig {
    pub path: std::path::PathBuf,
    /// The title selected from the source.
    pub title: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DestinationConfig {
    pub file: std::path::PathBuf,
    /// The container format (muxer), e.g. "av_mp4".
    pub mux: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VideoConfig {
    pub encoder: String,
    pub quality: Option<f64>,
    pub preset: Option<String>,
}

/// One `Encoding: task N of M, P %` status line.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// One-based index of the current task (a second pass counts as a task).
    pub task: u32,
    pub task_count: u32,
    /// Completion of the current task, 0.0 to 100.0.
    pub percentage: f32,
    pub fps: Option<f32>,
    pub avg_fps: Option<f32>,
    pub eta: Option<Duration>,
    /// The line as HandBrake printed it, without the carriage return.
    pub raw: String,
}

#[derive(Debug)]
pub struct Log {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct JobFailure {
    pub message: String,
    /// The OS error code, if available.
    pub exit_code: Option<i32>,
}
