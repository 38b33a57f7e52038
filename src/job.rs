use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::bytes::Captures;
use regex::bytes::Regex;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::select;
use tokio::sync::{Mutex, mpsc};
use tokio_util::codec::FramedRead;
use tokio_util::codec::LinesCodec;

use crate::args::TranscodeArgs;
use crate::error::Error;
use crate::event::{Config, JobEvent, JobFailure, Log, Progress};
use crate::handle::{JobControl, JobHandle};

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Encoding: task (?P<task>\d+) of (?P<tasks>\d+), (?P<pct>\d{1,3}\.\d{2}) %( \((?P<fps>\d+\.\d{2}) fps, avg (?P<avg_fps>\d+\.\d{2}) fps, ETA (?P<eta>\d{2}h\d{2}m\d{2}s)\))?",
    )
    .expect("BUG: Failed to compile progress regex")
});

/// Parses HandBrake's `HHhMMmSSs` ETA format into a `Duration`.
fn parse_eta(eta_str: &str) -> Duration {
    let h = eta_str[0..2].parse::<u64>().unwrap_or(0);
    let m = eta_str[3..5].parse::<u64>().unwrap_or(0);
    let s = eta_str[6..8].parse::<u64>().unwrap_or(0);

    Duration::from_secs(h * 3600 + m * 60 + s)
}

fn parse_caps<T>(caps: &Captures, name: &str) -> Option<T>
where
    T: FromStr,
{
    caps.name(name)
        .and_then(|v| String::from_utf8_lossy(v.as_bytes()).parse::<T>().ok())
}

/// Parses one `\r`-delimited chunk of HandBrake's stdout.
pub fn parse_progress(chunk: &[u8]) -> Option<Progress> {
    let caps = PROGRESS_RE.captures(chunk)?;
    let whole = caps.get(0)?;
    Some(Progress {
        task: parse_caps(&caps, "task").unwrap_or_default(),
        task_count: parse_caps(&caps, "tasks").unwrap_or_default(),
        percentage: parse_caps(&caps, "pct").unwrap_or_default(),
        fps: parse_caps(&caps, "fps"),
        avg_fps: parse_caps(&caps, "avg_fps"),
        eta: caps
            .name("eta")
            .map(|v| parse_eta(&String::from_utf8_lossy(v.as_bytes()))),
        raw: String::from_utf8_lossy(whole.as_bytes()).into_owned(),
    })
}

/// One `HandBrakeCLI --input <input> --output <output> ...` run.
pub struct TranscodeJob {
    // The path to the HandBrakeCLI executable, copied from HandBrake instance
    handbrake_path: PathBuf,
    input: PathBuf,
    output: PathBuf,
    args: TranscodeArgs,
    // Receives HandBrake's stderr when set
    log_file: Option<PathBuf>,
}

impl TranscodeJob {
    /// Creates a job with no extra options.
    ///
    /// This is typically called via `HandBrake::job()`.
    pub fn new(
        handbrake_path: PathBuf,
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        TranscodeJob {
            handbrake_path,
            input: input.into(),
            output: output.into(),
            args: TranscodeArgs::default(),
            log_file: None,
        }
    }

    /// Sets the HandBrake options, replacing any set before.
    pub fn args(mut self, args: TranscodeArgs) -> Self {
        self.args = args;
        self
    }

    /// Writes HandBrake's `stderr` to `path`, truncating it first.
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    fn create_process(&self) -> Command {
        let mut cmd = Command::new(&self.handbrake_path);
        cmd.args(self.build_args()).stdin(Stdio::null());
        // keep terminal signals away from HandBrake; cancellation is explicit
        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        {
            use windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }
        cmd
    }

    /// Executes the job and waits for completion, returning only the final `ExitStatus`.
    ///
    /// Progress is discarded; `stderr` goes to the log file if one is set and
    /// is otherwise inherited.
    ///
    /// # Errors
    ///
    /// Returns an `Error` if the log file could not be created or the process
    /// could not be spawned.
    pub async fn status(self) -> Result<ExitStatus, Error> {
        let stderr_cfg = match &self.log_file {
            Some(path) => Stdio::from(std::fs::File::create(path).map_err(|e| Error::Io {
                path: path.clone(),
                source: e,
            })?),
            None => Stdio::inherit(),
        };
        self.create_process()
            .stdout(Stdio::null())
            .stderr(stderr_cfg)
            .status()
            .await
            .map_err(|e| Error::ProcessSpawnFailed { source: e })
    }

    /// Starts the job in monitored mode, returning a `JobHandle`.
    ///
    /// A background task turns HandBrake's `stdout` into `Progress` events and
    /// copies its `stderr` into the log file, picking out the job `Config`.
    ///
    /// # Errors
    ///
    /// Returns an `Error` if the log file could not be created or the process
    /// could not be spawned.
    pub async fn start(self) -> Result<JobHandle, Error> {
        let mut log = match &self.log_file {
            Some(path) => Some(File::create(path).await.map_err(|e| Error::Io {
                path: path.clone(),
                source: e,
            })?),
            None => None,
        };

        let mut child = self
            .create_process()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ProcessSpawnFailed { source: e })?;

        let (event_tx, event_rx) = mpsc::channel(128);

        let stderr = child
            .stderr
            .take()
            .expect("BUG: stderr was not captured. This should not happen when piping.");
        let stdout = child.stdout.take().expect("BUG: stdout was not captured.");

        let control = JobControl {
            pid: child.id(),
            child: Arc::new(Mutex::new(child)),
        };
        let waiter = Arc::clone(&control.child);

        tokio::spawn(async move {
            let mut stdout_reader = BufReader::new(stdout);
            let mut stderr_reader = FramedRead::new(stderr, LinesCodec::default());
            let mut stdout_open = true;
            let mut stderr_open = true;

            // read_until keeps partial reads here if the stderr branch wins
            let mut out_buf: Vec<u8> = Vec::new();
            let mut config_buffer = String::new();
            let mut in_json_block = false;

            while stdout_open || stderr_open {
                let event = select! {
                    read = stdout_reader.read_until(b'\r', &mut out_buf), if stdout_open => {
                        if !matches!(read, Ok(n) if n > 0) {
                            stdout_open = false;
                        }
                        let progress = parse_progress(&out_buf);
                        out_buf.clear();
                        progress.map(JobEvent::Progress)
                    },
                    line = stderr_reader.next(), if stderr_open => match line {
                        Some(Ok(v)) => {
                            if let Some(log) = log.as_mut() {
                                let written = log.write_all(v.as_bytes()).await;
                                if written.is_ok() {
                                    let _ = log.write_all(b"\n").await;
                                }
                            }
                            if v.ends_with("json job:") {
                                in_json_block = true;
                                None
                            } else if in_json_block {
                                config_buffer.push_str(&v);
                                config_buffer.push('\n');
                                if v == "}" {
                                    in_json_block = false;
                                    let parsed = serde_json::from_str::<Config>(&config_buffer);
                                    config_buffer.clear();
                                    parsed.ok().map(JobEvent::Config)
                                } else {
                                    None
                                }
                            } else if log.is_none() {
                                Some(JobEvent::Log(Log { message: v }))
                            } else {
                                None
                            }
                        }
                        Some(Err(e)) => Some(JobEvent::Log(Log {
                            message: format!("Failed to read the line: {:?}", e),
                        })),
                        None => {
                            stderr_open = false;
                            None
                        }
                    },
                };

                if let Some(event) = event {
                    let _ = event_tx.send(event).await;
                }
            }

            if let Some(log) = log.as_mut() {
                let _ = log.flush().await;
            }

            let done = match waiter.lock().await.wait().await {
                Ok(status) => Ok(status),
                Err(e) => Err(JobFailure {
                    message: format!("Failed: {}", e),
                    exit_code: e.raw_os_error(),
                }),
            };
            let _ = event_tx.send(JobEvent::Done(done)).await;
        });

        Ok(JobHandle { control, event_rx })
    }

    /// Builds the final list of command-line arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--input".into(),
            self.input.display().to_string(),
            "--output".into(),
            self.output.display().to_string(),
        ];
        args.extend(self.args.to_args());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_full_match() {
        let line = b"Encoding: task 1 of 2, 12.34 % (120.00 fps, avg 110.00 fps, ETA 00h01m30s)\r";
        let progress = parse_progress(line).unwrap();

        assert_eq!(progress.task, 1);
        assert_eq!(progress.task_count, 2);
        assert_eq!(progress.percentage, 12.34);
        assert_eq!(progress.fps, Some(120.0));
        assert_eq!(progress.avg_fps, Some(110.0));
        assert_eq!(progress.eta, Some(Duration::from_secs(90)));
        assert_eq!(
            progress.raw,
            "Encoding: task 1 of 2, 12.34 % (120.00 fps, avg 110.00 fps, ETA 00h01m30s)"
        );
    }

    #[test]
    fn test_progress_pct_only() {
        let progress = parse_progress(b"Encoding: task 1 of 1, 56.78 %").unwrap();

        assert_eq!(progress.percentage, 56.78);
        assert!(progress.fps.is_none());
        assert!(progress.avg_fps.is_none());
        assert!(progress.eta.is_none());
    }

    #[test]
    fn test_progress_complete() {
        let progress = parse_progress(b"Encoding: task 2 of 2, 100.00 %").unwrap();
        assert_eq!(progress.percentage, 100.0);
    }

    #[test]
    fn test_progress_no_match() {
        assert!(parse_progress(b"Some other output that does not match").is_none());
    }

    #[test]
    fn test_parse_eta() {
        assert_eq!(parse_eta("01h23m45s"), Duration::from_secs(5025));
    }

    #[test]
    fn test_build_args() {
        let args = TranscodeArgs {
            preset: Some("HQ 720p30 Surround".into()),
            title: Some(4),
            ..TranscodeArgs::default()
        };
        let job = TranscodeJob::new("/usr/bin/HandBrakeCLI".into(), "in.mkv", "out.m4v").args(args);
        assert_eq!(
            job.build_args(),
            vec![
                "--input",
                "in.mkv",
                "--output",
                "out.m4v",
                "--preset",
                "HQ 720p30 Surround",
                "--title",
                "4",
            ]
        );
    }
}
