use crate::error::Error;
use crate::event::JobEvent;
use async_stream::stream;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{Mutex, mpsc};

/// Stops a running `HandBrakeCLI` process. Cheap to clone, so it can be
/// handed to a signal handler while the job's events are being consumed.
#[derive(Debug, Clone)]
pub struct JobControl {
    /// Captured at spawn; the process leads its own process group.
    pub(crate) pid: Option<u32>,
    pub(crate) child: Arc<Mutex<Child>>,
}

impl JobControl {
    /// Asks `HandBrakeCLI` to stop, letting it clean up.
    ///
    /// - On Unix, it sends `SIGINT` to the job's process group.
    /// - On Windows, it sends a `CTRL_C_EVENT`.
    ///
    /// # Errors
    ///
    /// Returns an `Error` if the control signal could not be sent, for example if the
    /// process has already terminated.
    pub fn cancel(&self) -> Result<(), Error> {
        let pid = self.pid.ok_or(Error::ControlFailed {
            action: "cancel",
            source: io::Error::new(io::ErrorKind::NotFound, "Process already exited"),
        })?;

        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;
            return signal::killpg(Pid::from_raw(pid as i32), Signal::SIGINT).map_err(|e| {
                Error::ControlFailed {
                    action: "cancel",
                    source: io::Error::from_raw_os_error(e as i32),
                }
            });
        }

        #[cfg(windows)]
        {
            const CTRL_C_EVENT: u32 = 0;
            // CREATE_NEW_PROCESS_GROUP makes the group id equal to the pid
            let result = unsafe {
                windows_sys::Win32::System::Console::GenerateConsoleCtrlEvent(CTRL_C_EVENT, pid)
            };
            return if result == 0 {
                Err(Error::ControlFailed {
                    action: "cancel",
                    source: io::Error::last_os_error(),
                })
            } else {
                Ok(())
            };
        }

        #[cfg(not(any(unix, windows)))]
        {
            let _ = pid;
            Err(Error::ControlFailed {
                action: "cancel",
                source: io::Error::new(
                    io::ErrorKind::Unsupported,
                    "Cancel is not supported on this platform",
                ),
            })
        }
    }

    /// Forcefully terminates the `HandBrakeCLI` process immediately, likely
    /// leaving a truncated output file behind.
    ///
    /// # Errors
    ///
    /// Returns an `Error` if the process could not be killed.
    pub async fn kill(&self) -> Result<(), Error> {
        let mut child = self.child.lock().await;
        child.kill().await.map_err(|e| Error::ControlFailed {
            action: "kill",
            source: e,
        })
    }
}

/// A handle to a running transcode: its events plus a [`JobControl`].
#[derive(Debug)]
pub struct JobHandle {
    pub(crate) control: JobControl,
    pub(crate) event_rx: mpsc::Receiver<JobEvent>,
}

impl JobHandle {
    /// Returns a control for stopping the job from elsewhere.
    pub fn control(&self) -> JobControl {
        self.control.clone()
    }

    /// See [`JobControl::cancel`].
    pub fn cancel(&self) -> Result<(), Error> {
        self.control.cancel()
    }

    /// See [`JobControl::kill`].
    pub async fn kill(&self) -> Result<(), Error> {
        self.control.kill().await
    }

    /// Returns an async stream of `JobEvent`s, ending after `JobEvent::Done`.
    pub fn events(&mut self) -> Pin<Box<impl Stream<Item = JobEvent> + '_>> {
        let s = stream! {
            while let Some(event) = self.event_rx.recv().await {
                yield event;
            }
        };
        Box::pin(s)
    }
}
