//! Transcode missing videos using titlemap input.
//!
//! Stdin carries titlemap lines. The arguments list directories holding
//! both source and transcoded videos. Titles whose source is not found are
//! skipped, as are titles whose output already exists.

mod console;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use futures::StreamExt;
use tempfile::TempPath;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use console::Console;
use titlemap::{
    Error, HandBrake, Inventory, JobEvent, ParseOutcome, TitleRecord, TranscodeArgs,
};

const OUTPUT_EXT: &str = ".m4v";
const LOG_EXT: &str = ".log";
const LOG_ARCHIVE_DIR: &str = ",log";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Dir for transcode output; without it titles are only listed
    #[arg(long)]
    outputdir: Option<PathBuf>,
    /// Dir for transcode logs [default: <outputdir>/,log if present, else <outputdir>]
    #[arg(long)]
    logdir: Option<PathBuf>,
    /// Show transcode progress
    #[arg(long)]
    progress: bool,
    /// Hide inactionable output
    #[arg(long)]
    quiet: bool,
    /// Output with colors
    #[arg(long)]
    color: bool,
    /// HandBrakeCLI executable [default: search PATH]
    #[arg(long)]
    handbrake: Option<PathBuf>,
    /// Defaults for every title; a title's own arguments override them
    #[command(flatten)]
    transcode: TranscodeArgs,
    /// Dirs with source and transcoded videos
    dirs: Vec<PathBuf>,
}

/// Stop after the current transcode; stop now.
#[derive(Clone, Default)]
struct Shutdown {
    finish: CancellationToken,
    abort: CancellationToken,
}

impl Shutdown {
    fn listen(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            let mut signals = match Signals::new() {
                Ok(signals) => signals,
                Err(e) => {
                    warn!("cannot listen for signals: {}", e);
                    return;
                }
            };
            if signals.recv().await.is_err() {
                return;
            }
            warn!("quitting after this transcode");
            shutdown.finish.cancel();
            if signals.recv().await.is_err() {
                return;
            }
            warn!("quitting now");
            shutdown.abort.cancel();
        });
    }
}

/// Interrupt, plus `SIGTERM` on unix.
struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => result,
                received = self.terminate.recv() => match received {
                    Some(()) => Ok(()),
                    None => Err(std::io::Error::other("SIGTERM stream closed")),
                },
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await
        }
    }
}

struct Run {
    cli: Cli,
    console: Console,
    inventory: Inventory,
    handbrake: Option<HandBrake>,
    log_dir: Option<PathBuf>,
    shutdown: Shutdown,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let inventory = Inventory::scan(&cli.dirs)?;

    let handbrake = match (&cli.outputdir, &cli.handbrake) {
        (None, _) => None,
        (Some(_), Some(path)) => Some(HandBrake::new_with_path(path).await?),
        (Some(_), None) => Some(HandBrake::new().await?),
    };
    if let Some(hb) = &handbrake {
        info!(version = hb.version(), "found HandBrakeCLI");
    }

    let log_dir = cli.outputdir.as_ref().map(|output_dir| {
        cli.logdir.clone().unwrap_or_else(|| {
            let archive = output_dir.join(LOG_ARCHIVE_DIR);
            if archive.is_dir() {
                archive
            } else {
                output_dir.clone()
            }
        })
    });

    let shutdown = Shutdown::default();
    shutdown.listen();

    let mut session = Run {
        console: Console { color: cli.color },
        cli,
        inventory,
        handbrake,
        log_dir,
        shutdown,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !session.shutdown.finish.is_cancelled() {
        let line = tokio::select! {
            line = lines.next_line() => line.map_err(|e| Error::Io {
                path: PathBuf::from("<stdin>"),
                source: e,
            })?,
            _ = session.shutdown.finish.cancelled() => break,
        };
        let Some(line) = line else {
            break;
        };
        let (title, outcome) = titlemap::parse(&line);
        if outcome == ParseOutcome::Blank {
            continue;
        }
        session.title(title).await?;
    }
    Ok(())
}

impl Run {
    async fn title(&mut self, title: TitleRecord) -> Result<(), Error> {
        if self.inventory.has_output(&title.output_base_name) {
            if !self.cli.quiet {
                info!("{}", self.console.processed(&title));
            }
            return Ok(());
        }

        let Some(input) = self.inventory.input(&title.source_base_name).map(Path::to_path_buf) else {
            if !self.cli.quiet {
                info!("{}", self.console.offline(&title));
            }
            return Ok(());
        };

        let args = self.cli.transcode.with(title.transcode_arguments()?)?;

        let (Some(output_dir), Some(log_dir), Some(handbrake)) =
            (&self.cli.outputdir, &self.log_dir, &self.handbrake)
        else {
            if !self.cli.quiet {
                info!("{}", self.console.todo(&title));
            }
            return Ok(());
        };

        let file_name = format!("{}{}", title.output_base_name, OUTPUT_EXT);
        let final_output = output_dir.join(&file_name);
        let final_log = log_dir.join(format!("{}{}", file_name, LOG_EXT));

        info!("{}", self.console.processing(&title, &args.to_args()));
        let started = Instant::now();

        self.transcode(handbrake, &input, args, &final_output, &final_log)
            .await?;

        self.inventory.record_output(&title.output_base_name);
        info!("{}", self.console.just_processed(&title, started.elapsed()));
        Ok(())
    }

    /// Transcodes into a temporary name beside `final_output`, then renames
    /// output and log into place. Both temporaries are removed on failure.
    async fn transcode(
        &self,
        handbrake: &HandBrake,
        input: &Path,
        args: TranscodeArgs,
        final_output: &Path,
        final_log: &Path,
    ) -> Result<(), Error> {
        let temp_output = temp_path_near(final_output)?;
        let mut temp_log_name = temp_output.as_os_str().to_owned();
        temp_log_name.push(LOG_EXT);
        let temp_log = TempPath::try_from_path(PathBuf::from(&temp_log_name)).map_err(|e| {
            Error::Io {
                path: PathBuf::from(temp_log_name),
                source: e,
            }
        })?;

        let mut handle = handbrake
            .job(input, temp_output.to_path_buf())
            .args(args)
            .log_file(temp_log.to_path_buf())
            .start()
            .await?;

        let control = handle.control();
        let abort = self.shutdown.abort.clone();
        let canceller = tokio::spawn(async move {
            abort.cancelled().await;
            if let Err(e) = control.cancel() {
                warn!("{}", e);
            }
        });

        let mut outcome = None;
        let mut events = handle.events();
        while let Some(event) = events.next().await {
            match event {
                JobEvent::Progress(p) if self.cli.progress => {
                    eprint!("\r{}{}", p.raw, self.console.clear_to_end_of_line());
                    let _ = std::io::stderr().flush();
                }
                JobEvent::Config(config) => {
                    tracing::debug!(?config, "job config");
                }
                JobEvent::Log(log) => {
                    tracing::debug!(line = %log.message, "HandBrakeCLI stderr");
                }
                JobEvent::Done(result) => {
                    outcome = Some(result);
                    break;
                }
                _ => {}
            }
        }
        canceller.abort();
        if self.cli.progress {
            eprintln!();
        }

        let failure = match outcome {
            Some(Ok(status)) if status.success() => None,
            Some(Ok(status)) => Some(format!("exit status {}", status)),
            Some(Err(failure)) => Some(failure.message),
            None => Some("event stream ended early".to_string()),
        };
        if let Some(reason) = failure {
            return Err(Error::TranscodeFailed {
                input: input.to_path_buf(),
                reason,
            });
        }

        persist(temp_output, final_output)?;
        persist(temp_log, final_log)?;
        Ok(())
    }
}

/// Reserves a unique `<stem>-XXXXXX<ext>` name in `path`'s directory.
fn temp_path_near(path: &Path) -> Result<TempPath, Error> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    tempfile::Builder::new()
        .prefix(&format!("{}-", stem))
        .suffix(&ext)
        .tempfile_in(dir)
        .map(|file| file.into_temp_path())
        .map_err(|e| Error::Io {
            path: dir.to_path_buf(),
            source: e,
        })
}

fn persist(temp: TempPath, dest: &Path) -> Result<(), Error> {
    temp.persist(dest).map_err(|e| Error::Io {
        path: dest.to_path_buf(),
        source: e.error,
    })
}
