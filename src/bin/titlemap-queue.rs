//! Symlink source videos named by titlemap input into a queue directory.
//!
//! Each title's source is looked up in the given source dirs in order; the
//! first match is linked into the queue under its own file name, so titles
//! sharing a source share one link.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error, info};

use titlemap::{Error, ParseOutcome, TitleRecord};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Dir for queueing source videos [default: ~/Queue]
    #[arg(long)]
    queue: Option<PathBuf>,
    /// Dirs with source videos
    #[arg(default_value = "./")]
    source_dirs: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    let cli = Cli::parse();

    match run(&cli, io::stdin().lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn default_queue_dir() -> Result<PathBuf, Error> {
    dirs::home_dir()
        .map(|home| home.join("Queue"))
        .ok_or_else(|| Error::Io {
            path: PathBuf::from("~"),
            source: io::Error::new(io::ErrorKind::NotFound, "home directory not found"),
        })
}

fn run(cli: &Cli, input: impl BufRead) -> Result<(), Error> {
    let queue_dir = match &cli.queue {
        Some(dir) => dir.clone(),
        None => default_queue_dir()?,
    };

    for line in input.lines() {
        let line = line.map_err(|source| Error::Io {
            path: PathBuf::from("<stdin>"),
            source,
        })?;
        let (title, outcome) = titlemap::parse(&line);
        if outcome == ParseOutcome::Blank {
            continue;
        }
        match queue(&title, &cli.source_dirs, &queue_dir)? {
            Some(link) => info!(link = %link.display(), "queued {}", title.source_base_name),
            None => debug!("offline {}", title.source_base_name),
        }
    }
    Ok(())
}

/// Links the first source found for `title` into `queue_dir`. Returns the
/// link path, or `None` if no source dir has the title's source.
fn queue(title: &TitleRecord, source_dirs: &[PathBuf], queue_dir: &Path) -> Result<Option<PathBuf>, Error> {
    let Some(source) = source_dirs.iter().find_map(|dir| title.source_in(dir)) else {
        return Ok(None);
    };
    let io_error = |path: &Path, source| Error::Io {
        path: path.to_path_buf(),
        source,
    };

    let original = std::path::absolute(&source).map_err(|e| io_error(&source, e))?;
    let Some(file_name) = source.file_name() else {
        return Ok(None);
    };
    let link = queue_dir.join(file_name);

    match symlink(&original, &link) {
        Ok(()) => Ok(Some(link)),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(Some(link)),
        Err(e) => Err(io_error(&link, e)),
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    if original.is_dir() {
        std::os::windows::fs::symlink_dir(original, link)
    } else {
        std::os::windows::fs::symlink_file(original, link)
    }
}
