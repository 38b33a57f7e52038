use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::destination::{DirectoryWalker, FsWalker};
use crate::error::Error;

/// Wraps a walker and counts how many walks were started.
#[derive(Debug, Default)]
pub struct CountingWalker<W = FsWalker> {
    inner: W,
    walks: AtomicUsize,
    delay: Option<Duration>,
}

impl<W> CountingWalker<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            walks: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Sleeps before each walk, widening the window for racing callers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of walks started so far, including failed ones.
    pub fn walks(&self) -> usize {
        self.walks.load(Ordering::SeqCst)
    }
}

impl<W: DirectoryWalker> DirectoryWalker for CountingWalker<W> {
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, Error> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        self.inner.walk(root)
    }
}

/// Returns a fixed file list for every root, without touching the disk.
#[derive(Debug, Default, Clone)]
pub struct FixedWalker {
    files: Vec<PathBuf>,
}

impl FixedWalker {
    pub fn new<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }
}

impl DirectoryWalker for FixedWalker {
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, Error> {
        Ok(self.files.iter().map(|f| root.join(f)).collect())
    }
}
