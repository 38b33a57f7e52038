use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::OUTPUT_EXTENSIONS;
use crate::error::Error;

/// Output base name -> directory containing it, relative to the root.
type Listing = HashMap<String, PathBuf>;

/// Lists the regular files under a root directory.
pub trait DirectoryWalker: Send + Sync {
    /// Walks `root` recursively, returning the path of every regular file.
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, Error>;
}

/// Walks the real filesystem, in file-name order within each directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsWalker;

impl DirectoryWalker for FsWalker {
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>, Error> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Walk {
                root: root.to_path_buf(),
                source: e,
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }
}

/// Scan state of one root. `None` until the first lookup, and again after
/// [`DestinationIndex::invalidate`].
#[derive(Debug, Default)]
struct RootSlot {
    listing: Mutex<Option<Arc<Listing>>>,
}

/// Answers "does output X already exist anywhere under root R".
///
/// Each root is walked once, on first use, and the result is kept until the
/// caller invalidates it. Lookups against different roots never wait on each
/// other; concurrent first lookups against the same root share one walk.
///
/// When several files under a root share a base name, the one visited last
/// by the walk wins.
#[derive(Debug, Default)]
pub struct DestinationIndex<W = FsWalker> {
    walker: W,
    roots: Mutex<HashMap<PathBuf, Arc<RootSlot>>>,
}

impl DestinationIndex {
    /// Creates an empty index over the real filesystem.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<W: DirectoryWalker> DestinationIndex<W> {
    /// Creates an empty index that lists roots with `walker`.
    pub fn with_walker(walker: W) -> Self {
        Self {
            walker,
            roots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the walker, e.g. to inspect a test double.
    pub fn walker(&self) -> &W {
        &self.walker
    }

    /// Walks `root` unless it has already been walked since creation or the
    /// last [`invalidate`](Self::invalidate).
    ///
    /// # Errors
    ///
    /// Returns the walk error; the root stays unscanned.
    pub fn ensure_scanned(&self, root: &Path) -> Result<(), Error> {
        self.listing(root).map(|_| ())
    }

    /// Returns the directory, relative to `root`, that holds an output file
    /// named `output_base_name` with a recognised output extension.
    ///
    /// # Errors
    ///
    /// `NotFound` on a miss, or the walk error if `root` had to be scanned
    /// and could not be.
    pub fn find(&self, root: &Path, output_base_name: &str) -> Result<PathBuf, Error> {
        let listing = self.listing(root)?;
        let key: String = output_base_name.nfd().collect();
        listing.get(&key).cloned().ok_or_else(|| Error::NotFound {
            root: root.to_path_buf(),
            name: output_base_name.to_string(),
        })
    }

    /// True iff [`find`](Self::find) succeeds.
    pub fn exists_under(&self, root: &Path, output_base_name: &str) -> bool {
        self.find(root, output_base_name).is_ok()
    }

    /// Forgets the scan of `root`; the next lookup walks it again.
    pub fn invalidate(&self, root: &Path) {
        let slot = lock(&self.roots).get(root).cloned();
        if let Some(slot) = slot {
            *lock(&slot.listing) = None;
        }
    }

    fn slot(&self, root: &Path) -> Arc<RootSlot> {
        let mut roots = lock(&self.roots);
        Arc::clone(roots.entry(root.to_path_buf()).or_default())
    }

    fn listing(&self, root: &Path) -> Result<Arc<Listing>, Error> {
        let slot = self.slot(root);
        // held across the walk so concurrent callers for this root wait for it
        let mut listing = lock(&slot.listing);
        if let Some(existing) = listing.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let scanned = Arc::new(self.scan(root)?);
        *listing = Some(Arc::clone(&scanned));
        Ok(scanned)
    }

    fn scan(&self, root: &Path) -> Result<Listing, Error> {
        let mut listing = Listing::new();
        for path in self.walker.walk(root)? {
            if !has_output_extension(&path) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let dir = path
                .parent()
                .map(|parent| parent.strip_prefix(root).unwrap_or(parent).to_path_buf())
                .unwrap_or_default();
            listing.insert(stem.nfd().collect(), dir);
        }
        Ok(listing)
    }
}

fn has_output_extension(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    OUTPUT_EXTENSIONS
        .iter()
        .any(|known| known.trim_start_matches('.') == ext)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
