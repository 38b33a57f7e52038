use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use crate::error::Error;
use crate::{OUTPUT_EXTENSIONS, SOURCE_EXTENSIONS};

/// Source and output media found directly inside a set of directories.
///
/// Every directory is treated as both a source and a destination. Sources
/// are matched by base name with the first directory listed winning; outputs
/// are only recorded by base name. Neither scan recurses, and `.dvdmedia` or
/// `.bluray` bundle directories count as sources.
#[derive(Debug, Default, Clone)]
pub struct Inventory {
    inputs: HashMap<String, PathBuf>,
    outputs: HashSet<String>,
}

impl Inventory {
    /// Lists each of `dirs`. Paths that are not directories are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Io` if a directory exists but cannot be read.
    pub fn scan<I, P>(dirs: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut inventory = Self::default();
        for dir in dirs {
            let dir = dir.as_ref();
            if !dir.is_dir() {
                continue;
            }
            for name in read_dir_names(dir)? {
                let path = Path::new(&name);
                let (Some(stem), Some(ext)) = (path.file_stem(), path.extension()) else {
                    continue;
                };
                let (Some(stem), Some(ext)) = (stem.to_str(), ext.to_str()) else {
                    continue;
                };
                let base: String = stem.nfd().collect();
                if has_extension(SOURCE_EXTENSIONS, ext) {
                    inventory
                        .inputs
                        .entry(base.clone())
                        .or_insert_with(|| dir.join(&name));
                }
                if has_extension(OUTPUT_EXTENSIONS, ext) {
                    inventory.outputs.insert(base);
                }
            }
        }
        Ok(inventory)
    }

    /// Full path of the source media named `source_base_name`, if online.
    pub fn input(&self, source_base_name: &str) -> Option<&Path> {
        let key: String = source_base_name.nfd().collect();
        self.inputs.get(&key).map(PathBuf::as_path)
    }

    /// True if an output named `output_base_name` was found or recorded.
    pub fn has_output(&self, output_base_name: &str) -> bool {
        let key: String = output_base_name.nfd().collect();
        self.outputs.contains(&key)
    }

    /// Records an output produced after the scan.
    pub fn record_output(&mut self, output_base_name: &str) {
        self.outputs.insert(output_base_name.nfd().collect());
    }
}

fn has_extension(known: &[&str], ext: &str) -> bool {
    known.iter().any(|k| k.trim_start_matches('.') == ext)
}

fn read_dir_names(dir: &Path) -> Result<Vec<String>, Error> {
    let io_error = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_sources_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("disc.dvdmedia")).unwrap();
        fs::write(dir.path().join("movie.mkv"), b"").unwrap();
        fs::write(dir.path().join("done.m4v"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let inventory = Inventory::scan([dir.path()]).unwrap();
        assert_eq!(
            inventory.input("disc"),
            Some(dir.path().join("disc.dvdmedia").as_path())
        );
        assert_eq!(
            inventory.input("movie"),
            Some(dir.path().join("movie.mkv").as_path())
        );
        assert!(inventory.input("notes").is_none());
        assert!(inventory.has_output("done"));
        assert!(!inventory.has_output("movie"));
    }

    #[test]
    fn test_first_directory_wins_for_inputs() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("movie.mkv"), b"").unwrap();
        fs::write(second.path().join("movie.mkv"), b"").unwrap();

        let inventory = Inventory::scan([first.path(), second.path()]).unwrap();
        assert_eq!(
            inventory.input("movie"),
            Some(first.path().join("movie.mkv").as_path())
        );
    }

    #[test]
    fn test_scan_does_not_recurse() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/done.m4v"), b"").unwrap();

        let inventory = Inventory::scan([dir.path()]).unwrap();
        assert!(!inventory.has_output("done"));
    }

    #[test]
    fn test_skips_non_directories() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.mkv");
        fs::write(&file, b"").unwrap();

        let inventory = Inventory::scan([file, dir.path().join("missing")]).unwrap();
        assert!(inventory.input("file").is_none());
    }

    #[test]
    fn test_record_output() {
        let mut inventory = Inventory::default();
        inventory.record_output("Am\u{e9}lie");
        assert!(inventory.has_output("Ame\u{301}lie"));
    }
}
