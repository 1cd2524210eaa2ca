//! Flat-file store.
//!
//! Set files live at `<data_dir>/<condition>/<chain>/<generation><d|s>`.
//! Every single read and every single write holds an exclusive advisory lock
//! for its own duration only.
//!
//! [`FlatFileStore::append`] is read-then-concatenate-then-write and is NOT
//! atomic: the lock is released between the read and the write, so two
//! concurrent appends to the same file can both read the same prior content
//! and one of the two lines is lost. Callers that need single-writer
//! semantics serialize through [`PathLocks`].

use crate::error::{StoreError, StoreResult};
use crate::types::{Condition, SetKind};
use fs2::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Result of reading a store file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Non-empty content
    Content(String),
    /// The file exists but holds zero bytes ("not yet written")
    Empty,
    /// The file does not exist
    NotFound,
}

impl ReadOutcome {
    /// Content as a string slice; empty for both `Empty` and `NotFound`
    pub fn as_str(&self) -> &str {
        match self {
            ReadOutcome::Content(content) => content,
            ReadOutcome::Empty | ReadOutcome::NotFound => "",
        }
    }

    pub fn exists(&self) -> bool {
        !matches!(self, ReadOutcome::NotFound)
    }
}

/// Locked read/write/append primitives over per-chain, per-generation set files
#[derive(Debug, Clone)]
pub struct FlatFileStore {
    root: PathBuf,
}

impl FlatFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every generation of one chain
    pub fn chain_dir(&self, condition: Condition, chain: &str) -> PathBuf {
        self.root.join(condition.to_string()).join(chain)
    }

    /// Path of one generation's dynamic or stable set file
    pub fn set_path(&self, condition: Condition, chain: &str, generation: u32, set: SetKind) -> PathBuf {
        self.chain_dir(condition, chain)
            .join(format!("{}{}", generation, set.code()))
    }

    /// Read a whole file under an exclusive lock
    pub fn read(&self, path: &Path) -> StoreResult<ReadOutcome> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReadOutcome::NotFound)
            }
            Err(err) => return Err(StoreError::io(path, err)),
        };

        file.lock_exclusive().map_err(|e| StoreError::io(path, e))?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content);
        FileExt::unlock(&file).map_err(|e| StoreError::io(path, e))?;
        read.map_err(|e| StoreError::io(path, e))?;

        if content.is_empty() {
            Ok(ReadOutcome::Empty)
        } else {
            Ok(ReadOutcome::Content(content))
        }
    }

    /// Replace a file's content under an exclusive lock. The file must exist.
    pub fn write(&self, path: &Path, content: &str) -> StoreResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        file.lock_exclusive().map_err(|e| StoreError::io(path, e))?;
        let written = file
            .set_len(0)
            .and_then(|_| file.write_all(content.as_bytes()))
            .and_then(|_| file.flush());
        FileExt::unlock(&file).map_err(|e| StoreError::io(path, e))?;
        written.map_err(|e| StoreError::io(path, e))?;

        debug!(path = %path.display(), bytes = content.len(), "wrote store file");
        Ok(())
    }

    /// Append one line: read, concatenate with a newline, trim, write back.
    ///
    /// Not atomic across the read and the write; see the module docs.
    pub fn append(&self, path: &Path, line: &str) -> StoreResult<()> {
        let current = match self.read(path)? {
            ReadOutcome::NotFound => return Err(StoreError::NotFound(path.to_path_buf())),
            other => other,
        };
        let combined = format!("{}\n{}", current.as_str(), line);
        self.write(path, combined.trim())
    }

    /// Append to a log file, creating it (and its parents) on first use
    pub fn append_log(&self, path: &Path, line: &str) -> StoreResult<()> {
        self.ensure(path)?;
        self.append(path, line)
    }

    /// Create an empty file if missing. Returns whether it was created.
    /// Existing files are never truncated.
    pub fn ensure(&self, path: &Path) -> StoreResult<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;
        Ok(true)
    }

    /// Create the empty dynamic and stable files for each generation of a
    /// chain. Returns how many files were newly created.
    pub fn provision(
        &self,
        condition: Condition,
        chain: &str,
        generations: RangeInclusive<u32>,
    ) -> StoreResult<usize> {
        let mut created = 0;
        for generation in generations {
            for set in [SetKind::Dynamic, SetKind::Stable] {
                if self.ensure(&self.set_path(condition, chain, generation, set))? {
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    /// Whether a file exists and is not read-only
    pub fn is_writable(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|meta| meta.is_file() && !meta.permissions().readonly())
            .unwrap_or(false)
    }

    /// Number of non-empty lines, or `None` when the file is missing
    pub fn line_count(&self, path: &Path) -> StoreResult<Option<usize>> {
        Ok(match self.read(path)? {
            ReadOutcome::NotFound => None,
            outcome => Some(outcome.as_str().lines().filter(|l| !l.is_empty()).count()),
        })
    }
}

/// In-process single-writer-per-path lock table
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `path`
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut table = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            table.entry(path.to_path_buf()).or_default().clone()
        };
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f()
    }
}
