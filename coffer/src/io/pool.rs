//! Pooled data file handles
//!
//! Readers of a data file each need their own position within it, so a handle is checked out
//! for the duration of a read and returned afterwards. Handles are opened lazily, never more
//! than the pool's concurrency. When every handle is checked out, callers wait for one to be
//! returned.

use std::fs::File;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use parking_lot::{Condvar, Mutex};

use crate::error::{CofferError, Result};

#[derive(Debug, Default)]
struct PoolState {
    idle: Vec<File>,
    open: u16,
}

/// A bounded pool of read handles for one data file.
#[derive(Debug)]
pub struct FilePool {
    path: PathBuf,
    concurrency: u16,
    state: Mutex<PoolState>,
    returned: Condvar,
}

impl FilePool {
    /// Create a pool for the file at `path` which opens at most `concurrency` handles.
    pub fn try_new<P: AsRef<Path>>(path: P, concurrency: u16) -> Result<Self> {
        if concurrency == 0 {
            return Err(CofferError::InvalidInput(
                "file pool concurrency must be > 0".to_string(),
            ));
        }
        let path = path.as_ref().to_path_buf();
        tracing::debug!(
            "Creating file pool for: {} with: {concurrency} handles",
            path.display()
        );
        Ok(Self {
            path,
            concurrency,
            state: Mutex::new(PoolState::default()),
            returned: Condvar::new(),
        })
    }

    /// Path of the pooled file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most handles the pool will open.
    pub fn concurrency(&self) -> u16 {
        self.concurrency
    }

    /// Handles opened so far.
    pub fn open_count(&self) -> u16 {
        self.state.lock().open
    }

    /// Check out a handle, waiting if they are all in use.
    pub fn get(&self) -> Result<FileHandle<'_>> {
        let mut state = self.state.lock();
        loop {
            if let Some(file) = state.idle.pop() {
                return Ok(FileHandle {
                    pool: self,
                    file: Some(file),
                });
            }
            if state.open < self.concurrency {
                state.open += 1;
                // Don't hold the lock while opening
                drop(state);
                return match File::open(&self.path) {
                    Ok(file) => {
                        tracing::debug!("Opened handle for: {}", self.path.display());
                        Ok(FileHandle {
                            pool: self,
                            file: Some(file),
                        })
                    }
                    Err(e) => {
                        let mut state = self.state.lock();
                        state.open -= 1;
                        self.returned.notify_one();
                        Err(CofferError::FileOpenFail(e))
                    }
                };
            }
            self.returned.wait(&mut state);
        }
    }

    fn put(&self, file: File) {
        self.state.lock().idle.push(file);
        self.returned.notify_one();
    }
}

/// A checked out handle, returned to its pool when dropped.
#[derive(Debug)]
pub struct FileHandle<'a> {
    pool: &'a FilePool,
    file: Option<File>,
}

impl Deref for FileHandle<'_> {
    type Target = File;

    fn deref(&self) -> &File {
        // Only None once dropped
        self.file.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for FileHandle<'_> {
    fn deref_mut(&mut self) -> &mut File {
        self.file.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for FileHandle<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            self.pool.put(file);
        }
    }
}
