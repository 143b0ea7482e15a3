use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, OnceLock},
};

use crate::{errors::Error, utils::write_atomic, Result};

/// Durable, monotonic "last processed update id".
///
/// All access goes through this type. `advance` performs its read, compare
/// and write under one lock, and the write is atomic on disk, so a crash can
/// at worst cause the most recent update to be processed again.
///
/// The lock is shared by every cursor opened on the same path in this
/// process. Paths are compared as given, so open the file under one spelling.
#[derive(Debug)]
pub struct UpdateCursor {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl UpdateCursor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock = path_lock(&path);
        Self { path, lock }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current cursor value; 0 if it was never set.
    pub fn read(&self) -> Result<i64> {
        let _guard = self.guard();
        self.read_unlocked()
    }

    /// Persist `max(read(), candidate)` and return the resulting value.
    pub fn advance(&self, candidate: i64) -> Result<i64> {
        let _guard = self.guard();
        let current = self.read_unlocked()?;
        if candidate <= current {
            return Ok(current);
        }
        write_atomic(&self.path, candidate.to_string().as_bytes())?;
        Ok(candidate)
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded state lives on disk, so a poisoned lock carries no torn data.
        self.lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read_unlocked(&self) -> Result<i64> {
        let txt = match fs::read_to_string(&self.path) {
            Ok(txt) => txt,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let txt = txt.trim();
        if txt.is_empty() {
            return Ok(0);
        }
        txt.parse::<i64>().map_err(|_| {
            Error::Malformed(format!(
                "cursor file {} holds {txt:?}, not an integer",
                self.path.display()
            ))
        })
    }
}

fn path_lock(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    locks.entry(path.to_path_buf()).or_default().clone()
}
