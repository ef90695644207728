//! Cross-process locks over cache paths.
//!
//! Each protected path gets a sidecar lock file `.{basename}.lock` in its
//! parent directory, so the path itself can be deleted or renamed while
//! the lock is held. A composite lock acquires its sub-locks in sorted
//! path order; two callers locking overlapping path sets therefore cannot
//! deadlock on ordering.
//!
//! This is a serialize-the-writer lock: only cache-mutating code takes it.
//! Readers rely on the cache manager's build-then-rename pattern instead.

use crate::error::{Error, Result};
use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Scoped lock over one or more cache paths.
///
/// Released on drop; an explicit [`Lock::release`] beforehand is
/// idempotent.
#[derive(Debug)]
pub struct Lock {
    held: Vec<File>,
}

impl Lock {
    /// Acquire locks for all `paths`, blocking up to `timeout` in total.
    ///
    /// If the locks are not obtained within `warning_timeout` a warning
    /// is logged once and waiting continues. On timeout every sub-lock
    /// already acquired is released before the error is returned; a
    /// composite lock is never partially held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTimeout`] naming the contended path when the
    /// budget is exhausted, or an IO error if a lock file cannot be
    /// created.
    pub fn acquire(
        paths: &[PathBuf],
        timeout: Duration,
        warning_timeout: Duration,
    ) -> Result<Self> {
        let mut ordered: Vec<&PathBuf> = paths.iter().collect();
        ordered.sort();
        ordered.dedup();

        let started = Instant::now();
        let mut warned = false;
        let mut held = Vec::with_capacity(ordered.len());

        for path in ordered {
            let file = open_lock_file(path)?;
            loop {
                match file.try_lock_exclusive() {
                    Ok(()) => break,
                    Err(err) if err.kind() == ErrorKind::WouldBlock => {
                        let elapsed = started.elapsed();
                        if !warned && elapsed >= warning_timeout && warning_timeout < timeout {
                            warn!(
                                path = %path.display(),
                                "lock could not be acquired immediately, \
                                 another process might be filling the same \
                                 cache entry, still trying"
                            );
                            warned = true;
                        }
                        if elapsed >= timeout {
                            // Held sub-locks unlock when `held` drops.
                            return Err(Error::LockTimeout {
                                path: path.clone(),
                                seconds: timeout.as_secs(),
                            });
                        }
                        thread::sleep(POLL_INTERVAL.min(timeout.saturating_sub(elapsed)));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            held.push(file);
        }

        Ok(Self { held })
    }

    /// Release all sub-locks. Safe to call more than once.
    pub fn release(&mut self) {
        for file in self.held.drain(..) {
            let _ = file.unlock();
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Sidecar lock-file path for a protected path.
#[must_use]
pub fn lock_file_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let basename = path
        .file_name()
        .map_or_else(|| ".lock".to_string(), |name| name.to_string_lossy().to_string());
    parent.join(format!(".{basename}.lock"))
}

fn open_lock_file(path: &Path) -> Result<File> {
    let lock_path = lock_file_path(path);
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&lock_path)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier};
    use tempfile::TempDir;

    fn second(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_lock_file_path_is_sidecar() {
        let path = Path::new("/cache/5fbbaf38/1.0.0");
        assert_eq!(
            lock_file_path(path),
            PathBuf::from("/cache/5fbbaf38/.1.0.0.lock")
        );
    }

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry");

        let mut lock = Lock::acquire(&[path.clone()], second(5), second(1)).unwrap();
        lock.release();
        // Idempotent double release.
        lock.release();

        // Lock file stays behind, the entry can be re-locked.
        assert!(lock_file_path(&path).exists());
        let _relock = Lock::acquire(&[path], second(5), second(1)).unwrap();
    }

    #[test]
    fn test_contended_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry");

        let _held = Lock::acquire(&[path.clone()], second(5), second(1)).unwrap();

        let (tx, rx) = mpsc::channel();
        let contender = thread::spawn(move || {
            let result = Lock::acquire(&[path], Duration::from_millis(300), second(0));
            tx.send(result.is_err()).unwrap();
        });
        assert!(rx.recv_timeout(second(10)).unwrap());
        contender.join().unwrap();
    }

    #[test]
    fn test_timeout_releases_partial_locks() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");

        // Hold only `b`; a composite [a, b] acquisition gets `a`, times
        // out on `b`, and must give `a` back.
        let held_b = Lock::acquire(&[b.clone()], second(5), second(1)).unwrap();
        let result = Lock::acquire(
            &[a.clone(), b.clone()],
            Duration::from_millis(200),
            second(0),
        );
        assert!(matches!(result, Err(Error::LockTimeout { .. })));
        drop(held_b);

        // `a` must be free again immediately.
        let _lock_a = Lock::acquire(&[a], Duration::from_millis(200), second(0)).unwrap();
    }

    #[test]
    fn test_overlapping_composite_locks_do_not_deadlock() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = Vec::new();
        for paths in [vec![a.clone(), b.clone()], vec![b, a]] {
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..20 {
                    let lock = Lock::acquire(&paths, second(10), second(5)).unwrap();
                    drop(lock);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_duplicate_paths_collapse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entry");
        let _lock =
            Lock::acquire(&[path.clone(), path], second(5), second(1)).unwrap();
    }
}
