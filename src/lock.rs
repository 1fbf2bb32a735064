use fs2::FileExt;
use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Per-clone lock guard that removes the lock file on drop.
///
/// Lifecycle operations on one clone name must not overlap (the socket directory reset is
/// remove-then-recreate); distinct clone names need no coordination.
#[derive(Debug)]
pub struct CloneLock {
    file: File,
    path: PathBuf,
}

impl CloneLock {
    /// Take a non-blocking exclusive lock on `<lock_dir>/<clone>.lock`.
    pub fn acquire(lock_dir: &Path, clone_name: &str) -> io::Result<CloneLock> {
        if matches!(clone_name, "" | "." | "..") || clone_name.contains(['/', '\\', '\0']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid clone name for lock: {clone_name:?}"),
            ));
        }
        acquire_lock_at(&lock_dir.join(format!("{clone_name}.lock")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CloneLock {
    fn drop(&mut self) {
        // Best-effort unlock; ignore errors
        let _ = self.file.unlock();

        // Try removal with brief retries (avoid background threads to keep tests leak-free)
        for _ in 0..10 {
            if !self.path.exists() {
                break;
            }
            if fs::remove_file(&self.path).is_ok() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
        }
    }
}

/// Acquire a lock at a specific path.
pub fn acquire_lock_at(p: &Path) -> io::Result<CloneLock> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent)?;
    }
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(p)?;
    match f.try_lock_exclusive() {
        Ok(()) => {
            tracing::debug!(path = %p.display(), "clone lock acquired");
            Ok(CloneLock {
                file: f,
                path: p.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!(
                "another lifecycle operation holds {} (lock held). Please try again later.",
                p.display()
            ),
        )),
        Err(e) => Err(e),
    }
}

/// Return true if lifecycle commands should take the per-clone lock.
/// Honor DBLAB_SKIP_LOCK=1 when an outer scheduler already serializes per clone.
pub fn should_acquire_lock() -> bool {
    env::var("DBLAB_SKIP_LOCK").ok().as_deref() != Some("1")
}

/// Default lock directory: `$XDG_RUNTIME_DIR/dblab/locks`, else the temp dir.
pub fn default_lock_dir() -> PathBuf {
    env::var("XDG_RUNTIME_DIR")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
        .join("dblab")
        .join("locks")
}
