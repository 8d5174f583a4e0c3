use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(300);

/// Lock holder metadata, written inside the lock directory for diagnostics.
/// Advisory only: the directory's existence is the lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: String,   // ISO-8601, for humans
    pub acquired_at_ts: f64,   // unix seconds, for staleness math
    pub path: String,
}

/// Cross-process mutual exclusion via an atomic `create_dir` on any shared
/// filesystem. Locks left behind by crashed holders are reclaimed.
pub struct DirLock {
    pub path: PathBuf,      // the resource being protected
    pub lock_dir: PathBuf,  // "<path>.lock"
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub stale_threshold: Duration,
    held: bool,
}

impl DirLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_dir = path.clone().into_os_string();
        lock_dir.push(".lock");

        DirLock {
            path,
            lock_dir: PathBuf::from(lock_dir),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_threshold: DEFAULT_STALE_THRESHOLD,
            held: false,
        }
    }

    pub fn with_timeouts(
        path: impl Into<PathBuf>,
        timeout: Duration,
        poll_interval: Duration,
        stale_threshold: Duration,
    ) -> Self {
        let mut lock = DirLock::new(path);
        lock.timeout = timeout;
        lock.poll_interval = poll_interval;
        lock.stale_threshold = stale_threshold;
        lock
    }

    fn holder_path(&self) -> PathBuf {
        self.lock_dir.join("holder.json")
    }

    /// Try once, without waiting.
    pub fn try_acquire(&mut self) -> Result<bool> {
        self.acquire_inner(false)
    }

    /// Wait up to `timeout` for the lock. Fails with a `LockTimeout` error
    /// naming the last-known holder.
    pub fn acquire(&mut self) -> Result<()> {
        match self.acquire_inner(true)? {
            true => Ok(()),
            // acquire_inner(blocking) only returns false via the timeout error
            false => unreachable!(),
        }
    }

    fn acquire_inner(&mut self, blocking: bool) -> Result<bool> {
        let start = Instant::now();

        loop {
            match fs::create_dir(&self.lock_dir) {
                Ok(()) => {
                    self.write_holder();
                    self.held = true;
                    log::debug!("lock acquired: {:?}", self.lock_dir);
                    return Ok(true);
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    if self.reclaim_if_stale() {
                        continue; // reclaimed, retry immediately
                    }

                    if !blocking {
                        return Ok(false);
                    }
                    if start.elapsed() >= self.timeout {
                        return Err(Error::lock_timeout(format!(
                            "could not acquire lock on {} after {:.1}s (holder: {})",
                            self.path.display(),
                            self.timeout.as_secs_f64(),
                            self.holder_description(),
                        )));
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remove metadata, then the lock directory. No-op when not held.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        let holder = self.holder_path();
        if holder.exists() {
            let _ = fs::remove_file(&holder);
        }
        if let Err(e) = fs::remove_dir(&self.lock_dir) {
            log::warn!("error releasing lock {:?}: {}", self.lock_dir, e);
        } else {
            log::debug!("lock released: {:?}", self.lock_dir);
        }
        self.held = false;
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    fn write_holder(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Utc::now().to_rfc3339(),
            acquired_at_ts: now,
            path: self.path.display().to_string(),
        };
        // Non-critical: the lock is held whether or not metadata lands.
        if let Ok(data) = serde_json::to_vec(&holder) {
            let _ = fs::write(self.holder_path(), data);
        }
    }

    fn read_holder(&self) -> Option<LockHolder> {
        let raw = fs::read_to_string(self.holder_path()).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn holder_description(&self) -> String {
        match self.read_holder() {
            Some(h) => format!("pid={}, acquired={}", h.pid, h.acquired_at),
            None => "unknown".to_string(),
        }
    }

    /// Reclaim the lock if its holder appears to have crashed.
    ///
    /// Check order: missing metadata is reclaimable once the directory
    /// itself outlives the stale threshold; a verifiably dead holder is
    /// reclaimed immediately regardless of age; otherwise the stored
    /// numeric timestamp decides. A live holder is never reclaimed early.
    fn reclaim_if_stale(&self) -> bool {
        let holder = match self.read_holder() {
            Some(holder) => holder,
            None => {
                // Crashed between create_dir and metadata write, or corrupt
                // metadata. Grace window = directory age.
                let age = fs::metadata(&self.lock_dir)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|m| m.elapsed().ok());
                if age.is_some_and(|a| a > self.stale_threshold) {
                    log::warn!(
                        "breaking metadata-less lock on {} (dir age exceeds stale threshold)",
                        self.path.display()
                    );
                    self.force_break();
                    return true;
                }
                return false;
            }
        };

        if holder.pid != std::process::id() && !process_alive(holder.pid) {
            log::warn!(
                "breaking orphaned lock on {} (holder pid={} no longer exists)",
                self.path.display(),
                holder.pid
            );
            self.force_break();
            return true;
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let age = now - holder.acquired_at_ts;
        if age > self.stale_threshold.as_secs_f64() {
            log::warn!(
                "breaking stale lock on {} (held by pid={} for {:.0}s)",
                self.path.display(),
                holder.pid,
                age
            );
            self.force_break();
            return true;
        }

        false
    }

    fn force_break(&self) {
        let holder = self.holder_path();
        if holder.exists() {
            let _ = fs::remove_file(&holder);
        }
        let _ = fs::remove_dir(&self.lock_dir);
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if self.held {
            self.release();
        }
    }
}

/// True when a signal-0 probe says the process exists. Permission errors
/// count as alive.
#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let pid = match libc::pid_t::try_from(pid) {
        Ok(pid) => pid,
        Err(_) => return false, // not a representable pid on this platform
    };
    let rc = unsafe { libc::kill(pid, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true // no cheap probe; fall back to age-based staleness
}
