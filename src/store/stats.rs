/*!
 * Store Statistics
 * Atomic counters for hook runs and write-back activity
 */

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free store counters
///
/// All updates use relaxed ordering except the active-uploader count, which
/// callers wait on.
#[repr(C, align(64))]
#[derive(Debug)]
pub struct StoreStats {
    hook_runs: AtomicU64,
    uploaders_spawned: AtomicU64,
    commits: AtomicU64,
    failed_commits: AtomicU64,
    skipped_commits: AtomicU64,
    active_uploaders: AtomicUsize,
}

impl Default for StoreStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreStats {
    #[inline]
    pub const fn new() -> Self {
        Self {
            hook_runs: AtomicU64::new(0),
            uploaders_spawned: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            failed_commits: AtomicU64::new(0),
            skipped_commits: AtomicU64::new(0),
            active_uploaders: AtomicUsize::new(0),
        }
    }

    #[inline(always)]
    pub fn inc_hook_runs(&self) {
        self.hook_runs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_failed_commits(&self) {
        self.failed_commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Unchanged or empty content that was not uploaded
    #[inline(always)]
    pub fn inc_skipped_commits(&self) {
        self.skipped_commits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a new uploader before its thread starts
    #[inline]
    pub fn uploader_started(&self) {
        self.uploaders_spawned.fetch_add(1, Ordering::Relaxed);
        self.active_uploaders.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn uploader_finished(&self) {
        self.active_uploaders.fetch_sub(1, Ordering::AcqRel);
    }

    #[inline]
    #[must_use]
    pub fn active_uploaders(&self) -> usize {
        self.active_uploaders.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hook_runs: self.hook_runs.load(Ordering::Relaxed),
            uploaders_spawned: self.uploaders_spawned.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            failed_commits: self.failed_commits.load(Ordering::Relaxed),
            skipped_commits: self.skipped_commits.load(Ordering::Relaxed),
            active_uploaders: self.active_uploaders(),
        }
    }
}

/// Point-in-time copy of [`StoreStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub hook_runs: u64,
    pub uploaders_spawned: u64,
    pub commits: u64,
    pub failed_commits: u64,
    pub skipped_commits: u64,
    pub active_uploaders: usize,
}
