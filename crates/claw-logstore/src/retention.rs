//! Background retention purge.
//!
//! [`PeriodicTask`] runs a job on a named thread at a fixed interval until
//! it is stopped. [`RetentionReaper`] drives one such task that deletes
//! entries older than the configured TTL. Reconfiguring stops the running
//! task and waits for its thread to exit before the replacement starts, so
//! two purge cycles never run at the same time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{Sender, bounded, select, tick};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, error, info};

use crate::config::RetentionSettings;
use crate::connection::ConnectionManager;
use crate::diagnostics::Diagnostics;
use crate::error::{LogStoreError, Result};
use crate::schema::DELETE_EXPIRED;

/// Name of the reaper thread.
pub const REAPER_THREAD_NAME: &str = "logstore-reaper";

/// Deletes every entry with `timestamp <= cutoff`, returning the count.
///
/// # Errors
///
/// Returns [`LogStoreError::Storage`] if the delete fails.
pub fn purge_older_than(conn: &Connection, cutoff: i64) -> Result<u64> {
    let deleted = conn
        .prepare_cached(DELETE_EXPIRED)
        .and_then(|mut stmt| stmt.execute([cutoff]))
        .map_err(LogStoreError::storage)?;
    Ok(deleted as u64)
}

/// Cutoff for a TTL measured from now, in epoch milliseconds.
#[must_use]
pub fn cutoff_for(ttl: Duration) -> i64 {
    let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    Utc::now().timestamp_millis().saturating_sub(ttl_millis)
}

/// Something the reaper can purge.
pub trait PurgeTarget: Send + Sync + 'static {
    /// Deletes entries with `timestamp <= cutoff`, returning the count.
    fn purge_older_than(&self, cutoff: i64) -> Result<u64>;
}

impl PurgeTarget for ConnectionManager {
    fn purge_older_than(&self, cutoff: i64) -> Result<u64> {
        self.with_conn(|conn| purge_older_than(conn, cutoff))
    }
}

/// Counters for purge cycles, scheduled or explicit.
#[derive(Debug, Default)]
pub struct PurgeStats {
    cycles: AtomicU64,
    rows: AtomicU64,
    failures: AtomicU64,
}

impl PurgeStats {
    /// Completed purge cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Rows removed across all cycles.
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Cycles that failed.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn record(&self, result: &Result<u64>) {
        match result {
            Ok(rows) => {
                self.cycles.fetch_add(1, Ordering::Relaxed);
                self.rows.fetch_add(*rows, Ordering::Relaxed);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// A job run on its own thread at a fixed interval.
///
/// The first run happens one interval after start. Dropping a running task
/// stops it.
pub struct PeriodicTask {
    name: String,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawns a thread named `name` that calls `job` every `interval`.
    ///
    /// The thread logs through `diagnostics` for its whole lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::InvalidConfig`] for a zero interval and
    /// [`LogStoreError::Storage`] if the thread cannot be spawned.
    pub fn start<F>(
        name: impl Into<String>,
        interval: Duration,
        diagnostics: Diagnostics,
        mut job: F,
    ) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        if interval.is_zero() {
            return Err(LogStoreError::InvalidConfig(
                "periodic task interval must be greater than zero".to_string(),
            ));
        }

        let name = name.into();
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                diagnostics.in_scope(|| {
                    let ticker = tick(interval);
                    debug!(?interval, "periodic task started");
                    loop {
                        select! {
                            recv(ticker) -> _ => job(),
                            recv(stop_rx) -> _ => break,
                        }
                    }
                    debug!("periodic task stopped");
                });
            })
            .map_err(|e| LogStoreError::Storage(format!("spawn {name}: {e}")))?;

        Ok(Self {
            name,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true while the loop is running.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signals the loop to exit and waits until it has.
    ///
    /// A job already in progress runs to completion first. Calling it
    /// again is a no-op.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(task = %self.name, "periodic task panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

struct ActiveSchedule {
    task: PeriodicTask,
    settings: RetentionSettings,
}

/// Periodically purges entries older than a TTL.
pub struct RetentionReaper {
    target: Arc<dyn PurgeTarget>,
    stats: Arc<PurgeStats>,
    state: Mutex<Option<ActiveSchedule>>,
    diagnostics: Diagnostics,
}

impl RetentionReaper {
    /// Creates a stopped reaper for `target`.
    pub fn new(target: Arc<dyn PurgeTarget>, diagnostics: Diagnostics) -> Self {
        Self {
            target,
            stats: Arc::new(PurgeStats::default()),
            state: Mutex::new(None),
            diagnostics,
        }
    }

    /// Starts purging on the given schedule.
    ///
    /// A reaper that is already running is reconfigured.
    ///
    /// # Errors
    ///
    /// Same as [`reconfigure`](Self::reconfigure).
    pub fn start(&self, settings: RetentionSettings) -> Result<()> {
        self.reconfigure(settings)
    }

    /// Replaces the schedule.
    ///
    /// Does not return until the previous task, including any purge it was
    /// running, has exited. Invalid settings leave the current schedule in
    /// place; if the new thread cannot be spawned the reaper is left stopped.
    ///
    /// # Errors
    ///
    /// Returns [`LogStoreError::InvalidConfig`] for a zero frequency.
    pub fn reconfigure(&self, settings: RetentionSettings) -> Result<()> {
        settings.validate()?;

        self.diagnostics.in_scope(|| -> Result<()> {
            let mut state = self.state.lock();
            if let Some(mut previous) = state.take() {
                previous.task.stop();
                debug!(
                    frequency = ?previous.settings.frequency,
                    ttl = ?previous.settings.ttl,
                    "previous retention schedule stopped"
                );
            }

            let target = Arc::clone(&self.target);
            let stats = Arc::clone(&self.stats);
            let ttl = settings.ttl;
            let task = PeriodicTask::start(
                REAPER_THREAD_NAME,
                settings.frequency,
                self.diagnostics.clone(),
                move || {
                    run_cycle(target.as_ref(), &stats, cutoff_for(ttl));
                },
            )?;

            info!(
                frequency = ?settings.frequency,
                ttl = ?settings.ttl,
                "retention schedule set"
            );
            *state = Some(ActiveSchedule { task, settings });
            Ok(())
        })
    }

    /// Stops purging and waits for the task to exit.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if let Some(mut previous) = state.take() {
            self.diagnostics.in_scope(|| {
                previous.task.stop();
                info!("retention reaper stopped");
            });
        }
    }

    /// Returns true while a schedule is active.
    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .as_ref()
            .is_some_and(|active| active.task.is_running())
    }

    /// The active schedule, if any.
    pub fn settings(&self) -> Option<RetentionSettings> {
        self.state.lock().as_ref().map(|active| active.settings)
    }

    /// Runs one purge now, outside the schedule.
    ///
    /// # Errors
    ///
    /// Returns whatever the target returns.
    pub fn purge_now(&self, cutoff: i64) -> Result<u64> {
        let result = self.target.purge_older_than(cutoff);
        self.stats.record(&result);
        result
    }

    /// Purge counters.
    pub fn stats(&self) -> &PurgeStats {
        &self.stats
    }
}

impl Drop for RetentionReaper {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for RetentionReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionReaper")
            .field("settings", &self.settings())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn run_cycle(target: &dyn PurgeTarget, stats: &PurgeStats, cutoff: i64) {
    let result = target.purge_older_than(cutoff);
    stats.record(&result);
    match result {
        Ok(rows) => info!(rows, cutoff, "purged expired log entries"),
        Err(e) => error!(cutoff, error = %e, "retention purge failed"),
    }
}
