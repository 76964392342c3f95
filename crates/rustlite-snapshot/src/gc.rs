//! Garbage Collector (component G).
//!
//! Reclaims version chain entries that no live snapshot can still see.
//! Runs on demand via [`Collector::collect`]/[`Collector::collect_entry`]
//! or on a background ticker started with [`Collector::start`]. Page
//! reclamation itself is already handled per-version by the Version
//! Store and the CoW Manager; this component only decides *how far back*
//! it is safe to trim.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, instrument, warn};

use rustlite_core::{Error, Result, VersionStore};

use crate::SnapshotManager;

/// Tuning knobs for a [`Collector`].
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// How often the background loop runs a collection cycle.
    pub interval: Duration,
    /// Versions committed within this many logical ticks of the
    /// collection floor are kept even if a stricter floor would permit
    /// trimming them, giving slow readers a grace window.
    pub min_version_age: u64,
    /// Maximum number of DN chains processed per cycle; chains beyond
    /// this count are left for the next cycle rather than blocking one
    /// pass on an unbounded walk.
    pub batch_size: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            min_version_age: 0,
            batch_size: 1024,
        }
    }
}

/// Observability counters for a [`Collector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    /// Number of completed background cycles.
    pub cycles_run: u64,
    /// Total versions collected across all cycles and on-demand calls.
    pub versions_collected: u64,
    /// Versions collected by the most recent cycle or on-demand call.
    pub last_collected: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Running,
    Closed,
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Background/on-demand reclamation of version chain tails behind the
/// oldest live snapshot.
pub struct Collector {
    config: GcConfig,
    snapshots: Arc<SnapshotManager>,
    versions: Arc<VersionStore>,
    state: Mutex<State>,
    worker: Mutex<Option<Worker>>,
    cycles_run: AtomicU64,
    versions_collected: AtomicU64,
    last_collected: AtomicU64,
}

impl Collector {
    /// Build a collector over `versions`, using `snapshots` to determine
    /// how far back it is safe to trim.
    pub fn new(config: GcConfig, snapshots: Arc<SnapshotManager>, versions: Arc<VersionStore>) -> Arc<Self> {
        Arc::new(Self {
            config,
            snapshots,
            versions,
            state: Mutex::new(State::Created),
            worker: Mutex::new(None),
            cycles_run: AtomicU64::new(0),
            versions_collected: AtomicU64::new(0),
            last_collected: AtomicU64::new(0),
        })
    }

    fn check_not_closed(&self) -> Result<()> {
        if *self.state.lock()? == State::Closed {
            return Err(Error::State("garbage collector closed".to_string()));
        }
        Ok(())
    }

    /// The logical-clock floor below which a version is safe to drop:
    /// the oldest live snapshot (or, if none are live, the current
    /// instant, so every committed version but the newest per chain
    /// becomes collectable), pulled back by `min_version_age`.
    fn floor(&self) -> Result<u64> {
        let oldest = self.snapshots.oldest_active_snapshot()?;
        let base = if oldest == 0 {
            self.snapshots.current_timestamp()
        } else {
            oldest
        };
        Ok(base.saturating_sub(self.config.min_version_age))
    }

    /// Trim every chain's tail behind the current floor, in batches of
    /// `batch_size` chains per call. Returns the number of versions
    /// collected this call.
    #[instrument(skip(self))]
    pub fn collect(&self) -> Result<usize> {
        self.check_not_closed()?;
        let floor = self.floor()?;
        let dns = self.versions.dns()?;

        if dns.len() > self.config.batch_size {
            debug!(
                total = dns.len(),
                batch_size = self.config.batch_size,
                "more chains than fit in one collection batch; remainder deferred to next cycle"
            );
        }

        let mut collected = 0usize;
        for dn in dns.into_iter().take(self.config.batch_size) {
            collected += self.versions.garbage_collect_entry(&dn, floor)?;
        }
        self.record(collected);
        Ok(collected)
    }

    /// Trim a single chain's tail behind the current floor.
    pub fn collect_entry(&self, dn: &str) -> Result<usize> {
        self.check_not_closed()?;
        let floor = self.floor()?;
        let collected = self.versions.garbage_collect_entry(dn, floor)?;
        self.record(collected);
        Ok(collected)
    }

    fn record(&self, collected: usize) {
        self.versions_collected
            .fetch_add(collected as u64, Ordering::SeqCst);
        self.last_collected.store(collected as u64, Ordering::SeqCst);
    }

    /// Start the background collection loop. Errors with
    /// [`Error::State`] if already running or closed.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock()?;
        match *state {
            State::Closed => return Err(Error::State("garbage collector closed".to_string())),
            State::Running => {
                return Err(Error::State("garbage collector already running".to_string()))
            }
            State::Created => {}
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let interval = self.config.interval;
        let this = Arc::clone(self);
        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => match this.collect() {
                    Ok(collected) => {
                        this.cycles_run.fetch_add(1, Ordering::SeqCst);
                        debug!(collected, "garbage collection cycle complete");
                    }
                    Err(e) => warn!(error = %e, "garbage collection cycle failed"),
                },
            }
        });

        *self.worker.lock()? = Some(Worker { stop_tx, handle });
        *state = State::Running;
        Ok(())
    }

    /// Stop the background loop, waiting for an in-flight cycle to
    /// finish. Errors with [`Error::State`] if not running or closed.
    pub fn stop(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        match *state {
            State::Closed => return Err(Error::State("garbage collector closed".to_string())),
            State::Created => return Err(Error::State("garbage collector not running".to_string())),
            State::Running => {}
        }
        self.join_worker()?;
        *state = State::Created;
        Ok(())
    }

    /// Stop the background loop (if running) and permanently disable
    /// this collector. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if *state == State::Closed {
            return Ok(());
        }
        self.join_worker()?;
        *state = State::Closed;
        Ok(())
    }

    fn join_worker(&self) -> Result<()> {
        if let Some(worker) = self.worker.lock()?.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
        Ok(())
    }

    /// Cumulative and most-recent collection counters.
    pub fn stats(&self) -> Result<GcStats> {
        self.check_not_closed()?;
        Ok(GcStats {
            cycles_run: self.cycles_run.load(Ordering::SeqCst),
            versions_collected: self.versions_collected.load(Ordering::SeqCst),
            last_collected: self.last_collected.load(Ordering::SeqCst),
        })
    }
}
