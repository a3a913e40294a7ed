#![forbid(unsafe_code)]

use crate::{StoreError, SweeperConfig, Workspaces};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use tq_core::ids::{TABLE_PREFIX, WorkspaceId};
use tq_core::{Clock, keys};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub destroyed: usize,
    /// Records that could not be read; left in place.
    pub malformed: usize,
    /// Workspaces whose destruction failed; retried next cycle.
    pub failed: usize,
    /// Tables whose session record had already expired out of the key-value store.
    pub orphans: usize,
}

/// Periodic reclamation of idle workspaces.
pub struct Sweeper {
    workspaces: Arc<Workspaces>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl Sweeper {
    pub fn new(workspaces: Arc<Workspaces>, clock: Arc<dyn Clock>, config: SweeperConfig) -> Self {
        Self {
            workspaces,
            clock,
            config,
        }
    }

    /// One pass over every session record. Per-workspace failures are counted and skipped; only a
    /// failure to enumerate aborts the pass.
    pub fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let now = self.clock.now_ms();
        let threshold_ms = i64::try_from(self.config.idle_threshold.as_millis()).unwrap_or(i64::MAX);
        let mut report = SweepReport::default();

        for key in self.workspaces.sessions().session_keys()? {
            report.scanned += 1;
            let Some(id) = keys::id_from_session_key(&key).and_then(|raw| WorkspaceId::try_new(raw).ok())
            else {
                tracing::warn!(key = %key, "unparseable session key skipped");
                report.malformed += 1;
                continue;
            };

            let workspace = match self.workspaces.sessions().load(&id) {
                Ok(Some(workspace)) => workspace,
                Ok(None) => continue,
                Err(err @ (StoreError::Codec(_) | StoreError::InvalidInput(_))) => {
                    tracing::warn!(workspace = %id, error = %err, "malformed session record skipped");
                    report.malformed += 1;
                    continue;
                }
                Err(err) => {
                    tracing::warn!(workspace = %id, error = %err, "session record unreadable");
                    report.failed += 1;
                    continue;
                }
            };

            if workspace.idle_ms(now) <= threshold_ms {
                continue;
            }
            match self.workspaces.destroy(&id) {
                Ok(_) => report.destroyed += 1,
                Err(err) => {
                    tracing::warn!(workspace = %id, error = %err, "idle workspace destruction failed");
                    report.failed += 1;
                }
            }
        }

        self.reclaim_orphans(&mut report)?;

        tracing::info!(
            scanned = report.scanned,
            destroyed = report.destroyed,
            malformed = report.malformed,
            failed = report.failed,
            orphans = report.orphans,
            "sweep finished"
        );
        Ok(report)
    }

    /// The session TTL can lapse before a sweep observes the idle record; the table and cache
    /// namespace it leaves behind are reclaimed here.
    fn reclaim_orphans(&self, report: &mut SweepReport) -> Result<(), StoreError> {
        let tables = self.workspaces.engine().tables_with_prefix(TABLE_PREFIX)?;
        for table in tables {
            let Some(id) = table
                .strip_prefix(TABLE_PREFIX)
                .and_then(|raw| WorkspaceId::try_new(raw).ok())
            else {
                continue;
            };
            match self.workspaces.sessions().load(&id) {
                Ok(None) => {}
                Ok(Some(_)) | Err(StoreError::Codec(_) | StoreError::InvalidInput(_)) => continue,
                Err(err) => {
                    tracing::warn!(workspace = %id, error = %err, "orphan check failed");
                    report.failed += 1;
                    continue;
                }
            }
            match self.workspaces.destroy(&id) {
                Ok(_) => {
                    tracing::info!(workspace = %id, "orphaned table reclaimed");
                    report.orphans += 1;
                }
                Err(err) => {
                    tracing::warn!(workspace = %id, error = %err, "orphan reclamation failed");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Runs `sweep_once` every interval on a dedicated thread until the handle is stopped.
    pub fn spawn(self) -> std::io::Result<SweeperHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let interval = self.config.interval;
        let join = std::thread::Builder::new()
            .name("tq-sweeper".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(err) = self.sweep_once() {
                                tracing::warn!(error = %err, "sweep aborted");
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(SweeperHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
        })
    }
}

pub struct SweeperHandle {
    stop_tx: Option<Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
