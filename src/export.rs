use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::TaxonomyId;
use crate::error::FetchError;
use crate::fetch::ProteomeClient;
use crate::persist::{EXPORT_PREFIX, FASTA_EXT, PersistOutcome, write_no_clobber};
use crate::session::DownloadSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTicket {
    pub tax_id: TaxonomyId,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    Pending,
    Complete,
    Empty,
    Failed,
    /// Abandoned after the wait deadline; nothing is written for it.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub tax_id: TaxonomyId,
    pub file: Option<Utf8PathBuf>,
    pub state: ExportState,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportStatus {
    pub pending: usize,
    pub records: Vec<ExportRecord>,
}

/// What the export-queue strategy needs from a remote front end.
pub trait ExportBackend {
    fn submit_export(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<ExportTicket, FetchError>;

    fn poll_exports(&self) -> Result<ExportStatus, FetchError>;

    /// Give up on every export still pending and return how many there were.
    /// No file may appear for a cancelled export once this returns.
    fn cancel_pending(&self) -> Result<usize, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Emit a "still waiting" notice every this many polls.
    pub notice_every: u32,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            notice_every: 60,
            deadline: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WaitOutcome {
    Completed,
    TimedOut { pending: usize },
}

/// Poll `backend` until nothing is pending or the deadline passes.
pub fn wait_for_exports<B: ExportBackend + ?Sized>(
    backend: &B,
    policy: &PollPolicy,
    sink: &dyn ProgressSink,
) -> Result<WaitOutcome, FetchError> {
    info!("Wait for all files to download.");
    let started = Instant::now();
    let notice_every = policy.notice_every.max(1);
    let mut polls = 0u32;
    loop {
        let status = backend.poll_exports()?;
        if status.pending == 0 {
            info!("The batch of files has been downloaded, continue.");
            return Ok(WaitOutcome::Completed);
        }
        let elapsed = started.elapsed();
        if elapsed >= policy.deadline {
            warn!(pending = status.pending, "gave up waiting for downloads");
            return Ok(WaitOutcome::TimedOut {
                pending: status.pending,
            });
        }
        polls = polls.wrapping_add(1);
        if polls % notice_every == 0 {
            info!("Still waiting for the download, it may take a long time...");
            sink.event(ProgressEvent {
                message: format!("export.wait pending={}", status.pending),
                elapsed: Some(elapsed),
            });
        }
        thread::sleep(policy.interval.min(policy.deadline - elapsed));
    }
}

/// Runs each export on its own thread through a [`ProteomeClient`] and
/// drops the result as `sequence(<n>).fasta` into the session directory.
///
/// A worker only writes while holding the records lock and only if its record
/// is still pending, so `cancel_pending` is final.
pub struct DownloadManager<C: ProteomeClient + 'static> {
    client: Arc<C>,
    records: Arc<Mutex<Vec<ExportRecord>>>,
    handles: Mutex<Vec<(usize, JoinHandle<()>)>>,
    counter: AtomicUsize,
}

impl<C: ProteomeClient + 'static> DownloadManager<C> {
    pub fn new(client: C) -> Self {
        Self {
            client: Arc::new(client),
            records: Arc::new(Mutex::new(Vec::new())),
            handles: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn export_file_name(index: usize) -> String {
        if index == 0 {
            format!("{EXPORT_PREFIX}.{FASTA_EXT}")
        } else {
            format!("{EXPORT_PREFIX}({index}).{FASTA_EXT}")
        }
    }

    fn records(&self) -> Result<MutexGuard<'_, Vec<ExportRecord>>, FetchError> {
        self.records
            .lock()
            .map_err(|_| FetchError::Export("export state poisoned".to_string()))
    }

    fn handles(&self) -> Result<MutexGuard<'_, Vec<(usize, JoinHandle<()>)>>, FetchError> {
        self.handles
            .lock()
            .map_err(|_| FetchError::Export("export handles poisoned".to_string()))
    }
}

impl<C: ProteomeClient + 'static> ExportBackend for DownloadManager<C> {
    fn submit_export(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
    ) -> Result<ExportTicket, FetchError> {
        let file_name = Self::export_file_name(self.counter.fetch_add(1, Ordering::SeqCst));
        let slot = {
            let mut records = self.records()?;
            records.push(ExportRecord {
                tax_id,
                file: None,
                state: ExportState::Pending,
                message: None,
            });
            records.len() - 1
        };

        let client = Arc::clone(&self.client);
        let records = Arc::clone(&self.records);
        let session = session.clone();
        let target = session.directory().join(&file_name);
        let spawned = thread::Builder::new()
            .name(format!("export-{tax_id}"))
            .spawn(move || {
                let fetched = client.fetch_fasta(&session, tax_id);
                let Ok(mut guard) = records.lock() else {
                    return;
                };
                let Some(record) = guard.get_mut(slot) else {
                    return;
                };
                if record.state != ExportState::Pending {
                    debug!(tax_id = %tax_id, state = ?record.state, "dropping late export");
                    return;
                }
                let (state, file, message) = match fetched {
                    Ok(fetched) if fetched.is_empty() => (ExportState::Empty, None, None),
                    Ok(fetched) => {
                        match write_no_clobber(session.directory(), &target, fetched.text.as_bytes()) {
                            Ok(PersistOutcome::Written(path)) => {
                                (ExportState::Complete, Some(path), None)
                            }
                            Ok(PersistOutcome::Conflict(path)) => (
                                ExportState::Failed,
                                None,
                                Some(format!("{path} already exists")),
                            ),
                            Err(err) => (ExportState::Failed, None, Some(err.to_string())),
                        }
                    }
                    Err(err) => (ExportState::Failed, None, Some(err.to_string())),
                };
                record.state = state;
                record.file = file;
                record.message = message;
            });
        match spawned {
            Ok(handle) => self.handles()?.push((slot, handle)),
            Err(err) => {
                if let Some(record) = self.records()?.get_mut(slot) {
                    record.state = ExportState::Failed;
                }
                return Err(FetchError::Export(format!("spawn export thread: {err}")));
            }
        }

        Ok(ExportTicket { tax_id, file_name })
    }

    fn poll_exports(&self) -> Result<ExportStatus, FetchError> {
        let records = self.records()?;
        let pending = records
            .iter()
            .filter(|record| record.state == ExportState::Pending)
            .count();
        Ok(ExportStatus {
            pending,
            records: records.clone(),
        })
    }

    fn cancel_pending(&self) -> Result<usize, FetchError> {
        let mut cancelled = Vec::new();
        {
            let mut records = self.records()?;
            for (slot, record) in records.iter_mut().enumerate() {
                if record.state == ExportState::Pending {
                    record.state = ExportState::Cancelled;
                    record.message = Some("export abandoned at the wait deadline".to_string());
                    cancelled.push(slot);
                }
            }
        }

        // Settled workers return right after releasing the lock; cancelled ones
        // may still sit in a request and are detached.
        for (slot, handle) in self.handles()?.drain(..) {
            if cancelled.contains(&slot) {
                warn!(thread = ?handle.thread().name(), "detaching cancelled export");
                continue;
            }
            if handle.join().is_err() {
                warn!(slot, "export thread panicked");
            }
        }
        Ok(cancelled.len())
    }
}
