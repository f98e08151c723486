use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::batch::split_batches;
use crate::domain::{OrganismName, Source, Strategy, TaxonomyId};
use crate::error::FetchError;
use crate::export::{
    ExportBackend, ExportRecord, ExportState, PollPolicy, WaitOutcome, wait_for_exports,
};
use crate::fetch::ProteomeClient;
use crate::organism::extract_organism_name;
use crate::persist::{PersistOutcome, RenameOutcome, persist_fasta, rename_downloads, write_manifest};
use crate::session::{DownloadSession, SessionOptions};

pub const DEFAULT_BATCH_SIZE: usize = 10;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Sync {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Saved,
    Conflict,
    Empty,
    Failed,
    Renamed,
    RenameSkipped,
    Pending,
}

impl ItemOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemOutcome::Saved => "saved",
            ItemOutcome::Conflict => "conflict",
            ItemOutcome::Empty => "empty",
            ItemOutcome::Failed => "failed",
            ItemOutcome::Renamed => "renamed",
            ItemOutcome::RenameSkipped => "rename_skipped",
            ItemOutcome::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub tax_id: Option<TaxonomyId>,
    pub outcome: ItemOutcome,
    pub organism: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
}

impl ItemReport {
    fn new(tax_id: Option<TaxonomyId>, outcome: ItemOutcome) -> Self {
        Self {
            tax_id,
            outcome,
            organism: None,
            path: None,
            message: None,
        }
    }

    fn with_organism(mut self, organism: &OrganismName) -> Self {
        self.organism = Some(organism.to_string());
        self
    }

    fn with_path(mut self, path: &Utf8Path) -> Self {
        self.path = Some(path.to_string());
        self
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub directory: String,
    pub source: Source,
    pub strategy: Strategy,
    pub started_at: String,
    pub finished_at: String,
    pub tool: String,
    pub items: Vec<ItemReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub waits: Vec<WaitOutcome>,
}

impl RunReport {
    fn begin(session: &DownloadSession, strategy: Strategy) -> Self {
        Self {
            directory: session.directory().to_string(),
            source: session.source(),
            strategy,
            started_at: iso_timestamp(),
            finished_at: String::new(),
            tool: format!("taxid2prot/{}", env!("CARGO_PKG_VERSION")),
            items: Vec::new(),
            waits: Vec::new(),
        }
    }

    fn finish(mut self, session: &DownloadSession) -> Result<Self, FetchError> {
        self.finished_at = iso_timestamp();
        write_manifest(session.directory(), &self)?;
        info!(
            "The downloaded files are located here: {}.",
            session.directory()
        );
        Ok(self)
    }

    pub fn count(&self, outcome: ItemOutcome) -> usize {
        self.items
            .iter()
            .filter(|item| item.outcome == outcome)
            .count()
    }

    /// Files that ended up on disk under an organism name.
    pub fn stored(&self) -> usize {
        self.count(ItemOutcome::Saved) + self.count(ItemOutcome::Renamed)
    }
}

/// How `run_parallel` would distribute identifiers over workers.
#[derive(Debug, Clone, Serialize)]
pub struct BatchPlan {
    pub workers: usize,
    pub batches: Vec<Vec<TaxonomyId>>,
}

impl BatchPlan {
    pub fn new(tax_ids: &[TaxonomyId], chunks: usize) -> Self {
        let batches = split_batches(tax_ids, chunks);
        Self {
            workers: batches.len(),
            batches,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrganismLookup {
    pub file: String,
    pub organism: OrganismName,
    pub matched: bool,
}

impl OrganismLookup {
    pub fn from_file(path: &Utf8Path) -> Result<Self, FetchError> {
        let text = std::fs::read_to_string(path.as_std_path())
            .map_err(|err| FetchError::Filesystem(format!("read {path}: {err}")))?;
        let organism = extract_organism_name(&text);
        Ok(Self {
            file: path.to_string(),
            matched: !organism.is_fallback(),
            organism,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub base: Utf8PathBuf,
    pub session: SessionOptions,
    pub strategy: Strategy,
    pub batch_size: usize,
    pub poll: PollPolicy,
    pub workers: usize,
}

impl RunOptions {
    pub fn new(base: Utf8PathBuf) -> Self {
        Self {
            base,
            session: SessionOptions::default(),
            strategy: Strategy::Direct,
            batch_size: DEFAULT_BATCH_SIZE,
            poll: PollPolicy::default(),
            workers: 1,
        }
    }
}

pub struct App<C: ProteomeClient> {
    client: C,
}

impl<C: ProteomeClient> App<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Direct query: fetch, name and persist each identifier in order.
    pub fn run(
        &self,
        session: &DownloadSession,
        tax_ids: &[TaxonomyId],
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, FetchError> {
        let mut report = RunReport::begin(session, Strategy::Direct);
        for (index, tax_id) in tax_ids.iter().enumerate() {
            sink.event(ProgressEvent {
                message: format!("phase=Fetch; taxonomy {tax_id} ({}/{})", index + 1, tax_ids.len()),
                elapsed: None,
            });
            report.items.push(self.fetch_one(session, *tax_id, sink));
        }
        report.finish(session)
    }

    pub fn fetch_one(
        &self,
        session: &DownloadSession,
        tax_id: TaxonomyId,
        sink: &dyn ProgressSink,
    ) -> ItemReport {
        let start = Instant::now();
        let fetched = match self.client.fetch_fasta(session, tax_id) {
            Ok(fetched) => fetched,
            Err(err) => {
                error!("Problems with API for taxonomy {tax_id}: {err}");
                return ItemReport::new(Some(tax_id), ItemOutcome::Failed)
                    .with_message(err.to_string());
            }
        };
        sink.event(ProgressEvent {
            message: format!(
                "{}.response status={} latency_ms={}",
                session.source(),
                fetched.status,
                start.elapsed().as_millis()
            ),
            elapsed: Some(start.elapsed()),
        });

        if fetched.is_empty() {
            warn!("No proteins from taxonomy = {tax_id}.");
            return ItemReport::new(Some(tax_id), ItemOutcome::Empty)
                .with_message("empty response body");
        }

        let organism = extract_organism_name(&fetched.text);
        if organism.is_fallback() {
            warn!("No organism name found for taxonomy {tax_id}, using {organism}.");
        }

        match persist_fasta(session.directory(), &organism, tax_id, &fetched.text) {
            Ok(PersistOutcome::Written(path)) => {
                sink.event(ProgressEvent {
                    message: format!("phase=Store; {path}"),
                    elapsed: Some(start.elapsed()),
                });
                ItemReport::new(Some(tax_id), ItemOutcome::Saved)
                    .with_organism(&organism)
                    .with_path(&path)
            }
            Ok(PersistOutcome::Conflict(path)) => {
                ItemReport::new(Some(tax_id), ItemOutcome::Conflict)
                    .with_organism(&organism)
                    .with_path(&path)
                    .with_message("file already exists")
            }
            Err(err) => {
                error!("Cannot save taxonomy {tax_id}: {err}");
                ItemReport::new(Some(tax_id), ItemOutcome::Failed)
                    .with_organism(&organism)
                    .with_message(err.to_string())
            }
        }
    }
}

/// Export queue: submit in sub-batches, wait after each one, then rename.
pub fn run_export<B: ExportBackend + ?Sized>(
    backend: &B,
    session: &DownloadSession,
    tax_ids: &[TaxonomyId],
    batch_size: usize,
    policy: &PollPolicy,
    sink: &dyn ProgressSink,
) -> Result<RunReport, FetchError> {
    let mut report = RunReport::begin(session, Strategy::Export);
    let batch_size = batch_size.max(1);
    info!("To avoid problems, the data will be loaded in batches of {batch_size} pieces.");

    let mut submit_failures = Vec::new();
    for (index, tax_id) in tax_ids.iter().enumerate() {
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; export {tax_id} ({}/{})", index + 1, tax_ids.len()),
            elapsed: None,
        });
        if let Err(err) = backend.submit_export(session, *tax_id) {
            error!("Cannot submit export for taxonomy {tax_id}: {err}");
            submit_failures.push(
                ItemReport::new(Some(*tax_id), ItemOutcome::Failed).with_message(err.to_string()),
            );
        }
        let submitted = index + 1;
        if submitted % batch_size == 0 && submitted < tax_ids.len() {
            report.waits.push(wait_for_exports(backend, policy, sink)?);
        }
    }
    report.waits.push(wait_for_exports(backend, policy, sink)?);
    let cancelled = backend.cancel_pending()?;
    if cancelled > 0 {
        warn!("Gave up on {cancelled} unfinished downloads.");
    }

    sink.event(ProgressEvent {
        message: "phase=Store; renaming downloads".to_string(),
        elapsed: None,
    });
    let status = backend.poll_exports()?;
    let tax_ids_by_file: HashMap<Utf8PathBuf, TaxonomyId> = status
        .records
        .iter()
        .filter_map(|record| Some((record.file.clone()?, record.tax_id)))
        .collect();
    let renamed = rename_downloads(session.directory(), &tax_ids_by_file)?;
    report.items = export_items(&status.records, &renamed);
    report.items.extend(submit_failures);
    report.finish(session)
}

fn export_items(records: &[ExportRecord], renamed: &[RenameOutcome]) -> Vec<ItemReport> {
    let by_file: HashMap<&Utf8Path, &RenameOutcome> = renamed
        .iter()
        .map(|outcome| match outcome {
            RenameOutcome::Renamed { from, .. }
            | RenameOutcome::Conflict { from, .. }
            | RenameOutcome::NoName(from) => (from.as_path(), outcome),
        })
        .collect();

    let mut items: Vec<ItemReport> = records
        .iter()
        .map(|record| {
            let item = ItemReport::new(Some(record.tax_id), ItemOutcome::Pending);
            match record.state {
                ExportState::Pending => ItemReport {
                    message: Some("still downloading at deadline".to_string()),
                    ..item
                },
                ExportState::Cancelled => ItemReport {
                    message: record.message.clone(),
                    ..item
                },
                ExportState::Empty => ItemReport {
                    outcome: ItemOutcome::Empty,
                    message: Some("empty response body".to_string()),
                    ..item
                },
                ExportState::Failed => ItemReport {
                    outcome: ItemOutcome::Failed,
                    message: record.message.clone(),
                    ..item
                },
                ExportState::Complete => {
                    let file = record.file.as_deref();
                    match file.and_then(|path| by_file.get(path)) {
                        Some(RenameOutcome::Renamed { to, organism, .. }) => ItemReport {
                            outcome: ItemOutcome::Renamed,
                            ..item
                        }
                        .with_organism(organism)
                        .with_path(to),
                        Some(RenameOutcome::Conflict { from, to }) => ItemReport {
                            outcome: ItemOutcome::RenameSkipped,
                            ..item
                        }
                        .with_path(from)
                        .with_message(format!("{to} already exists")),
                        _ => ItemReport {
                            outcome: ItemOutcome::RenameSkipped,
                            path: file.map(|path| path.to_string()),
                            message: Some("no organism name on first line".to_string()),
                            ..item
                        },
                    }
                }
            }
        })
        .collect();

    // Leftover exports from earlier runs in the same directory have no record.
    let known: Vec<&Utf8Path> = records.iter().filter_map(|r| r.file.as_deref()).collect();
    for outcome in renamed {
        if let RenameOutcome::Renamed { from, to, organism } = outcome {
            if !known.contains(&from.as_path()) {
                items.push(
                    ItemReport::new(None, ItemOutcome::Renamed)
                        .with_organism(organism)
                        .with_path(to),
                );
            }
        }
    }
    items
}

/// Fan `tax_ids` out over `options.workers` threads, one session each.
///
/// Every session (and so every output directory) is created before the
/// first fetch, so configuration errors abort the whole run up front. After
/// that each worker stands alone: the result list holds one entry per worker
/// in input order, and a failed worker does not hide the others' reports.
pub fn run_parallel<C, F>(
    options: &RunOptions,
    tax_ids: &[TaxonomyId],
    make_client: F,
    sink: &dyn ProgressSink,
) -> Result<Vec<Result<RunReport, FetchError>>, FetchError>
where
    C: ProteomeClient + 'static,
    F: Fn() -> Result<C, FetchError>,
{
    let batches = split_batches(tax_ids, options.workers);
    let mut workers = Vec::with_capacity(batches.len());
    for batch in batches {
        let session = DownloadSession::create(&options.base, &options.session)?;
        workers.push((session, make_client()?, batch));
    }
    info!(workers = workers.len(), ids = tax_ids.len(), "starting workers");

    let results = thread::scope(|scope| {
        let handles: Vec<_> = workers
            .into_iter()
            .map(|(session, client, batch)| {
                let directory = session.directory().to_path_buf();
                let handle =
                    scope.spawn(move || run_worker(options, &session, client, &batch, sink));
                (directory, handle)
            })
            .collect();
        handles
            .into_iter()
            .map(|(directory, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(FetchError::Export("worker thread panicked".to_string())));
                if let Err(err) = &result {
                    error!("Worker for {directory} failed: {err}");
                }
                result
            })
            .collect()
    });
    Ok(results)
}

fn run_worker<C: ProteomeClient + 'static>(
    options: &RunOptions,
    session: &DownloadSession,
    client: C,
    batch: &[TaxonomyId],
    sink: &dyn ProgressSink,
) -> Result<RunReport, FetchError> {
    match options.strategy {
        Strategy::Direct => App::new(client).run(session, batch, sink),
        Strategy::Export => {
            let manager = crate::export::DownloadManager::new(client);
            run_export(&manager, session, batch, options.batch_size, &options.poll, sink)
        }
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
