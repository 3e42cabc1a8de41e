//! Resilient concurrent transfer engine
//!
//! Turns "move N objects" into a bounded pool of per-object operations with
//! aggregated partial-failure reporting. Each worker retries transient
//! backend failures on its own; the optional completion condition re-runs
//! the entire enumerate-and-transfer sequence, which is how callers wait
//! out backend eventual consistency.
//!
//! Outcome invariant: every requested pair lands in exactly one of
//! `completed`/`failed` — unless a deadline cancelled the run, in which
//! case the pairs gathered so far are returned with `cancelled` set. No
//! ordering between objects is promised.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::stream::{self, StreamExt};

use crate::condition::{self, Condition};
use crate::config::{RetryConfig, Settings};
use crate::creds::{self, CredentialCache};
use crate::error::{Error, Result};
use crate::manifest;
use crate::path::{ObjectPath, algebra};
use crate::retry::{self, double_delay};
use crate::traits::{BackendAdapter, Entry, PutOptions};
use crate::walk;

/// One `(source, destination)` pair within a bulk operation.
///
/// For uploads the source is a local file and the destination an object
/// name; for downloads the source is an object name and the destination a
/// local file. Names ending in `/` are empty-directory sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub source: String,
    pub destination: String,
}

/// A pair that transferred
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub source: String,
    pub destination: String,
    pub size: u64,
}

/// A pair that did not
#[derive(Debug)]
pub struct Failed {
    pub source: String,
    pub destination: String,
    pub error: Error,
}

/// Aggregated result of one bulk operation
#[derive(Debug, Default)]
pub struct TransferOutcome {
    pub completed: Vec<Completed>,
    pub failed: Vec<Failed>,
    /// A deadline stopped the run before every pair was dispatched
    pub cancelled: bool,
}

impl TransferOutcome {
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn summary(&self) -> String {
        let suffix = if self.cancelled { ", cancelled" } else { "" };
        format!(
            "{} completed, {} failed{suffix}",
            self.completed.len(),
            self.failed.len()
        )
    }

    pub fn completed_destinations(&self) -> Vec<String> {
        self.completed.iter().map(|c| c.destination.clone()).collect()
    }

    pub fn completed_sources(&self) -> Vec<String> {
        self.completed.iter().map(|c| c.source.clone()).collect()
    }
}

/// An explicit bulk request for the pair-level entry points
#[derive(Debug, Default)]
pub struct TransferRequest {
    pub pairs: Vec<TransferItem>,
    /// Worker-pool bound; 0 means the engine default
    pub concurrency: usize,
    pub condition: Option<Condition<TransferOutcome>>,
    pub deadline: Option<Instant>,
}

impl TransferRequest {
    pub fn new(pairs: Vec<TransferItem>) -> Self {
        Self {
            pairs,
            ..Self::default()
        }
    }
}

/// Options for [`TransferEngine::upload`]
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Completion condition gating the whole sequence
    pub condition: Option<Condition<TransferOutcome>>,
    /// Write a manifest first and gate completion on its membership
    pub use_manifest: bool,
    /// Applied to every uploaded object
    pub put: PutOptions,
    pub deadline: Option<Instant>,
}

/// Options for [`TransferEngine::download`]
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub condition: Option<Condition<TransferOutcome>>,
    /// Gate the pre-transfer listing and the download on the manifest
    pub use_manifest: bool,
    pub deadline: Option<Instant>,
}

enum WorkerOutcome {
    Completed(Completed),
    Failed(Failed),
    /// Deadline hit before this pair was dispatched
    Skipped,
}

/// The transfer engine. Cheap to construct; holds only configuration.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    retry: RetryConfig,
    concurrency: usize,
    manifest_name: String,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferEngine {
    pub fn new() -> Self {
        Self::from_settings(&Settings::default())
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            retry: settings.retry,
            concurrency: settings.transfer.object_concurrency,
            manifest_name: settings.manifest.file_name.clone(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Upload local files and directories under the destination prefix.
    ///
    /// Directory sources expand to their transitive file set; empty
    /// directories become zero-size sentinel objects with a trailing slash.
    /// Destination object names are the source names with leading `/`, `./`
    /// and `../` markers stripped, re-joined under the destination resource.
    pub async fn upload(
        &self,
        adapter: &dyn BackendAdapter,
        dest: &ObjectPath,
        sources: &[PathBuf],
        options: &UploadOptions,
    ) -> Result<TransferOutcome> {
        let (container, resource) = dest.adapter_scope()?;
        let resource_base = algebra::with_trailing_slash(&resource);
        let deadline = options.deadline;
        let mut condition = options.condition.clone();

        if options.use_manifest {
            let pairs = build_upload_pairs(sources, &resource_base)?;
            let expected: Vec<String> = pairs.iter().map(|p| p.destination.clone()).collect();
            tracing::info!(container = %container, objects = expected.len(), "writing transfer manifest");
            manifest::write(adapter, &container, &resource_base, &expected, &self.manifest_name)
                .await?;
            condition = Some(join_conditions(condition, manifest::verify_upload(expected)));
        }

        let engine = self;
        let container_str = container.as_str();
        let resource_str = resource_base.as_str();
        let put = &options.put;
        let run = move || async move {
            let pairs = build_upload_pairs(sources, resource_str)?;
            tracing::info!(container = container_str, objects = pairs.len(), "starting upload");
            engine
                .upload_pairs_once(adapter, container_str, &pairs, put, engine.concurrency, deadline)
                .await
        };

        let outcome = match condition {
            None => run().await?,
            Some(cond) => {
                let gated = terminal_on_cancel(cond);
                condition::run_until(&self.retry, run, Some(&gated), deadline)
                    .await
                    .map_err(|e| e.into_error(TransferOutcome::completed_destinations))?
            }
        };
        tracing::info!(
            completed = outcome.completed.len(),
            failed = outcome.failed.len(),
            "upload complete"
        );
        Ok(outcome)
    }

    /// Download every object under the source prefix into a local directory.
    ///
    /// With `use_manifest`, a listing is first gated on manifest membership
    /// so eventual consistency has caught up before any bytes move, and the
    /// download itself is gated the same way.
    pub async fn download(
        &self,
        adapter: &dyn BackendAdapter,
        src: &ObjectPath,
        dest: &Path,
        options: &DownloadOptions,
    ) -> Result<TransferOutcome> {
        let (container, resource) = src.adapter_scope()?;
        let prefix = algebra::with_trailing_slash(&resource);
        let deadline = options.deadline;
        let mut condition = options.condition.clone();

        let container_str = container.as_str();
        let prefix_str = prefix.as_str();

        if options.use_manifest {
            let expected: Vec<String> =
                manifest::read(adapter, &container, &prefix, &self.manifest_name)
                    .await?
                    .into_iter()
                    .collect();
            // wait until the listing reflects every manifested object
            condition::run_until(
                &self.retry,
                move || adapter.list(container_str, prefix_str, None),
                Some(&manifest::verify_listing(expected.clone())),
                deadline,
            )
            .await
            .map_err(|e| e.into_error(entry_names))?;
            condition = Some(join_conditions(condition, manifest::verify_download(expected)));
        }

        let engine = self;
        let run = move || async move {
            let entries = adapter.list(container_str, prefix_str, None).await?;
            let pairs = build_download_pairs(&entries, prefix_str, dest);
            tracing::info!(container = container_str, objects = pairs.len(), "starting download");
            engine
                .download_pairs_once(adapter, container_str, &pairs, dest, engine.concurrency, deadline)
                .await
        };

        let outcome = match condition {
            None => run().await?,
            Some(cond) => {
                let gated = terminal_on_cancel(cond);
                condition::run_until(&self.retry, run, Some(&gated), deadline)
                    .await
                    .map_err(|e| e.into_error(TransferOutcome::completed_sources))?
            }
        };
        tracing::info!(
            completed = outcome.completed.len(),
            failed = outcome.failed.len(),
            "download complete"
        );
        Ok(outcome)
    }

    /// Pair-level upload: sources are local files, destinations object names
    pub async fn execute_upload(
        &self,
        adapter: &dyn BackendAdapter,
        container: &str,
        request: TransferRequest,
    ) -> Result<TransferOutcome> {
        let concurrency = self.effective_concurrency(request.concurrency);
        let put = PutOptions::default();
        let deadline = request.deadline;
        let pairs = request.pairs;

        let engine = self;
        let pairs_ref = &pairs;
        let put_ref = &put;
        let run = move || async move {
            engine
                .upload_pairs_once(adapter, container, pairs_ref, put_ref, concurrency, deadline)
                .await
        };
        match request.condition {
            None => run().await,
            Some(cond) => {
                let gated = terminal_on_cancel(cond);
                condition::run_until(&self.retry, run, Some(&gated), deadline)
                    .await
                    .map_err(|e| e.into_error(TransferOutcome::completed_destinations))
            }
        }
    }

    /// Pair-level download: sources are object names, destinations local files
    pub async fn execute_download(
        &self,
        adapter: &dyn BackendAdapter,
        container: &str,
        request: TransferRequest,
    ) -> Result<TransferOutcome> {
        let concurrency = self.effective_concurrency(request.concurrency);
        let deadline = request.deadline;
        let pairs = request.pairs;

        let engine = self;
        let pairs_ref = &pairs;
        let run = move || async move {
            let outcome = run_pool(pairs_ref, concurrency, |item| {
                engine.download_one(adapter, container, deadline, item)
            })
            .await;
            finish(outcome)
        };
        match request.condition {
            None => run().await,
            Some(cond) => {
                let gated = terminal_on_cancel(cond);
                condition::run_until(&self.retry, run, Some(&gated), deadline)
                    .await
                    .map_err(|e| e.into_error(TransferOutcome::completed_sources))
            }
        }
    }

    fn effective_concurrency(&self, requested: usize) -> usize {
        if requested == 0 { self.concurrency } else { requested }
    }

    async fn upload_pairs_once(
        &self,
        adapter: &dyn BackendAdapter,
        container: &str,
        pairs: &[TransferItem],
        put: &PutOptions,
        concurrency: usize,
        deadline: Option<Instant>,
    ) -> Result<TransferOutcome> {
        let outcome = run_pool(pairs, concurrency, |item| {
            self.upload_one(adapter, container, put, deadline, item)
        })
        .await;
        finish(outcome)
    }

    async fn download_pairs_once(
        &self,
        adapter: &dyn BackendAdapter,
        container: &str,
        pairs: &[TransferItem],
        dest: &Path,
        concurrency: usize,
        deadline: Option<Instant>,
    ) -> Result<TransferOutcome> {
        tokio::fs::create_dir_all(dest).await?;
        let outcome = run_pool(pairs, concurrency, |item| {
            self.download_one(adapter, container, deadline, item)
        })
        .await;
        finish(outcome)
    }

    async fn upload_one(
        &self,
        adapter: &dyn BackendAdapter,
        container: &str,
        put: &PutOptions,
        deadline: Option<Instant>,
        item: &TransferItem,
    ) -> WorkerOutcome {
        if retry::past_deadline(deadline) {
            return WorkerOutcome::Skipped;
        }
        let source = item.source.as_str();
        let destination = item.destination.as_str();
        let is_dir_marker = destination.ends_with('/');

        let result = retry::retry_with_backoff_using(
            &self.retry,
            double_delay,
            deadline,
            move || async move {
                let data = if is_dir_marker {
                    Vec::new()
                } else {
                    read_source(source).await?
                };
                creds::with_auth_retry(CredentialCache::global(), || {
                    adapter.put(container, destination, data.clone(), put.clone())
                })
                .await
            },
            Error::is_retryable,
        )
        .await;

        match result {
            Ok(()) => {
                let size = if is_dir_marker {
                    0
                } else {
                    std::fs::metadata(source).map(|m| m.len()).unwrap_or(0)
                };
                WorkerOutcome::Completed(Completed {
                    source: source.to_string(),
                    destination: destination.to_string(),
                    size,
                })
            }
            Err(error) => WorkerOutcome::Failed(Failed {
                source: source.to_string(),
                destination: destination.to_string(),
                error,
            }),
        }
    }

    async fn download_one(
        &self,
        adapter: &dyn BackendAdapter,
        container: &str,
        deadline: Option<Instant>,
        item: &TransferItem,
    ) -> WorkerOutcome {
        if retry::past_deadline(deadline) {
            return WorkerOutcome::Skipped;
        }
        let source = item.source.as_str();
        let destination = item.destination.as_str();
        let is_dir_marker = source.ends_with('/');

        let result = retry::retry_with_backoff_using(
            &self.retry,
            double_delay,
            deadline,
            move || async move {
                if is_dir_marker {
                    tokio::fs::create_dir_all(destination).await?;
                    return Ok(0);
                }
                let data = creds::with_auth_retry(CredentialCache::global(), || {
                    adapter.get(container, source)
                })
                .await?;
                let size = data.len() as u64;
                if let Some(parent) = Path::new(destination).parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(destination, &data).await?;
                Ok(size)
            },
            Error::is_retryable,
        )
        .await;

        match result {
            Ok(size) => WorkerOutcome::Completed(Completed {
                source: source.to_string(),
                destination: destination.to_string(),
                size,
            }),
            Err(error) => WorkerOutcome::Failed(Failed {
                source: source.to_string(),
                destination: destination.to_string(),
                error,
            }),
        }
    }
}

/// Run the workers under the pool bound and gather their outcomes.
///
/// The collection loop below is the single synchronization point for the
/// result sets; workers share nothing else.
async fn run_pool<'a, F, Fut>(
    pairs: &'a [TransferItem],
    concurrency: usize,
    worker: F,
) -> TransferOutcome
where
    F: Fn(&'a TransferItem) -> Fut,
    Fut: std::future::Future<Output = WorkerOutcome>,
{
    let mut outcome = TransferOutcome::default();
    let mut results = stream::iter(pairs.iter().map(worker)).buffer_unordered(concurrency.max(1));
    while let Some(result) = results.next().await {
        match result {
            WorkerOutcome::Completed(c) => outcome.completed.push(c),
            WorkerOutcome::Failed(f) => outcome.failed.push(f),
            WorkerOutcome::Skipped => outcome.cancelled = true,
        }
    }
    outcome
}

/// Partial failure becomes an aggregate error; a cancelled outcome is
/// returned as-is so callers keep the work already done.
fn finish(outcome: TransferOutcome) -> Result<TransferOutcome> {
    if outcome.cancelled {
        return Ok(outcome);
    }
    if !outcome.failed.is_empty() {
        return Err(Error::PartialTransfer(Box::new(outcome)));
    }
    Ok(outcome)
}

fn join_conditions(
    existing: Option<Condition<TransferOutcome>>,
    added: Condition<TransferOutcome>,
) -> Condition<TransferOutcome> {
    match existing {
        Some(cond) => cond.and(added),
        None => added,
    }
}

/// A cancelled outcome counts as terminal for the gate: it is handed back
/// instead of burning further attempts past the deadline.
fn terminal_on_cancel(cond: Condition<TransferOutcome>) -> Condition<TransferOutcome> {
    Condition::named("terminal-on-cancel", move |outcome: &TransferOutcome| {
        outcome.cancelled || cond.check(outcome)
    })
}

pub(crate) fn entry_names(entries: &Vec<Entry>) -> Vec<String> {
    entries.iter().map(|e| e.name.clone()).collect()
}

async fn read_source(path: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound(format!("source file not found: {path}"))
        } else {
            Error::Io(e)
        }
    })
}

fn build_upload_pairs(sources: &[PathBuf], resource_base: &str) -> Result<Vec<TransferItem>> {
    let mut pairs = Vec::new();
    for entry in walk::walk_files_and_dirs(sources)? {
        let object = walk::file_name_to_object_name(&entry.source);
        if object.is_empty() {
            continue;
        }
        let mut destination = format!("{resource_base}{object}");
        if entry.is_empty_dir {
            destination.push('/');
        }
        pairs.push(TransferItem {
            source: entry.source.to_string_lossy().into_owned(),
            destination,
        });
    }
    Ok(pairs)
}

fn build_download_pairs(entries: &[Entry], prefix: &str, dest: &Path) -> Vec<TransferItem> {
    entries
        .iter()
        .filter_map(|entry| {
            let relative = entry
                .name
                .strip_prefix(prefix)
                .unwrap_or(&entry.name)
                .trim_start_matches('/');
            if relative.is_empty() {
                return None;
            }
            Some(TransferItem {
                source: entry.name.clone(),
                destination: dest.join(relative).to_string_lossy().into_owned(),
            })
        })
        .collect()
}
