/// Batch download scheduler
///
/// Fetches a batch of images and writes each one into the target directory.
/// Every policy is the same loop: `concurrency(batch)` workers pull the next
/// unclaimed identifier from a shared queue until it is empty. Sequential is
/// one worker, Parallel is one per item, BoundedPool is a fixed number.
///
/// Outcomes stream out as they happen. A batch always reports exactly one
/// outcome per identifier: failures are recorded and the batch carries on,
/// and identifiers that never ran because of cancellation are reported as
/// [`DownloadError::Cancelled`].

mod policy;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::DownloadError;
use crate::fetch::FetchClient;
use crate::state::data::{DownloadOutcome, ImageId};

pub use policy::{Policy, DEFAULT_POOL_SIZE};

/// Identifiers not yet claimed by a worker.
type WorkQueue = Arc<Mutex<VecDeque<ImageId>>>;

/// Downloads batches of images into one directory.
#[derive(Clone)]
pub struct Scheduler {
    fetcher: Arc<dyn FetchClient>,
    target_dir: PathBuf,
    extension: String,
    /// Number of the last batch started; part of every written file name.
    batches: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(fetcher: Arc<dyn FetchClient>, target_dir: PathBuf, extension: String) -> Self {
        Self {
            fetcher,
            target_dir,
            extension,
            batches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Start a batch and return the stream of its outcomes.
    ///
    /// The stream closes once every identifier has been reported. Cancelling
    /// `cancel` stops workers from claiming more work and aborts in-flight
    /// fetches; a write that already started is allowed to finish.
    pub fn run_batch(
        &self,
        ids: Vec<ImageId>,
        policy: Policy,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<DownloadOutcome> {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let workers = policy.concurrency(ids.len());
        let total = ids.len();
        let batch = self.batches.fetch_add(1, Ordering::Relaxed) + 1;
        let queue: WorkQueue = Arc::new(Mutex::new(ids.into()));
        let scheduler = self.clone();

        info!(batch, %policy, total, workers, "🚀 Starting batch");

        tokio::spawn(async move {
            let mut pool = JoinSet::new();
            for worker in 0..workers {
                pool.spawn(scheduler.clone().worker_loop(
                    worker,
                    batch,
                    Arc::clone(&queue),
                    outcome_tx.clone(),
                    cancel.clone(),
                ));
            }

            while let Some(joined) = pool.join_next().await {
                if let Err(e) = joined {
                    warn!("Download worker ended abnormally: {e}");
                }
            }

            // Whatever is still queued was never claimed.
            let unclaimed: Vec<ImageId> = lock(&queue).drain(..).collect();
            if !unclaimed.is_empty() {
                info!(count = unclaimed.len(), "Batch cancelled before all items ran");
            }
            for id in unclaimed {
                let _ = outcome_tx.send(DownloadOutcome {
                    id,
                    result: Err(DownloadError::Cancelled),
                });
            }

            debug!(batch, %policy, total, "Batch finished");
        });

        outcome_rx
    }

    async fn worker_loop(
        self,
        worker: usize,
        batch: u64,
        queue: WorkQueue,
        outcome_tx: mpsc::UnboundedSender<DownloadOutcome>,
        cancel: CancellationToken,
    ) {
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let next = lock(&queue).pop_front();
            let Some(id) = next else {
                break;
            };

            debug!(worker, %id, "Claimed");
            let result = self.download(&id, batch, &cancel).await;
            match &result {
                Ok(path) => info!(%id, path = %path.display(), "⬇️  Downloaded"),
                Err(DownloadError::Cancelled) => debug!(%id, "Download cancelled"),
                Err(e) => warn!(%id, "⚠️  {e}"),
            }

            if outcome_tx.send(DownloadOutcome { id, result }).is_err() {
                debug!(worker, "Outcome receiver dropped");
            }
        }
    }

    /// Fetch then write one image. Only the fetch is cancellable.
    ///
    /// The file is always created fresh: an existing file at the target name
    /// is a write error, never overwritten.
    async fn download(
        &self,
        id: &ImageId,
        batch: u64,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            fetched = self.fetcher.fetch(id) => fetched,
        };
        let bytes = fetched.map_err(|e| DownloadError::Fetch {
            id: id.clone(),
            reason: e.to_string(),
        })?;

        let path = self.target_dir.join(id.file_name(batch, &self.extension));
        let write_error = |e: std::io::Error| DownloadError::Write {
            path: path.clone(),
            reason: e.to_string(),
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(write_error)?;
        file.write_all(&bytes).await.map_err(write_error)?;
        file.flush().await.map_err(write_error)?;

        Ok(path)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("target_dir", &self.target_dir)
            .field("extension", &self.extension)
            .finish()
    }
}

/// The queue is only touched for a pop or a drain, so a poisoned lock still
/// holds consistent data.
fn lock(queue: &WorkQueue) -> std::sync::MutexGuard<'_, VecDeque<ImageId>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}
