/// Wiring of the producer and consumer halves.
///
/// The scheduler writes files; the watcher and reconciler pick them up. The
/// two sides share nothing but the working directory, so a failing batch can
/// never stop arrivals that are already on disk from being delivered.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::error::PipelineError;
use crate::fetch::FetchClient;
use crate::housekeeping;
use crate::imaging::ImageDecoder;
use crate::reconcile::{ArrivalReconciler, PipelineEvent};
use crate::scheduler::{Policy, Scheduler};
use crate::state::data::{DownloadOutcome, ImageId};
use crate::watcher::DirectoryWatcher;

/// Room for deliveries the consumer has not picked up yet.
const HANDOFF_CAPACITY: usize = 64;

/// A running watcher/reconciler plus the scheduler that feeds it.
pub struct Pipeline {
    config: Config,
    fetcher: Arc<dyn FetchClient>,
    scheduler: Scheduler,
    shutdown: CancellationToken,
    /// Parent of every running batch; swapped for a fresh one on cancel.
    batches: Mutex<CancellationToken>,
}

impl Pipeline {
    /// Clean the working directory, start watching it, and return the
    /// pipeline together with the consumer's delivery channel.
    pub async fn start(
        config: Config,
        fetcher: Arc<dyn FetchClient>,
    ) -> Result<(Self, mpsc::Receiver<PipelineEvent>), PipelineError> {
        config.validate()?;
        let working_dir = config.working_dir()?;

        housekeeping::clean(&working_dir, &config.extension)?;
        let watcher = DirectoryWatcher::watch(&working_dir, &config.extension)?;

        let shutdown = CancellationToken::new();
        let (handoff, deliveries) = mpsc::channel(HANDOFF_CAPACITY);
        ArrivalReconciler::new(Arc::new(ImageDecoder), config.retry).spawn(
            watcher,
            handoff,
            shutdown.clone(),
        );

        let scheduler = Scheduler::new(
            Arc::clone(&fetcher),
            working_dir.clone(),
            config.extension.clone(),
        );
        info!(dir = %working_dir.display(), "✅ Pipeline started");

        let pipeline = Self {
            batches: Mutex::new(shutdown.child_token()),
            config,
            fetcher,
            scheduler,
            shutdown,
        };
        Ok((pipeline, deliveries))
    }

    /// The configured batch, or whatever the source lists when none is set.
    pub async fn identifiers(&self) -> Result<Vec<ImageId>, PipelineError> {
        let configured = self.config.identifiers();
        if !configured.is_empty() {
            return Ok(configured);
        }
        Ok(self.fetcher.list_identifiers().await?)
    }

    /// Start a batch under `policy` and return its outcome stream.
    pub async fn run_batch(
        &self,
        policy: Policy,
    ) -> Result<mpsc::UnboundedReceiver<DownloadOutcome>, PipelineError> {
        if self.shutdown.is_cancelled() {
            return Err(PipelineError::ShutDown);
        }

        let ids = self.identifiers().await?;
        let cancel = self
            .batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .child_token();

        Ok(self.scheduler.run_batch(ids, policy, cancel))
    }

    /// The bounded pool policy sized from the configuration.
    pub fn agent_policy(&self) -> Policy {
        Policy::BoundedPool(self.config.pool_size)
    }

    /// Cancel every batch that is currently running. Arrivals already on disk
    /// are still delivered.
    pub fn cancel_batches(&self) {
        let mut batches = self.batches.lock().unwrap_or_else(PoisonError::into_inner);
        batches.cancel();
        *batches = self.shutdown.child_token();
        info!("🛑 Running batches cancelled");
    }

    /// Stop all batches and the reconciler.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn working_dir(&self) -> &Path {
        self.scheduler.target_dir()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("working_dir", &self.working_dir())
            .field("extension", &self.config.extension)
            .finish()
    }
}
