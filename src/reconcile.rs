/// Arrival reconciliation
///
/// The watcher fires as soon as a file is created, usually before the writer
/// has flushed it. Each arrival is therefore opened in a retry loop: any
/// decode failure counts as "not written yet" until the retry budget runs out.
///
/// Every arrival is reconciled on its own task, but all results funnel into a
/// single [`PipelineEvent`] channel. That channel is the only way images reach
/// the consumer, so deliveries are serialized no matter how many arrivals are
/// in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::{DecodeError, OpenError};
use crate::imaging::Decoder;
use crate::state::data::{ArrivalEvent, DecodedImage};
use crate::watcher::DirectoryWatcher;

/// Floor for the retry interval so a zero setting still yields to the runtime.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Longest exponent used when doubling the backoff delay.
const MAX_DOUBLINGS: u32 = 16;

/// How long to keep retrying an arrival that is not decodable yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retry forever at a fixed interval.
    UntilSuccess { interval_ms: u64 },
    /// Exponential backoff, giving up once `max_elapsed_ms` would be exceeded.
    Backoff {
        initial_ms: u64,
        max_delay_ms: u64,
        max_elapsed_ms: u64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::Backoff {
            initial_ms: 10,
            max_delay_ms: 500,
            max_elapsed_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, or `None` when the budget is spent.
    ///
    /// `attempts` is the number of attempts already made (at least 1).
    pub fn next_delay(&self, attempts: u32, elapsed: Duration) -> Option<Duration> {
        match *self {
            RetryPolicy::UntilSuccess { interval_ms } => {
                Some(Duration::from_millis(interval_ms).max(MIN_INTERVAL))
            }
            RetryPolicy::Backoff {
                initial_ms,
                max_delay_ms,
                max_elapsed_ms,
            } => {
                let doublings = attempts.saturating_sub(1).min(MAX_DOUBLINGS);
                let delay = initial_ms
                    .saturating_mul(1u64 << doublings)
                    .min(max_delay_ms);
                let delay = Duration::from_millis(delay).max(MIN_INTERVAL);

                if elapsed + delay > Duration::from_millis(max_elapsed_ms) {
                    None
                } else {
                    Some(delay)
                }
            }
        }
    }
}

/// What the consumer receives. One event per arrival, at most.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Arrived(DecodedImage),
    /// The file never became decodable within the retry budget.
    GaveUp { path: PathBuf, error: String },
}

/// Retry bookkeeping for one arrival; lives until success or give-up.
#[derive(Debug)]
struct RetryState {
    path: PathBuf,
    attempts: u32,
    started: Instant,
}

impl RetryState {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            attempts: 0,
            started: Instant::now(),
        }
    }
}

/// Opens arrivals as images, retrying while they are still being written.
pub struct ArrivalReconciler<D> {
    decoder: Arc<D>,
    policy: RetryPolicy,
}

impl<D: Decoder> ArrivalReconciler<D> {
    pub fn new(decoder: Arc<D>, policy: RetryPolicy) -> Self {
        Self { decoder, policy }
    }

    /// Try to open one arrival until it decodes, the policy gives up, or
    /// `cancel` fires.
    pub async fn open(
        &self,
        event: &ArrivalEvent,
        cancel: &CancellationToken,
    ) -> Result<DecodedImage, OpenError> {
        let mut state = RetryState::new(event.path.clone());

        loop {
            state.attempts += 1;

            let last = match self.try_open(&state.path).await {
                Ok(image) => {
                    debug!(
                        path = %state.path.display(),
                        attempts = state.attempts,
                        "Arrival decoded"
                    );
                    return Ok(image);
                }
                Err(OpenError::Transient(err)) => err,
                Err(other) => return Err(other),
            };
            trace!(path = %state.path.display(), attempt = state.attempts, error = %last, "Not readable yet");

            let Some(delay) = self
                .policy
                .next_delay(state.attempts, state.started.elapsed())
            else {
                return Err(OpenError::Fatal {
                    path: state.path,
                    attempts: state.attempts,
                    last,
                });
            };

            tokio::select! {
                () = cancel.cancelled() => return Err(OpenError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// A single open-and-decode attempt. Every failure is transient here;
    /// only the retry loop decides when to give up.
    ///
    /// The thumbnail is built in the same blocking task, so the consumer only
    /// has to append what it receives.
    pub async fn try_open(&self, path: &Path) -> Result<DecodedImage, OpenError> {
        let decoder = Arc::clone(&self.decoder);
        let owned = path.to_path_buf();
        let decoded = tokio::task::spawn_blocking(move || {
            decoder
                .decode(&owned)
                .map(|image| DecodedImage::new(owned, image))
        })
        .await
        .map_err(|e| {
            OpenError::Transient(DecodeError::Io(std::io::Error::other(format!(
                "decode task failed: {e}"
            ))))
        })?;

        decoded.map_err(OpenError::Transient)
    }

    /// Reconcile every arrival from `watcher` until `cancel` fires or the
    /// watcher closes. Results go to `handoff`, the single delivery point.
    pub fn spawn(
        self,
        mut watcher: DirectoryWatcher,
        handoff: mpsc::Sender<PipelineEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let this = Arc::new(self);

        tokio::spawn(async move {
            let mut inflight = JoinSet::new();

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
                    arrival = watcher.next() => {
                        let Some(event) = arrival else { break };
                        let this = Arc::clone(&this);
                        let handoff = handoff.clone();
                        let cancel = cancel.clone();
                        inflight.spawn(async move {
                            this.deliver(event, &handoff, &cancel).await;
                        });
                    }
                }
            }

            if cancel.is_cancelled() {
                inflight.abort_all();
            } else {
                // Watcher closed: let the arrivals already seen finish.
                while inflight.join_next().await.is_some() {}
            }
            info!(dir = %watcher.dir().display(), "Reconciler stopped");
        })
    }

    async fn deliver(
        &self,
        event: ArrivalEvent,
        handoff: &mpsc::Sender<PipelineEvent>,
        cancel: &CancellationToken,
    ) {
        let delivery = match self.open(&event, cancel).await {
            Ok(image) => PipelineEvent::Arrived(image),
            Err(OpenError::Cancelled) => return,
            Err(err) => {
                warn!(path = %event.path.display(), "⚠️  {err}");
                PipelineEvent::GaveUp {
                    path: event.path,
                    error: err.to_string(),
                }
            }
        };

        if handoff.send(delivery).await.is_err() {
            debug!("Consumer gone, dropping delivery");
        }
    }
}

impl<D> std::fmt::Debug for ArrivalReconciler<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrivalReconciler")
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ImageDecoder;
    use chrono::Utc;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::fs;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::timeout;

    /// Fails a fixed number of times, then decodes a 512x256 image.
    struct FlakyDecoder {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyDecoder {
        fn failing(times: u32) -> Arc<Self> {
            Arc::new(Self {
                failures_left: AtomicU32::new(times),
                calls: AtomicU32::new(0),
            })
        }
    }

    impl Decoder for FlakyDecoder {
        fn decode(&self, _path: &Path) -> Result<DynamicImage, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(DecodeError::Truncated);
            }
            Ok(DynamicImage::new_rgb8(512, 256))
        }
    }

    fn event(path: &str) -> ArrivalEvent {
        ArrivalEvent {
            path: PathBuf::from(path),
            detected_at: Utc::now(),
        }
    }

    fn fast_backoff(max_elapsed_ms: u64) -> RetryPolicy {
        RetryPolicy::Backoff {
            initial_ms: 1,
            max_delay_ms: 10,
            max_elapsed_ms,
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(64, 64, |x, y| Rgb([x as u8, y as u8, (x ^ y) as u8]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::Backoff {
            initial_ms: 10,
            max_delay_ms: 50,
            max_elapsed_ms: 1_000,
        };
        let delays: Vec<_> = (1..=5)
            .map(|n| policy.next_delay(n, Duration::ZERO).unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 50, 50]);
    }

    #[test]
    fn test_backoff_gives_up_past_budget() {
        let policy = RetryPolicy::Backoff {
            initial_ms: 10,
            max_delay_ms: 50,
            max_elapsed_ms: 100,
        };
        assert!(policy.next_delay(1, Duration::from_millis(80)).is_some());
        assert!(policy.next_delay(1, Duration::from_millis(95)).is_none());
    }

    #[test]
    fn test_backoff_survives_huge_attempt_counts() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.next_delay(u32::MAX, Duration::ZERO),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_until_success_never_gives_up_and_never_spins() {
        let policy = RetryPolicy::UntilSuccess { interval_ms: 0 };
        assert_eq!(
            policy.next_delay(1_000, Duration::from_secs(3_600)),
            Some(MIN_INTERVAL)
        );
    }

    #[tokio::test]
    async fn test_retries_until_decodable() {
        let decoder = FlakyDecoder::failing(3);
        let reconciler = ArrivalReconciler::new(Arc::clone(&decoder), fast_backoff(5_000));

        let image = reconciler
            .open(&event("/w/a.png"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(image.path, PathBuf::from("/w/a.png"));
        assert_eq!(image.thumbnail.dimensions(), (256, 128));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_until_success_policy_keeps_going() {
        let decoder = FlakyDecoder::failing(20);
        let reconciler = ArrivalReconciler::new(
            Arc::clone(&decoder),
            RetryPolicy::UntilSuccess { interval_ms: 1 },
        );

        assert!(reconciler
            .open(&event("/w/a.png"), &CancellationToken::new())
            .await
            .is_ok());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 21);
    }

    #[tokio::test]
    async fn test_gives_up_with_fatal_error() {
        let decoder = FlakyDecoder::failing(u32::MAX);
        let reconciler = ArrivalReconciler::new(decoder, fast_backoff(30));

        let err = reconciler
            .open(&event("/w/corrupt.png"), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            OpenError::Fatal { path, attempts, .. } => {
                assert_eq!(path, PathBuf::from("/w/corrupt.png"));
                assert!(attempts > 1);
            }
            other => panic!("expected fatal error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_retrying() {
        let decoder = FlakyDecoder::failing(u32::MAX);
        let reconciler = ArrivalReconciler::new(
            decoder,
            RetryPolicy::UntilSuccess { interval_ms: 5 },
        );
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = timeout(
            Duration::from_secs(5),
            reconciler.open(&event("/w/never.png"), &cancel),
        )
        .await
        .unwrap()
        .unwrap_err();
        assert!(matches!(err, OpenError::Cancelled));
    }

    #[tokio::test]
    async fn test_partial_write_fails_then_complete_write_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunked.png");
        let data = png_bytes();
        let (head, tail) = data.split_at(data.len() / 2);

        fs::write(&path, head).unwrap();
        assert!(ImageDecoder.decode(&path).is_err());

        let reconciler = ArrivalReconciler::new(Arc::new(ImageDecoder), fast_backoff(5_000));
        let arrival = ArrivalEvent {
            path: path.clone(),
            detected_at: Utc::now(),
        };
        let cancel = CancellationToken::new();
        let opening = reconciler.open(&arrival, &cancel);

        let finish_write = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(tail).unwrap();
            file.sync_all().unwrap();
        };

        let (opened, ()) = tokio::join!(opening, finish_write);
        let image = opened.unwrap();
        assert_eq!((image.width(), image.height()), (64, 64));
    }

    #[tokio::test]
    async fn test_spawned_reconciler_delivers_once_per_arrival() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = DirectoryWatcher::watch(dir.path(), "png").unwrap();
        let (handoff, mut deliveries) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let handle = ArrivalReconciler::new(Arc::new(ImageDecoder), fast_backoff(200))
            .spawn(watcher, handoff, cancel.clone());

        fs::write(dir.path().join("good.png"), png_bytes()).unwrap();

        match timeout(Duration::from_secs(5), deliveries.recv()).await.unwrap() {
            Some(PipelineEvent::Arrived(image)) => {
                assert_eq!(image.path, dir.path().join("good.png"))
            }
            other => panic!("unexpected delivery: {other:?}"),
        }

        fs::write(dir.path().join("broken.png"), b"not a png at all").unwrap();

        match timeout(Duration::from_secs(5), deliveries.recv()).await.unwrap() {
            Some(PipelineEvent::GaveUp { path, .. }) => {
                assert_eq!(path, dir.path().join("broken.png"))
            }
            other => panic!("unexpected delivery: {other:?}"),
        }

        // Nothing else is pending for either arrival.
        assert!(timeout(Duration::from_millis(300), deliveries.recv())
            .await
            .is_err());

        cancel.cancel();
        handle.await.unwrap();
    }
}
