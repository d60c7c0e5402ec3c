use std::sync::Arc;

use iced::futures::{SinkExt, Stream};
use iced::widget::{button, column, container, row, text, Column};
use iced::{Element, Length, Task, Theme};
use tracing::{error, info, warn};

use photo_stream::fetch;
use photo_stream::state::data::DownloadOutcome;
use photo_stream::state::gallery::Gallery;
use photo_stream::{logging, Config, Pipeline, PipelineEvent, Policy};

// Declare the ui module
mod ui;

/// How many failure messages to keep on screen
const VISIBLE_FAILURES: usize = 5;

/// Which of the three batch buttons was pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchKind {
    Sync,
    Async,
    Agent,
}

/// Main application state
struct PhotoStream {
    /// Running pipeline, once startup has finished
    pipeline: Option<Arc<Pipeline>>,
    /// Images delivered so far for the current batch
    gallery: Gallery,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    /// Cleanup done, watcher running
    Started(Arc<Pipeline>),
    /// Startup failed; the app stays up but cannot run batches
    StartFailed(String),
    /// A reconciled arrival (or a give-up) from the pipeline
    Delivery(PipelineEvent),
    /// User clicked one of the batch buttons
    RunBatch(BatchKind),
    /// One identifier of the running batch finished
    Outcome(DownloadOutcome),
    /// A batch could not be started
    BatchFailed(String),
    /// The outcome stream of a batch closed
    BatchDone(Policy),
    /// User clicked "Cancel"
    CancelBatch,
}

impl PhotoStream {
    /// Create a new instance of the application
    fn new(config: Config) -> (Self, Task<Message>) {
        let status = "Cleaning up and starting watcher...".to_string();

        (
            PhotoStream {
                pipeline: None,
                gallery: Gallery::new(),
                status,
            },
            Task::run(start_pipeline(config), |message| message),
        )
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Started(pipeline) => {
                self.status = format!("Ready. Watching {}", pipeline.working_dir().display());
                self.pipeline = Some(pipeline);
                Task::none()
            }
            Message::StartFailed(reason) => {
                error!("❌ Pipeline failed to start: {reason}");
                self.status = format!("❌ Could not start: {reason}");
                Task::none()
            }
            Message::Delivery(PipelineEvent::Arrived(image)) => {
                self.gallery.push(image);
                self.refresh_status();
                Task::none()
            }
            Message::Delivery(PipelineEvent::GaveUp { path, error }) => {
                self.gallery
                    .record_failure(format!("{}: {error}", path.display()));
                self.refresh_status();
                Task::none()
            }
            Message::RunBatch(kind) => {
                let Some(pipeline) = self.pipeline.clone() else {
                    return Task::none();
                };

                let policy = match kind {
                    BatchKind::Sync => Policy::Sequential,
                    BatchKind::Async => Policy::Parallel,
                    BatchKind::Agent => pipeline.agent_policy(),
                };

                self.gallery.clear();
                self.status = format!("Running {policy} batch...");
                info!(%policy, "Batch requested");

                Task::run(batch_outcomes(pipeline, policy), |message| message)
            }
            Message::Outcome(outcome) => {
                self.gallery.record_outcome(&outcome);
                self.refresh_status();
                Task::none()
            }
            Message::BatchFailed(reason) => {
                warn!("⚠️  Batch failed to start: {reason}");
                self.status = format!("⚠️  {reason}");
                Task::none()
            }
            Message::BatchDone(policy) => {
                let tally = self.gallery.tally();
                info!(
                    %policy,
                    succeeded = tally.succeeded,
                    failed = tally.failed,
                    cancelled = tally.cancelled,
                    "📊 Batch summary"
                );
                self.refresh_status();
                Task::none()
            }
            Message::CancelBatch => {
                if let Some(pipeline) = &self.pipeline {
                    pipeline.cancel_batches();
                }
                Task::none()
            }
        }
    }

    fn refresh_status(&mut self) {
        let tally = self.gallery.tally();
        self.status = format!(
            "✅ {} downloaded, {} failed, {} cancelled. {} shown.",
            tally.succeeded,
            tally.failed,
            tally.cancelled,
            self.gallery.len()
        );
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let ready = self.pipeline.is_some();
        let batch_button = |label: &'static str, kind: BatchKind| {
            button(label)
                .on_press_maybe(ready.then_some(Message::RunBatch(kind)))
                .padding(10)
        };

        let controls = row![
            batch_button("Sync", BatchKind::Sync),
            batch_button("Async", BatchKind::Async),
            batch_button("Agent", BatchKind::Agent),
            button("Cancel")
                .on_press_maybe(ready.then_some(Message::CancelBatch))
                .padding(10),
        ]
        .spacing(10);

        let failures: Column<Message> = self
            .gallery
            .failures()
            .iter()
            .rev()
            .take(VISIBLE_FAILURES)
            .fold(Column::new().spacing(2), |col, failure| {
                col.push(text(failure).size(12))
            });

        let content: Column<Message> = column![
            text("Photo Stream").size(32),
            controls,
            text(&self.status).size(16),
            failures,
            ui::grid::view(&self.gallery),
        ]
        .spacing(16)
        .padding(20);

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> iced::Result {
    logging::init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {e}");
            std::process::exit(2);
        }
    };

    iced::application("Photo Stream", PhotoStream::update, PhotoStream::view)
        .theme(PhotoStream::theme)
        .centered()
        .run_with(move || PhotoStream::new(config.clone()))
}

/// Clean up, start watching, then forward every delivery to the UI.
/// Runs for the lifetime of the app on iced's tokio executor.
fn start_pipeline(config: Config) -> impl Stream<Item = Message> {
    iced::stream::channel(100, move |mut output| async move {
        let fetcher = match fetch::from_config(&config) {
            Ok(fetcher) => fetcher,
            Err(e) => {
                let _ = output.send(Message::StartFailed(e.to_string())).await;
                return;
            }
        };

        let (pipeline, mut deliveries) = match Pipeline::start(config, fetcher).await {
            Ok(started) => started,
            Err(e) => {
                let _ = output.send(Message::StartFailed(e.to_string())).await;
                return;
            }
        };

        if output.send(Message::Started(Arc::new(pipeline))).await.is_err() {
            return;
        }

        while let Some(event) = deliveries.recv().await {
            if output.send(Message::Delivery(event)).await.is_err() {
                break;
            }
        }
    })
}

/// Run one batch and stream its outcomes to the UI.
fn batch_outcomes(pipeline: Arc<Pipeline>, policy: Policy) -> impl Stream<Item = Message> {
    iced::stream::channel(100, move |mut output| async move {
        match pipeline.run_batch(policy).await {
            Ok(mut outcomes) => {
                while let Some(outcome) = outcomes.recv().await {
                    if output.send(Message::Outcome(outcome)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = output.send(Message::BatchFailed(e.to_string())).await;
            }
        }

        let _ = output.send(Message::BatchDone(policy)).await;
    })
}
