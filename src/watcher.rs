/// Directory watcher
///
/// Emits one [`ArrivalEvent`] per file created in the watched directory.
/// Modification events are dropped so a file that is still being written does
/// not announce itself twice. Events go through an unbounded channel: the
/// notify callback never blocks and never drops an event during a burst.

use std::path::{Path, PathBuf};

use chrono::Utc;
use notify::event::CreateKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::has_extension;
use crate::error::WatchError;
use crate::state::data::ArrivalEvent;

/// Watches one directory for newly created images.
///
/// Stops when dropped; [`DirectoryWatcher::next`] then drains what is left
/// and returns `None`.
pub struct DirectoryWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<ArrivalEvent>,
}

impl DirectoryWatcher {
    /// Start watching `dir` (non-recursively) for files ending in `extension`.
    pub fn watch(dir: &Path, extension: &str) -> Result<Self, WatchError> {
        if !dir.is_dir() {
            return Err(WatchError::NotADirectory(dir.to_path_buf()));
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        let extension = extension.to_string();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for arrival in convert_notify_event(event, &extension) {
                        debug!(path = %arrival.path.display(), "File arrived");
                        if event_tx.send(arrival).is_err() {
                            // Receiver gone: the watcher is shutting down.
                            return;
                        }
                    }
                }
                Err(e) => error!("Watch error: {e}"),
            },
            Config::default(),
        )?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), "👀 Watching for new images");

        Ok(Self {
            dir: dir.to_path_buf(),
            _watcher: watcher,
            events,
        })
    }

    /// Next arrival, in detection order.
    pub async fn next(&mut self) -> Option<ArrivalEvent> {
        self.events.recv().await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("dir", &self.dir)
            .finish()
    }
}

/// Map a notify event to arrivals. Only file creations with the right extension count.
fn convert_notify_event(event: Event, extension: &str) -> Vec<ArrivalEvent> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => return Vec::new(),
        EventKind::Create(_) => {}
        _ => return Vec::new(),
    }

    let detected_at = Utc::now();
    event
        .paths
        .into_iter()
        .filter(|path| has_extension(path, extension))
        .map(|path| ArrivalEvent { path, detected_at })
        .collect()
}
