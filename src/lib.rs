/// Photo stream: download a batch of images into a directory and surface
/// each file to the UI as soon as it can be decoded.
///
/// Architecture:
/// - `scheduler` - fetches a batch under one of three concurrency policies
/// - `watcher` - reports files created in the working directory
/// - `reconcile` - retries opening each arrival until it is fully written
/// - `pipeline` - wires the above together around the filesystem
/// - `state` - data model and the gallery the UI renders

pub mod config;
pub mod error;
pub mod fetch;
pub mod housekeeping;
pub mod imaging;
pub mod logging;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;
pub mod state;
pub mod watcher;

pub use config::Config;
pub use pipeline::Pipeline;
pub use reconcile::{PipelineEvent, RetryPolicy};
pub use scheduler::Policy;
