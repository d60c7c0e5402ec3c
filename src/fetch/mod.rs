/// The fetch boundary: identifier in, bytes out.
///
/// The scheduler only sees [`FetchClient`]. Two implementations ship:
/// - `http.rs` - GET on a templated URL
/// - `directory.rs` - copy out of a local folder with optional latency

mod directory;
mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, SourceConfig};
use crate::error::FetchError;
use crate::state::data::ImageId;

pub use directory::DirectoryFetchClient;
pub use http::HttpFetchClient;

/// Retrieves the raw bytes of one image.
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, id: &ImageId) -> Result<Vec<u8>, FetchError>;

    /// Identifiers this source can serve when no batch is configured.
    async fn list_identifiers(&self) -> Result<Vec<ImageId>, FetchError> {
        Ok(Vec::new())
    }
}

/// Build the client described by the configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn FetchClient>, FetchError> {
    let client: Arc<dyn FetchClient> = match &config.source {
        SourceConfig::Http { url_template } => Arc::new(HttpFetchClient::new(url_template)?),
        SourceConfig::Directory { path, latency_ms } => Arc::new(DirectoryFetchClient::new(
            path.clone(),
            config.extension.clone(),
            Duration::from_millis(*latency_ms),
        )),
    };
    Ok(client)
}
