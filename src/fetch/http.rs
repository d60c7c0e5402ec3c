use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::FetchClient;
use crate::error::FetchError;
use crate::state::data::ImageId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches images over HTTP from a URL template containing `{id}`.
#[derive(Debug, Clone)]
pub struct HttpFetchClient {
    client: reqwest::Client,
    url_template: String,
}

impl HttpFetchClient {
    pub fn new(url_template: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }

    fn url_for(&self, id: &ImageId) -> String {
        self.url_template.replace("{id}", id.as_str())
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(&self, id: &ImageId) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(id);
        debug!(%id, %url, "GET");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(format!("{url} returned {status}")));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_substitution() {
        let client = HttpFetchClient::new("https://img.example/{id}/full.jpg").unwrap();
        assert_eq!(
            client.url_for(&ImageId::new("42")),
            "https://img.example/42/full.jpg"
        );
    }
}
