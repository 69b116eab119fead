//! HTTP feed download.

use futures::{Stream, TryStreamExt};
use tracing::info;

use crate::config::IngestConfig;
use crate::error::IngestError;

/// Streams the raw (still compressed) feed body.
pub struct FeedClient {
    client: reqwest::Client,
    config: IngestConfig,
}

impl FeedClient {
    pub fn new(config: IngestConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Issue the GET and return the body as a chunk stream.
    ///
    /// Only the wait for response headers is bounded; the body may take as
    /// long as the server keeps sending.
    pub async fn open(
        &self,
    ) -> Result<impl Stream<Item = Result<Vec<u8>, IngestError>>, IngestError> {
        let url = &self.config.feed_url;
        let timeout = self.config.request_timeout;

        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| IngestError::Timeout(timeout))??
            .error_for_status()?;

        info!(
            url = %url,
            status = %response.status(),
            content_length = ?response.content_length(),
            "Feed response received"
        );

        Ok(response
            .bytes_stream()
            .map_ok(|chunk| chunk.to_vec())
            .map_err(|e| IngestError::Stream(e.to_string())))
    }
}
