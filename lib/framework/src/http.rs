use std::time::Duration;

use reqwest::Url;
use tracing::Instrument;
use tracing::debug;
use tracing::debug_span;

use crate::exception::CoreRsResult;

pub struct HttpClient {
    client: reqwest::Client,
}

pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl HttpClient {
    pub fn new(timeout: Duration) -> CoreRsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(300))
            .connection_verbose(false)
            .build()
            .map_err(|err| exception!(message = "failed to build http client", source = err))?;
        Ok(HttpClient { client })
    }

    pub async fn get(&self, url: Url) -> CoreRsResult<HttpResponse> {
        let span = debug_span!("http_client", url = %url);
        async {
            debug!(url = %url, "[request] GET");
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            debug!(status, "[response]");
            let body = response.text().await?;
            debug!("[response] body={body}");
            Ok(HttpResponse { status, body })
        }
        .instrument(span)
        .await
    }
}
