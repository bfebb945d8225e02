use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::application::ports::http_transport::{HttpTransport, ProgressFn, TransferError};

/// Streaming HTTP client for manifest, logo and bundle downloads. Bodies are
/// buffered in memory; plugin bundles are small archives, not media files.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, url: &str, on_progress: ProgressFn<'_>) -> Result<Vec<u8>, TransferError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let message = format!("{url} answered {status}");
            // Server-side trouble and throttling are worth another attempt.
            return if status.is_server_error() || code == 408 || code == 429 {
                Err(TransferError::Transient { code: Some(code), message })
            } else {
                Err(TransferError::Permanent { code: Some(code), message })
            };
        }

        let total = response.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(8 * 1024 * 1024) as usize);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify)?;
            body.extend_from_slice(&chunk);
            on_progress(body.len() as u64, total);
        }
        Ok(body)
    }
}

fn classify(err: reqwest::Error) -> TransferError {
    let code = err.status().map(|s| s.as_u16());
    let message = err.to_string();
    let transient = err.is_timeout()
        || err.is_connect()
        || err.is_body()
        || err.status().is_some_and(|s| s.is_server_error());
    if transient {
        TransferError::Transient { code, message }
    } else {
        TransferError::Permanent { code, message }
    }
}
