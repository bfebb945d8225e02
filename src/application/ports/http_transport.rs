use async_trait::async_trait;

/// Failure modes of a single transfer, split by whether retrying the same
/// URL later can reasonably succeed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Timeouts, connection resets, 5xx responses. Worth retrying.
    #[error("transient network failure: {message}")]
    Transient { code: Option<u16>, message: String },
    /// 4xx responses, malformed URLs, TLS rejections. Retrying won't help.
    #[error("network failure: {message}")]
    Permanent { code: Option<u16>, message: String },
}

impl TransferError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransferError::Transient { .. })
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransferError::Transient { code, .. } | TransferError::Permanent { code, .. } => *code,
        }
    }
}

/// Cumulative progress callback: bytes received so far and the total when
/// the remote declared one.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Fetches one URL into memory. Implementations must report progress
/// monotonically and must not retry on their own; retry policy lives with
/// the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn fetch(&self, url: &str, on_progress: ProgressFn<'_>) -> Result<Vec<u8>, TransferError>;
}
