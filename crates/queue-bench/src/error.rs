use thiserror::Error;

/// Errors from a single call to the queue server
#[derive(Error, Debug)]
pub enum ClientError {
    /// The request never produced an HTTP response (refused, reset, ...)
    #[error("network error calling /{endpoint}")]
    Network {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a status that is not a success for this call
    #[error("/{endpoint} returned HTTP {status}")]
    Remote { endpoint: &'static str, status: u16 },

    /// The response body could not be decoded
    #[error("malformed /{endpoint} response")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub fn endpoint(&self) -> &'static str {
        match self {
            ClientError::Network { endpoint, .. }
            | ClientError::Remote { endpoint, .. }
            | ClientError::Decode { endpoint, .. } => endpoint,
        }
    }
}

/// Errors that abort a benchmark phase
#[derive(Error, Debug)]
pub enum BenchError {
    /// A put worker saw a failed enqueue; puts are expected to always succeed
    #[error("put worker failed")]
    Put(#[source] ClientError),

    /// Stats are on the measurement path and are never retried
    #[error("failed to fetch queue stats")]
    Stats(#[source] ClientError),

    #[error("worker task panicked: {0}")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;
