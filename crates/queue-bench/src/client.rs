//! Typed calls against the queue server's HTTP API.

use queue_types::{PutItem, QueueName, StatsSnapshot};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::trace;

use crate::error::ClientError;

/// Result of a successful `/take` round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dequeue {
    /// An item was handed out
    Item,
    /// Nothing arrived within the poll timeout; the queue is exhausted
    Empty,
}

/// Client for the `/put`, `/take` and `/stats` endpoints.
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Debug, Clone)]
pub struct QueueClient {
    http: reqwest::Client,
    base_url: String,
}

impl QueueClient {
    /// Create a client for the server at `base_url`, e.g. `http://localhost:8080`
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /put?queue=<name>
    pub async fn enqueue(&self, queue: &QueueName, item: &PutItem) -> Result<(), ClientError> {
        let response = self
            .http
            .post(format!("{}/put", self.base_url))
            .query(&[("queue", queue.as_str())])
            .json(item)
            .send()
            .await
            .map_err(|source| ClientError::Network {
                endpoint: "put",
                source,
            })?;

        let status = response.status();
        // Drain the body so the connection goes back to the pool
        drain(response, "put").await?;

        if status != StatusCode::OK {
            return Err(ClientError::Remote {
                endpoint: "put",
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// POST /take?queue=<name>&timeout-millis=<ms>
    ///
    /// 204 and 404 mean the server had nothing to hand out within `timeout`.
    pub async fn dequeue(
        &self,
        queue: &QueueName,
        timeout: Duration,
    ) -> Result<Dequeue, ClientError> {
        let timeout_millis = timeout.as_millis().to_string();
        let response = self
            .http
            .post(format!("{}/take", self.base_url))
            .query(&[
                ("queue", queue.as_str()),
                ("timeout-millis", timeout_millis.as_str()),
            ])
            .send()
            .await
            .map_err(|source| ClientError::Network {
                endpoint: "take",
                source,
            })?;

        let status = response.status();
        drain(response, "take").await?;

        match status {
            StatusCode::OK => Ok(Dequeue::Item),
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => {
                trace!(queue = %queue, status = status.as_u16(), "queue exhausted");
                Ok(Dequeue::Empty)
            }
            other => Err(ClientError::Remote {
                endpoint: "take",
                status: other.as_u16(),
            }),
        }
    }

    /// GET /stats
    pub async fn get_stats(&self) -> Result<StatsSnapshot, ClientError> {
        let response = self
            .http
            .get(format!("{}/stats", self.base_url))
            .send()
            .await
            .map_err(|source| ClientError::Network {
                endpoint: "stats",
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Remote {
                endpoint: "stats",
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Network {
                endpoint: "stats",
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| ClientError::Decode {
            endpoint: "stats",
            source,
        })
    }
}

async fn drain(response: reqwest::Response, endpoint: &'static str) -> Result<(), ClientError> {
    response
        .bytes()
        .await
        .map(|_| ())
        .map_err(|source| ClientError::Network { endpoint, source })
}
