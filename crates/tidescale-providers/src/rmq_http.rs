//! RabbitMQ management-API provider.
//!
//! Supplies `queue-length` for each workload by reading
//! `GET {url}/api/queues/{vhost}/{queue}` and taking the `messages` field.
//! The queue and vhost come from the workload's own annotations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use base64::Engine;
use http_body_util::BodyExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use tidescale_core::config::RmqHttpConfig;
use tidescale_core::{ParameterType, ParameterValue};
use tidescale_engine::{ProvideFuture, Provider, ProviderConfig, ProviderSession};

use crate::annotations::AnnotationTable;

/// Parameter supplied by this provider.
pub const QUEUE_LENGTH: &str = "queue-length";
pub const QUEUE_ANNOTATION: &str = "queue";
pub const VHOST_ANNOTATION: &str = "vhost";
pub const DEFAULT_VHOST: &str = "/";

/// Everything outside RFC 3986 unreserved characters is escaped in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Debug, Error)]
pub enum RmqError {
    #[error("connecting to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    #[error("building request: {0}")]
    Request(#[from] http::Error),

    #[error("{uri} returned {status}")]
    Status { uri: String, status: http::StatusCode },

    #[error("decoding queue info: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Per-workload queue coordinates.
#[derive(Debug, Clone, Default, PartialEq)]
struct QueueTarget {
    queue: String,
    vhost: String,
}

#[derive(Debug, Deserialize)]
struct QueueInfo {
    #[serde(default)]
    messages: i64,
}

pub struct RmqHttpProvider {
    name: String,
    /// `host:port` of the management API.
    address: String,
    /// Path prefix of the management API, without trailing slash.
    base_path: String,
    authorization: String,
    timeout: Duration,
    annotation_prefix: String,
    targets: AnnotationTable<QueueTarget>,
}

impl RmqHttpProvider {
    pub fn new(config: &RmqHttpConfig, annotation_prefix: impl Into<String>) -> anyhow::Result<Self> {
        let uri: http::Uri = config
            .url
            .parse()
            .with_context(|| format!("invalid management url '{}'", config.url))?;
        anyhow::ensure!(
            uri.scheme_str() == Some("http"),
            "management url '{}' must use http://",
            config.url
        );
        let authority = uri
            .authority()
            .with_context(|| format!("management url '{}' has no host", config.url))?;
        let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));
        let credentials = format!("{}:{}", config.user, config.password);

        Ok(Self {
            name: config.name.clone(),
            address,
            base_path: uri.path().trim_end_matches('/').to_string(),
            authorization: format!(
                "Basic {}",
                base64::engine::general_purpose::STANDARD.encode(credentials)
            ),
            timeout: config.timeout()?,
            annotation_prefix: annotation_prefix.into(),
            targets: AnnotationTable::new()
                .required(QUEUE_ANNOTATION, |t: &mut QueueTarget, v| {
                    anyhow::ensure!(!v.is_empty(), "queue name is empty");
                    t.queue = v.to_string();
                    Ok(())
                })
                .optional(VHOST_ANNOTATION, DEFAULT_VHOST, |t: &mut QueueTarget, v| {
                    t.vhost = v.to_string();
                    Ok(())
                }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wrap into an engine provider entry supplying `queue-length:int`.
    pub fn into_provider_config(self) -> ProviderConfig {
        let name = self.name.clone();
        ProviderConfig::new(name, self).with_parameter(QUEUE_LENGTH, ParameterType::Int)
    }

    /// Fetch the current message count of one queue.
    async fn queue_length(&self, target: &QueueTarget) -> Result<i64, RmqError> {
        let path = queue_path(&self.base_path, &target.vhost, &target.queue);
        tokio::time::timeout(self.timeout, self.fetch(&path))
            .await
            .map_err(|_| RmqError::Timeout(self.timeout))?
    }

    async fn fetch(&self, path: &str) -> Result<i64, RmqError> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|source| RmqError::Connect {
                address: self.address.clone(),
                source,
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", &self.address)
            .header("authorization", &self.authorization)
            .header("accept", "application/json")
            .header("user-agent", "tidescale/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())?;

        let resp = sender.send_request(req).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RmqError::Status {
                uri: format!("http://{}{path}", self.address),
                status,
            });
        }
        let body = resp.into_body().collect().await?.to_bytes();
        let info: QueueInfo = serde_json::from_slice(&body)?;
        Ok(info.messages)
    }

    async fn serve(self: Arc<Self>, session: ProviderSession) {
        if session.is_cancelled() {
            session.finish();
            return;
        }

        let workload = Arc::clone(session.workload());
        let target = match self.targets.bind(&workload.annotations, &self.annotation_prefix) {
            Ok(target) => target,
            Err(e) => {
                session.error(e).await;
                session.finish();
                return;
            }
        };

        let fetched = tokio::select! {
            _ = session.cancelled() => {
                session.finish();
                return;
            }
            fetched = self.queue_length(&target) => fetched,
        };

        match fetched {
            Ok(messages) => {
                debug!(workload = %workload, queue = %target.queue, messages, "queue length fetched");
                let values = HashMap::from([(QUEUE_LENGTH.to_string(), ParameterValue::Int(messages))]);
                session.put_result(values).await;
            }
            Err(e) => {
                warn!(workload = %workload, queue = %target.queue, provider = %self.name, error = %e, "queue length fetch failed");
                session.error(e).await;
            }
        }
        session.finish();
    }
}

impl Provider for RmqHttpProvider {
    fn provide(self: Arc<Self>, sessions: Vec<ProviderSession>) -> ProvideFuture {
        Box::pin(async move {
            let mut tasks = JoinSet::new();
            for session in sessions {
                tasks.spawn(Arc::clone(&self).serve(session));
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(provider = %self.name, error = %e, "session task failed");
                }
            }
        })
    }
}

impl std::fmt::Debug for RmqHttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmqHttpProvider")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("base_path", &self.base_path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Management API path for one queue, each segment percent-encoded.
fn queue_path(base: &str, vhost: &str, queue: &str) -> String {
    format!(
        "{base}/api/queues/{}/{}",
        utf8_percent_encode(vhost, PATH_SEGMENT),
        utf8_percent_encode(queue, PATH_SEGMENT)
    )
}
