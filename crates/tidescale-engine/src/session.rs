//! Provider session protocol.
//!
//! A session binds one workload to one provider for one round. The
//! producer half (`ProviderSession`) is handed to the provider; the
//! consumer half (`SessionReceiver`) stays with the scheduler. Both halves
//! share a `CancellationToken`, and every blocking operation on either side
//! races against it, so neither side can be parked forever by the other.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use tidescale_core::{ParameterValue, Workload};

/// One batch of provider-supplied values, keyed by parameter name.
pub type ProvidedParameters = HashMap<String, ParameterValue>;

/// What the consumer sees on a session stream.
#[derive(Debug)]
pub enum SessionEvent {
    Values(ProvidedParameters),
    Error(anyhow::Error),
}

/// Open a session pair for `workload` against `provider`.
pub fn open(
    workload: Arc<Workload>,
    provider: impl Into<String>,
    parameters: Vec<String>,
) -> (ProviderSession, SessionReceiver) {
    let provider = provider.into();
    let (tx, rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let producer = ProviderSession {
        workload,
        provider: provider.clone(),
        parameters,
        tx,
        cancel: cancel.clone(),
    };
    let consumer = SessionReceiver {
        provider,
        rx,
        cancel,
    };
    (producer, consumer)
}

/// Producer view, owned by a provider for the duration of a round.
///
/// Consuming it with [`finish`](Self::finish) (or dropping it) closes the
/// stream; the consumer sees end-of-stream after any buffered event.
pub struct ProviderSession {
    workload: Arc<Workload>,
    provider: String,
    parameters: Vec<String>,
    tx: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl ProviderSession {
    pub fn workload(&self) -> &Arc<Workload> {
        &self.workload
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Parameter names this workload needs from this provider.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the consumer gave up on this session.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Deliver a batch of values. No-op once cancelled.
    ///
    /// Returns whether the batch was handed to the consumer.
    pub async fn put_result(&self, values: ProvidedParameters) -> bool {
        self.send(SessionEvent::Values(values)).await
    }

    /// Deliver a terminal failure. No-op once cancelled.
    pub async fn error(&self, err: impl Into<anyhow::Error>) -> bool {
        self.send(SessionEvent::Error(err.into())).await
    }

    /// Mark that no more values will be sent.
    pub fn finish(self) {
        trace!(
            workload = %self.workload,
            provider = %self.provider,
            cancelled = self.is_cancelled(),
            "session finished"
        );
    }

    async fn send(&self, event: SessionEvent) -> bool {
        if self.cancel.is_cancelled() {
            trace!(workload = %self.workload, provider = %self.provider, "send on cancelled session dropped");
            return false;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("workload", &self.workload.key)
            .field("provider", &self.provider)
            .field("parameters", &self.parameters)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Consumer view, held by the scheduler.
#[derive(Debug)]
pub struct SessionReceiver {
    provider: String,
    rx: mpsc::Receiver<SessionEvent>,
    cancel: CancellationToken,
}

impl SessionReceiver {
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Next event, or `None` once the stream finished or was cancelled.
    pub async fn next_result(&mut self) -> Option<SessionEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.rx.recv() => event,
        }
    }

    /// Cancel the session. Idempotent; unblocks a pending `next_result`.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            trace!(provider = %self.provider, "session cancelled");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A handle that cancels this session from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
