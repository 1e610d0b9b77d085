//! Streaming upstream bodies.
//!
//! The stream owns the upstream response and its connection permit. They are
//! released exactly once: when the stream ends, when it yields an error, or
//! when the downstream body is dropped (client disconnect).

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::OwnedSemaphorePermit;

use crate::observability::metrics;

/// Resources held while an upstream stream is open.
#[derive(Debug)]
struct StreamLease {
    target: String,
    opened_at: Instant,
    bytes: u64,
    outcome: StreamOutcome,
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamOutcome {
    Abandoned,
    Completed,
    Failed,
}

impl StreamOutcome {
    fn as_str(self) -> &'static str {
        match self {
            StreamOutcome::Abandoned => "abandoned",
            StreamOutcome::Completed => "completed",
            StreamOutcome::Failed => "failed",
        }
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        tracing::debug!(
            target_url = %self.target,
            outcome = self.outcome.as_str(),
            bytes = self.bytes,
            elapsed_ms = self.opened_at.elapsed().as_millis() as u64,
            "Upstream stream released"
        );
        metrics::record_stream_closed(self.outcome.as_str());
    }
}

/// Single-pass, non-restartable stream of upstream body chunks.
pub struct UpstreamStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    lease: Option<StreamLease>,
}

impl UpstreamStream {
    pub(crate) fn new<S>(inner: S, target: String, permit: OwnedSemaphorePermit) -> Self
    where
        S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    {
        Self {
            inner: inner.boxed(),
            lease: Some(StreamLease {
                target,
                opened_at: Instant::now(),
                bytes: 0,
                outcome: StreamOutcome::Abandoned,
                _permit: permit,
            }),
        }
    }

    /// Whether the upstream resources are still held.
    pub fn is_open(&self) -> bool {
        self.lease.is_some()
    }

    fn release(&mut self, outcome: StreamOutcome) {
        self.inner = stream::empty().boxed();
        if let Some(mut lease) = self.lease.take() {
            lease.outcome = outcome;
        }
    }
}

impl Stream for UpstreamStream {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.lease.is_none() {
            return Poll::Ready(None);
        }

        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(lease) = this.lease.as_mut() {
                    lease.bytes += chunk.len() as u64;
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                if let Some(lease) = this.lease.as_ref() {
                    tracing::warn!(target_url = %lease.target, error = %e, "Upstream stream failed");
                }
                this.release(StreamOutcome::Failed);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.release(StreamOutcome::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for UpstreamStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamStream")
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}
