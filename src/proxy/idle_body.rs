//! Response-body wrapper enforcing the `idleTimeout` tier (§4.5): the
//! stream is cut if no frame arrives within the configured idle gap.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body::{Body, Frame};
use hyper::body::Incoming;
use tokio::time::Sleep;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("idle timeout: no data received for {0:?}")]
    Idle(Duration),
    /// §4.5 `callAndStreamTimeout`: the status line was already delivered,
    /// so the caller reports the response as received and simply truncates
    /// the body here.
    #[error("call-and-stream timeout exceeded")]
    Overall,
}

/// Wraps an upstream [`Incoming`] body, resetting an idle timer on every
/// frame and failing the stream once either the idle timer or the overall
/// `callAndStreamTimeout` deadline elapses.
pub struct IdleTimeoutBody {
    inner: Incoming,
    idle_timeout: Duration,
    overall_deadline: Instant,
    sleep: Pin<Box<Sleep>>,
}

impl IdleTimeoutBody {
    pub fn new(inner: Incoming, idle_timeout: Duration, call_and_stream_timeout: Duration, attempt_start: Instant) -> Self {
        Self {
            inner,
            idle_timeout,
            overall_deadline: attempt_start + call_and_stream_timeout,
            sleep: Box::pin(tokio::time::sleep(idle_timeout)),
        }
    }
}

impl Body for IdleTimeoutBody {
    type Data = Bytes;
    type Error = Box<dyn std::error::Error + Send + Sync>;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if Instant::now() >= this.overall_deadline {
            return Poll::Ready(Some(Err(Box::new(StreamError::Overall) as _)));
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(frame) => {
                this.sleep.as_mut().reset(tokio::time::Instant::now() + this.idle_timeout);
                Poll::Ready(frame.map(|r| r.map_err(|e| Box::new(e) as _)))
            }
            Poll::Pending => match this.sleep.as_mut().poll(cx) {
                Poll::Ready(()) => Poll::Ready(Some(Err(Box::new(StreamError::Idle(this.idle_timeout)) as _))),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }
}
