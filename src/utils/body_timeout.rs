use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use axum::body::Body as AxumBody;
use bytes::Bytes;
use hyper::body::{Body, Frame, SizeHint};
use tokio::time::{Instant, Sleep};

use crate::ports::http_client::HttpClientError;

/// Response body that aborts once no frame has arrived for `idle`.
///
/// Upstream bodies are streamed after the headers are already answered, so the
/// dispatch timeout no longer applies; this keeps a stalled upstream from holding
/// the client connection open forever.
pub struct IdleTimeoutBody {
    inner: AxumBody,
    idle: Duration,
    deadline: Pin<Box<Sleep>>,
    expired: bool,
}

impl IdleTimeoutBody {
    pub fn new(inner: AxumBody, idle: Duration) -> Self {
        Self {
            inner,
            idle,
            deadline: Box::pin(tokio::time::sleep(idle)),
            expired: false,
        }
    }
}

impl Body for IdleTimeoutBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.expired {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(frame) => {
                let next = Instant::now() + this.idle;
                this.deadline.as_mut().reset(next);
                Poll::Ready(frame)
            }
            Poll::Pending => match this.deadline.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    this.expired = true;
                    tracing::error!(
                        "Upstream body stalled for {:?}, aborting response",
                        this.idle
                    );
                    Poll::Ready(Some(Err(axum::Error::new(HttpClientError::Timeout(
                        this.idle,
                    )))))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        self.expired || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
