//! Handles for calls that are in flight: a single pending reply or a stream of
//! replies. Both can be cancelled from any thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures_util::stream::{Stream, StreamExt};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, debug};
use wirebind::{DynamicMessage, MethodDescriptor};

use crate::channel::ByteStream;
use crate::error::RpcError;

const SUBSCRIPTION_BUFFER: usize = 16;

#[derive(Debug, Default)]
struct CallState {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CallState {
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Cancels the call it was taken from; cheap to clone and send elsewhere.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<CallState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }
}

/// The pending reply of one unary call.
///
/// Resolves exactly once, with the reply, the failure, or [`RpcError::Cancelled`].
/// Dropping the handle abandons the reply but lets the request finish.
#[derive(Debug)]
pub struct CallHandle {
    state: Arc<CallState>,
    reply: oneshot::Receiver<Result<DynamicMessage, RpcError>>,
}

impl CallHandle {
    pub(crate) fn spawn<F>(call: F) -> Self
    where
        F: Future<Output = Result<DynamicMessage, RpcError>> + Send + 'static,
    {
        let state = Arc::new(CallState::default());
        let (sender, reply) = oneshot::channel();
        let watched = Arc::clone(&state);

        tokio::spawn(
            async move {
                let result = tokio::select! {
                    biased;
                    _ = watched.notify.notified() => Err(RpcError::Cancelled),
                    result = call => result,
                };
                // Receiver may be gone already; nothing is waiting then.
                let _ = sender.send(result);
            }
            .in_current_span(),
        );

        Self { state, reply }
    }

    /// Abandons the call. The handle then resolves to [`RpcError::Cancelled`] even
    /// if the reply already arrived.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn canceller(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

impl Future for CallHandle {
    type Output = Result<DynamicMessage, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.state.is_cancelled() {
            return Poll::Ready(Err(RpcError::Cancelled));
        }
        match Pin::new(&mut self.reply).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Decoded replies of a server-streaming call, in the order the server sent them.
///
/// The stream ends when the server finishes, after the first error, or once the
/// subscription is cancelled. Dropping it cancels the call.
#[derive(Debug)]
pub struct Subscription {
    state: Arc<CallState>,
    replies: ReceiverStream<Result<DynamicMessage, RpcError>>,
}

impl Subscription {
    pub(crate) fn spawn(method: &'static MethodDescriptor, mut frames: ByteStream) -> Self {
        let state = Arc::new(CallState::default());
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let watched = Arc::clone(&state);

        tokio::spawn(
            async move {
                let mut received = 0usize;
                loop {
                    let frame = tokio::select! {
                        biased;
                        _ = watched.notify.notified() => break,
                        _ = sender.closed() => break,
                        frame = frames.next() => frame,
                    };
                    let Some(frame) = frame else {
                        break;
                    };
                    let item = frame.and_then(|bytes| {
                        DynamicMessage::decode(method.output, &bytes).map_err(|error| {
                            RpcError::Decode {
                                method: method.path(),
                                error,
                            }
                        })
                    });
                    let failed = item.is_err();
                    if sender.send(item).await.is_err() || failed {
                        break;
                    }
                    received += 1;
                }
                debug!(received, "Server stream finished");
            }
            .in_current_span(),
        );

        Self {
            state,
            replies: ReceiverStream::new(receiver),
        }
    }

    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn canceller(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

impl Stream for Subscription {
    type Item = Result<DynamicMessage, RpcError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.state.is_cancelled() {
            return Poll::Ready(None);
        }
        Pin::new(&mut self.replies).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.cancel();
    }
}
