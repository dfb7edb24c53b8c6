//! Leading-and-trailing rate limiting for fallible streams.
//!
//! The first value passes immediately and opens a window. Values arriving
//! inside the window replace each other; when the window closes the latest
//! one is emitted and a new window opens. When the source ends, a value still
//! waiting is emitted before the end, so the last update for a context (its
//! destruction) is never lost. Errors are emitted immediately and end the
//! stream.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{FusedStream, Stream, StreamExt};
use tokio::time::{sleep, Sleep};

/// A rate-limited stream; see the module docs.
pub struct Throttle<S, T> {
    source: S,
    interval: Duration,
    window: Option<Pin<Box<Sleep>>>,
    pending: Option<T>,
    done: bool,
}

/// Emits at most one value of `source` per `interval`.
pub fn throttle<S, T, E>(source: S, interval: Duration) -> Throttle<S, T>
where
    S: Stream<Item = Result<T, E>> + Unpin,
{
    Throttle {
        source,
        interval,
        window: None,
        pending: None,
        done: false,
    }
}

impl<S, T> Throttle<S, T> {
    fn open_window(&mut self) {
        self.window = Some(Box::pin(sleep(self.interval)));
    }
}

impl<S, T, E> Stream for Throttle<S, T>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    T: Unpin,
{
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            match this.source.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(value))) => {
                    if this.window.is_none() {
                        this.open_window();
                        return Poll::Ready(Some(Ok(value)));
                    }
                    this.pending = Some(value);
                }
                Poll::Ready(Some(Err(error))) => {
                    this.done = true;
                    this.pending = None;
                    this.window = None;
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                    this.window = None;
                    return Poll::Ready(this.pending.take().map(Ok));
                }
                Poll::Pending => break,
            }
        }

        if let Some(window) = this.window.as_mut() {
            if window.as_mut().poll(cx).is_ready() {
                match this.pending.take() {
                    Some(value) => {
                        this.open_window();
                        return Poll::Ready(Some(Ok(value)));
                    }
                    None => this.window = None,
                }
            }
        }
        Poll::Pending
    }
}

impl<S, T, E> FusedStream for Throttle<S, T>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    T: Unpin,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}
