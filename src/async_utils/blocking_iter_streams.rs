//! Wrapper which turns blocking iterators (like [`crate::page_iter::PageIter`],
//! which reads rendered pages from disk) into async streams.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::{FutureExt as _, Stream};

use super::BoxedFuture;
use crate::prelude::*;

/// Where a [`BlockingIterStream`] currently keeps its iterator.
enum State<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    /// We hold the iterator and can ask it for the next value.
    Idle(I),

    /// The iterator is off on a blocking thread computing `next()`.
    Busy(BoxedFuture<(Option<Result<T>>, I)>),
}

/// A [`Stream`] wrapping a blocking iterator. Each call to `next()` runs on
/// Tokio's blocking pool, so slow disk reads never stall the executor.
pub struct BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    state: Option<State<I, T>>,
}

impl<I, T> BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    /// Create a new [`BlockingIterStream`] from an iterator.
    pub fn new(iter: I) -> Self {
        Self {
            state: Some(State::Idle(iter)),
        }
    }
}

impl<I, T> Stream for BlockingIterStream<I, T>
where
    I: Iterator<Item = Result<T>> + Send + Unpin + 'static,
    T: Send + 'static,
{
    type Item = I::Item;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        // Extract our state. We _must_ put this back before we return.
        let this = self.as_mut().get_mut();
        let state = this
            .state
            .take()
            .expect("BlockingIterStream state missing on entry to poll_next");

        let mut future = match state {
            State::Idle(mut iter) => spawn_blocking_propagating_panics(move || {
                let next = iter.next();
                (next, iter)
            })
            .boxed(),
            State::Busy(future) => future,
        };

        match Pin::new(&mut future).poll(cx) {
            Poll::Ready((next, iter)) => {
                this.state = Some(State::Idle(iter));
                Poll::Ready(next)
            }
            Poll::Pending => {
                this.state = Some(State::Busy(future));
                Poll::Pending
            }
        }
    }
}

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => value,
        Err(err) => std::panic::resume_unwind(err.into_panic()),
    }
}
