//! Response body wrapper reporting finish / close to the completion guard.

use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use crate::http::completion::CompletionGuard;

pin_project! {
    /// Body of a traced response.
    ///
    /// End of stream fires the guard's finish trigger; dropping the body
    /// before that fires the close trigger. Untraced responses carry no guard.
    pub struct TracedBody<B> {
        #[pin]
        inner: B,
        guard: Option<Arc<CompletionGuard>>,
    }

    impl<B> PinnedDrop for TracedBody<B> {
        fn drop(this: Pin<&mut Self>) {
            if let Some(guard) = this.project().guard.take() {
                guard.close();
            }
        }
    }
}

impl<B> TracedBody<B> {
    pub(crate) fn new(inner: B, guard: Arc<CompletionGuard>) -> Self {
        Self {
            inner,
            guard: Some(guard),
        }
    }

    pub(crate) fn passthrough(inner: B) -> Self {
        Self { inner, guard: None }
    }
}

impl<B: Body> Body for TracedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let frame = ready!(this.inner.as_mut().poll_frame(cx));

        let done = match &frame {
            None => true,
            Some(Ok(_)) => this.inner.is_end_stream(),
            Some(Err(_)) => {
                if let Some(guard) = this.guard.take() {
                    guard.close();
                }
                false
            }
        };
        if done {
            if let Some(guard) = this.guard.take() {
                guard.finish();
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
