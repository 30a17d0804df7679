//! Cooperative cancellation helpers
//!
//! Every async component interface takes a [`CancellationToken`]. Code
//! checks the token at suspension points with [`ensure_active`] and wraps
//! outbound streams with [`guard_stream`], which yields a single
//! `Canceled` error and then closes once the token trips.

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Fail with `Canceled` when the token has tripped
pub fn ensure_active(token: &CancellationToken) -> Result<()> {
    if token.is_cancelled() {
        Err(Error::Canceled)
    } else {
        Ok(())
    }
}

/// Tie a result stream to a cancellation token
///
/// After the token trips the stream emits one `Err(Canceled)` and ends;
/// no further items from the inner stream are produced.
pub fn guard_stream<T: Send + 'static>(
    stream: BoxStream<'static, Result<T>>,
    token: CancellationToken,
) -> BoxStream<'static, Result<T>> {
    stream
        .scan(false, move |done, item| {
            if *done {
                return futures::future::ready(None);
            }
            if token.is_cancelled() {
                *done = true;
                return futures::future::ready(Some(Err(Error::Canceled)));
            }
            futures::future::ready(Some(item))
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn test_ensure_active() {
        let token = CancellationToken::new();
        assert!(ensure_active(&token).is_ok());
        token.cancel();
        assert!(matches!(ensure_active(&token), Err(Error::Canceled)));
    }

    #[tokio::test]
    async fn test_guard_stream_passes_items_through() {
        let token = CancellationToken::new();
        let inner = stream::iter(vec![Ok(1), Ok(2), Ok(3)]).boxed();
        let items: Vec<_> = guard_stream(inner, token).collect().await;
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.is_ok()));
    }

    #[tokio::test]
    async fn test_guard_stream_stops_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let inner = stream::iter(vec![Ok(1), Ok(2)]).boxed();
        let items: Vec<std::result::Result<i32, Error>> =
            guard_stream(inner, token).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Canceled)));
    }
}
