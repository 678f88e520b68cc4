// ── Reactive unit streams ──
//
// Subscription types for consuming unit changes from the store.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::UnitState;

type Snapshot = Arc<Vec<Arc<UnitState>>>;

/// A subscription to the unit collection.
///
/// Gives point-in-time snapshot access and change notification via
/// [`changed`](Self::changed) or by converting into a `Stream`.
pub struct UnitStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl UnitStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the store is dropped.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }

    pub fn into_stream(self) -> UnitWatchStream {
        UnitWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a fresh snapshot on every store mutation.
pub struct UnitWatchStream {
    inner: WatchStream<Snapshot>,
}

impl Stream for UnitWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use crate::model::UnitState;
    use crate::store::UnitStore;

    #[tokio::test]
    async fn changed_yields_new_snapshot() {
        let store = UnitStore::new();
        let mut stream = store.subscribe_units();
        assert!(stream.current().is_empty());

        store.register(UnitState::new("dev1", "Hall"));
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(stream.current().len(), 1);
    }

    #[tokio::test]
    async fn into_stream_yields_current_first() {
        let store = UnitStore::new();
        store.register(UnitState::new("dev1", "Hall"));

        let mut stream = store.subscribe_units().into_stream();
        let first = stream.next().await.unwrap();
        assert_eq!(first[0].id, "dev1");
    }
}
