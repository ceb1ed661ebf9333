// ── Reactive door-state streams ──
//
// Subscription types for consuming state pushes from a `WatchSink`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use garagelink_api::DoorState;

/// A subscription to one door-state characteristic.
///
/// Provides both point-in-time access and change notification via
/// [`changed()`](Self::changed) or by converting into a `Stream`.
pub struct DoorStateStream {
    current: DoorState,
    receiver: watch::Receiver<DoorState>,
}

impl DoorStateStream {
    pub(crate) fn new(receiver: watch::Receiver<DoorState>) -> Self {
        let current = *receiver.borrow();
        Self { current, receiver }
    }

    /// The value captured at creation time (or at the last `changed()`).
    pub fn current(&self) -> DoorState {
        self.current
    }

    /// The latest pushed value.
    pub fn latest(&self) -> DoorState {
        *self.receiver.borrow()
    }

    /// Wait for the next push, returning the new value.
    /// Returns `None` if the sink has been dropped.
    pub async fn changed(&mut self) -> Option<DoorState> {
        self.receiver.changed().await.ok()?;
        let state = *self.receiver.borrow_and_update();
        self.current = state;
        Some(state)
    }

    /// Convert into a `Stream`. The stream yields the latest value first,
    /// then every subsequent push.
    pub fn into_stream(self) -> DoorStateWatchStream {
        DoorStateWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter backed by a `watch::Receiver`.
pub struct DoorStateWatchStream {
    inner: WatchStream<DoorState>,
}

impl Stream for DoorStateWatchStream {
    type Item = DoorState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
