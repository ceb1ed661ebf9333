// ── Accessory state sink ──
//
// Where the reconciler pushes state changes. The hub integration
// implements `StateSink`; `WatchSink` is the in-process version that
// fans pushes out to any number of subscribers.

use tokio::sync::watch;

use garagelink_api::DoorState;

use crate::stream::DoorStateStream;

/// Receiver of door-state pushes.
///
/// Called with the device mutex held, so implementations must not block.
pub trait StateSink: Send + Sync {
    fn current_state_changed(&self, state: DoorState);
    fn target_state_changed(&self, state: DoorState);
}

/// `StateSink` backed by `watch` channels.
///
/// Both channels start at [`DoorState::Unknown`], which subscribers should
/// read as "nothing pushed yet".
pub struct WatchSink {
    current: watch::Sender<DoorState>,
    target: watch::Sender<DoorState>,
}

impl WatchSink {
    pub fn new() -> Self {
        let (current, _) = watch::channel(DoorState::Unknown);
        let (target, _) = watch::channel(DoorState::Unknown);
        Self { current, target }
    }

    pub fn subscribe_current(&self) -> DoorStateStream {
        DoorStateStream::new(self.current.subscribe())
    }

    pub fn subscribe_target(&self) -> DoorStateStream {
        DoorStateStream::new(self.target.subscribe())
    }
}

impl Default for WatchSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSink for WatchSink {
    fn current_state_changed(&self, state: DoorState) {
        self.current.send_replace(state);
    }

    fn target_state_changed(&self, state: DoorState) {
        self.target.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    #[test]
    fn subscribers_start_unknown() {
        let sink = WatchSink::new();
        assert_eq!(sink.subscribe_current().current(), DoorState::Unknown);
        assert_eq!(sink.subscribe_target().current(), DoorState::Unknown);
    }

    #[test]
    fn pushes_reach_existing_and_late_subscribers() {
        let sink = WatchSink::new();
        let early = sink.subscribe_current();

        sink.current_state_changed(DoorState::Open);

        assert_eq!(early.current(), DoorState::Unknown);
        assert_eq!(early.latest(), DoorState::Open);
        assert_eq!(sink.subscribe_current().current(), DoorState::Open);
        assert_eq!(sink.subscribe_target().current(), DoorState::Unknown);
    }

    #[tokio::test]
    async fn changed_yields_each_push() {
        let sink = WatchSink::new();
        let mut target = sink.subscribe_target();

        sink.target_state_changed(DoorState::Closed);
        assert_eq!(target.changed().await, Some(DoorState::Closed));
        assert_eq!(target.current(), DoorState::Closed);
    }

    #[tokio::test]
    async fn into_stream_starts_with_latest() {
        let sink = WatchSink::new();
        sink.current_state_changed(DoorState::Closing);

        let mut stream = sink.subscribe_current().into_stream();
        assert_eq!(stream.next().await, Some(DoorState::Closing));

        sink.current_state_changed(DoorState::Closed);
        assert_eq!(stream.next().await, Some(DoorState::Closed));
    }
}
