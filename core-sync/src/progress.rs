//! Progress reporting for sync runs.
//!
//! The coordinator and the worker pool report through a [`ProgressSink`].
//! Nothing they do depends on what the sink does with an event.

use core_runtime::events::{CatalogEvent, CoreEvent, EventBus, SyncEvent};
use tracing::trace;

/// Receiver of run lifecycle, progress and catalog change events.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, event: SyncEvent);

    fn catalog_changed(&self, _event: CatalogEvent) {}
}

/// Forwards every event to an [`EventBus`].
#[derive(Clone)]
pub struct EventBusProgress {
    bus: EventBus,
}

impl EventBusProgress {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    fn emit(&self, event: CoreEvent) {
        // No subscribers is not an error.
        if self.bus.emit(event).is_err() {
            trace!("Event dropped, no subscribers");
        }
    }
}

impl ProgressSink for EventBusProgress {
    fn publish(&self, event: SyncEvent) {
        self.emit(CoreEvent::Sync(event));
    }

    fn catalog_changed(&self, event: CatalogEvent) {
        self.emit(CoreEvent::Catalog(event));
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn publish(&self, _event: SyncEvent) {}
}

/// Percentage of `processed` over `total`, 100 for an empty total.
pub fn percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed as f64 / total as f64) * 100.0).min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_progress_forwards() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let sink = EventBusProgress::new(bus);

        sink.publish(SyncEvent::Progress {
            run_id: "20250101-000000-000".to_string(),
            processed: 5,
            total: 10,
            percent: percent(5, 10),
        });
        sink.catalog_changed(CatalogEvent::SetCreated {
            set_id: "set-1".to_string(),
            name: "Holiday".to_string(),
        });

        match rx.recv().await.unwrap() {
            CoreEvent::Sync(SyncEvent::Progress { percent, .. }) => assert_eq!(percent, 50),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            CoreEvent::Catalog(CatalogEvent::SetCreated { .. })
        ));
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let sink = EventBusProgress::new(EventBus::new(4));
        sink.publish(SyncEvent::Started {
            run_id: "20250101-000000-000".to_string(),
            root: "/photos".to_string(),
        });
        NoopProgress.publish(SyncEvent::Started {
            run_id: "20250101-000000-000".to_string(),
            root: "/photos".to_string(),
        });
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(3, 3), 100);
    }
}
