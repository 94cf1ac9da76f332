//! Live event streaming with categorical filtering.

use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use super::bus::EventBus;
use super::types::TaskEventRecord;

/// Stream live events from the bus, optionally filtered to a set of
/// event types (exact matches on the categorical `event_type`).
///
/// Lagged gaps are skipped silently; the persisted table is the place
/// to go for a complete record.
pub fn filtered_stream(
    bus: &EventBus,
    event_types: Vec<String>,
) -> impl Stream<Item = TaskEventRecord> + Send + 'static {
    BroadcastStream::new(bus.subscribe()).filter_map(move |item| match item {
        Ok(record) => {
            if event_types.is_empty() || event_types.iter().any(|t| *t == record.event_type) {
                Some(record)
            } else {
                None
            }
        }
        Err(BroadcastStreamRecvError::Lagged(_)) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::TaskEvent;

    #[tokio::test]
    async fn test_filter_by_event_type() {
        let bus = EventBus::new("t", 16);
        let mut stream = Box::pin(filtered_stream(&bus, vec!["breaker.open".to_string()]));

        bus.publish(&TaskEvent::BreakerClosed {
            host: "a.example".into(),
        });
        bus.publish(&TaskEvent::BreakerOpen {
            host: "b.example".into(),
            consecutive_failures: 5,
        });

        let got = stream.next().await.unwrap();
        assert_eq!(got.event_type, "breaker.open");
    }
}
