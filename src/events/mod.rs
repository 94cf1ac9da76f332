//! Crawl telemetry: typed events, broadcast bus, persistent recorder.

pub mod bus;
pub mod recorder;
pub mod streaming;
pub mod types;

pub use bus::{BusMetrics, EventBus};
pub use recorder::EventRecorder;
pub use streaming::filtered_stream;
pub use types::{FetchSource, TaskEvent, TaskEventRecord};
