//! Typed pub/sub event bus (C1), used by every other subsystem for audit and telemetry.

pub mod adapters;
pub mod bus;
pub mod event;

pub use adapters::{
    AsyncEventAdapter, BufferedEventAdapter, ChainEventAdapter, FilterEventAdapter, LogEventAdapter, LogSink,
    MetricsEventAdapter, MetricsSink, NullLogSink, NullMetricsSink, TracingLogSink,
};
pub use bus::{EventBus, EventHandler};
pub use event::{Event, EventStatus, EventType, Metadata, MetadataValue};
