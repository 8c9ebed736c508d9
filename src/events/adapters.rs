//! Adapters that compose onto the base [`EventBus`](super::bus::EventBus) by
//! themselves implementing [`EventHandler`].

use super::bus::EventHandler;
use super::event::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// External collaborator contract for terminal log sinks.
pub trait LogSink: Send + Sync {
    fn write(&self, event: &Event);
}

/// External collaborator contract for terminal metrics sinks.
pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &str, value: u64, labels: &[(&str, &str)]);
    fn histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]);
    fn gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]);
}

/// A `LogSink`/`MetricsSink` that discards everything, for tests and standalone use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;
impl LogSink for NullLogSink {
    fn write(&self, _event: &Event) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsSink;
impl MetricsSink for NullMetricsSink {
    fn counter(&self, _name: &str, _value: u64, _labels: &[(&str, &str)]) {}
    fn histogram(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
    fn gauge(&self, _name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Writes every event to `tracing` at info level, for standalone use without a real
/// log backend wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;
impl LogSink for TracingLogSink {
    fn write(&self, event: &Event) {
        tracing::info!(event_id = %event.id, action = %event.action, "event");
    }
}

/// Accumulates events and flushes them to an inner handler once `buffer_size` is
/// reached. A periodic flush on `flush_interval` requires [`Self::spawn_flusher`].
pub struct BufferedEventAdapter {
    inner: Arc<dyn EventHandler>,
    buffer: Mutex<Vec<Event>>,
    buffer_size: usize,
}

impl BufferedEventAdapter {
    pub fn new(inner: Arc<dyn EventHandler>, buffer_size: usize) -> Arc<Self> {
        Arc::new(Self { inner, buffer: Mutex::new(Vec::new()), buffer_size: buffer_size.max(1) })
    }

    pub fn flush(&self) {
        let drained: Vec<Event> = {
            let mut buf = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::take(&mut *buf)
        };
        for event in &drained {
            self.inner.handle(event);
        }
    }

    /// Spawns a background task that flushes on `interval` for the lifetime of the
    /// returned `Arc`. Requires a running tokio runtime.
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(adapter) => adapter.flush(),
                    None => return,
                }
            }
        });
    }
}

impl EventHandler for BufferedEventAdapter {
    fn handle(&self, event: &Event) {
        let should_flush = {
            let mut buf = self.buffer.lock().unwrap_or_else(|p| p.into_inner());
            buf.push(event.clone());
            buf.len() >= self.buffer_size
        };
        if should_flush {
            self.flush();
        }
    }
}

/// Hands events to a bounded queue drained by a background task, so a slow inner
/// handler never blocks the publisher. Drops the newest event on overflow and counts
/// the drop.
pub struct AsyncEventAdapter {
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

impl AsyncEventAdapter {
    pub fn new(inner: Arc<dyn EventHandler>, capacity: usize) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<Event>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                inner.handle(&event);
            }
        });
        Arc::new(Self { sender: tx, dropped: Arc::new(AtomicU64::new(0)) })
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventHandler for AsyncEventAdapter {
    fn handle(&self, event: &Event) {
        if self.sender.try_send(event.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Admits only events matching `predicate` before forwarding to `inner`.
pub struct FilterEventAdapter {
    inner: Arc<dyn EventHandler>,
    predicate: Box<dyn Fn(&Event) -> bool + Send + Sync>,
}

impl FilterEventAdapter {
    pub fn new(inner: Arc<dyn EventHandler>, predicate: impl Fn(&Event) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { inner, predicate: Box::new(predicate) })
    }
}

impl EventHandler for FilterEventAdapter {
    fn handle(&self, event: &Event) {
        if (self.predicate)(event) {
            self.inner.handle(event);
        }
    }
}

/// Delivers to an ordered list of handlers; one handler's panic never stops the rest.
pub struct ChainEventAdapter {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl ChainEventAdapter {
    pub fn new(handlers: Vec<Arc<dyn EventHandler>>) -> Arc<Self> {
        Arc::new(Self { handlers })
    }
}

impl EventHandler for ChainEventAdapter {
    fn handle(&self, event: &Event) {
        for handler in &self.handlers {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.handle(event)));
        }
    }
}

/// Terminal adapter forwarding every event to a [`LogSink`].
pub struct LogEventAdapter<S: LogSink> {
    sink: S,
}

impl<S: LogSink> LogEventAdapter<S> {
    pub fn new(sink: S) -> Arc<Self> {
        Arc::new(Self { sink })
    }
}

impl<S: LogSink> EventHandler for LogEventAdapter<S> {
    fn handle(&self, event: &Event) {
        self.sink.write(event);
    }
}

/// Terminal adapter translating events into counter increments on a [`MetricsSink`].
pub struct MetricsEventAdapter<S: MetricsSink> {
    sink: S,
}

impl<S: MetricsSink> MetricsEventAdapter<S> {
    pub fn new(sink: S) -> Arc<Self> {
        Arc::new(Self { sink })
    }
}

impl<S: MetricsSink> EventHandler for MetricsEventAdapter<S> {
    fn handle(&self, event: &Event) {
        let status = match event.status {
            super::event::EventStatus::Success => "success",
            super::event::EventStatus::Failure => "failure",
            super::event::EventStatus::Error => "error",
            super::event::EventStatus::Denied => "denied",
        };
        self.sink.counter("events_total", 1, &[("action", &event.action), ("status", status)]);
    }
}
