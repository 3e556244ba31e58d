use super::events::{CommandEvent, ControlEvent};
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tower::Service;

/// A telemetry sink that consumes control-plane events.
pub trait TelemetrySink:
    tower::Service<ControlEvent, Response = (), Error = Self::SinkError> + Clone + Send + 'static
{
    /// The error type for this sink.
    type SinkError: std::error::Error + Send + 'static;
}

/// Best-effort emit helper that honors `poll_ready` and swallows errors.
pub async fn emit_best_effort<S>(sink: S, event: ControlEvent)
where
    S: tower::Service<ControlEvent, Response = ()> + Send + Clone + 'static,
    S::Error: std::error::Error + Send + 'static,
    S::Future: Send + 'static,
{
    use tower::ServiceExt;

    if let Ok(mut ready_sink) = sink.ready_oneshot().await {
        let _ = ready_sink.call(event).await;
    }
}

type SinkFuture<E> = BoxFuture<'static, Result<(), E>>;

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl Service<ControlEvent> for NullSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _event: ControlEvent) -> Self::Future {
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for NullSink {
    type SinkError = Infallible;
}

/// A telemetry sink that logs events using the `tracing` crate.
///
/// Failures log at `warn`, everything else at `debug`.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl Service<ControlEvent> for LogSink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: ControlEvent) -> Self::Future {
        match &event {
            ControlEvent::Command(CommandEvent::Failed { .. }) => {
                tracing::warn!(event = %event, "control_event")
            }
            _ => tracing::debug!(event = %event, "control_event"),
        }
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for LogSink {
    type SinkError = Infallible;
}

/// A telemetry sink that stores events in memory, evicting the oldest past capacity.
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<ControlEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<ControlEvent> {
        self.lock().clone()
    }

    /// Events for one command, in emission order.
    pub fn for_command(&self, command: &str) -> Vec<ControlEvent> {
        self.lock().iter().filter(|e| e.command() == Some(command)).cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ControlEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<ControlEvent> for MemorySink {
    type Response = ();
    type Error = Infallible;
    type Future = SinkFuture<Infallible>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: ControlEvent) -> Self::Future {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event);
        Box::pin(async { Ok(()) })
    }
}

impl TelemetrySink for MemorySink {
    type SinkError = Infallible;
}

#[derive(Debug)]
pub struct ComposedSinkError(Box<dyn std::error::Error + Send + Sync>);

impl std::fmt::Display for ComposedSinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "telemetry sink error: {}", self.0)
    }
}

impl std::error::Error for ComposedSinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

/// Delivers every event to two sinks.
#[derive(Clone, Debug)]
pub struct MulticastSink<A, B> {
    sink_a: A,
    sink_b: B,
}

impl<A, B> MulticastSink<A, B> {
    pub fn new(sink_a: A, sink_b: B) -> Self {
        Self { sink_a, sink_b }
    }
}

impl<A, B> Service<ControlEvent> for MulticastSink<A, B>
where
    A: tower::Service<ControlEvent, Response = ()> + Clone + Send + 'static,
    A::Error: std::error::Error + Send + Sync + 'static,
    A::Future: Send + 'static,
    B: tower::Service<ControlEvent, Response = ()> + Clone + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
    B::Future: Send + 'static,
{
    type Response = ();
    type Error = ComposedSinkError;
    type Future = SinkFuture<ComposedSinkError>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, event: ControlEvent) -> Self::Future {
        let mut sink_a = self.sink_a.clone();
        let mut sink_b = self.sink_b.clone();
        let event_clone = event.clone();

        Box::pin(async move {
            let (res_a, res_b) = tokio::join!(sink_a.call(event), sink_b.call(event_clone));
            res_a.map_err(|e| ComposedSinkError(Box::new(e)))?;
            res_b.map_err(|e| ComposedSinkError(Box::new(e)))?;
            Ok(())
        })
    }
}

impl<A, B> TelemetrySink for MulticastSink<A, B>
where
    A: tower::Service<ControlEvent, Response = ()> + Clone + Send + 'static,
    A::Error: std::error::Error + Send + Sync + 'static,
    A::Future: Send + 'static,
    B: tower::Service<ControlEvent, Response = ()> + Clone + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
    B::Future: Send + 'static,
{
    type SinkError = ComposedSinkError;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::telemetry::events::SessionEvent;
    use std::time::Duration;

    fn sent(command: &'static str) -> ControlEvent {
        ControlEvent::Command(CommandEvent::Sent { command })
    }

    #[tokio::test]
    async fn test_null_sink() {
        let mut sink = NullSink;
        sink.call(sent("listRoles")).await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_sink_evicts_oldest() {
        let mut sink = MemorySink::with_capacity(2);
        assert!(sink.is_empty());

        let closed = ControlEvent::Session(SessionEvent::Closed { duration: Duration::from_millis(3) });
        sink.call(sent("createRole")).await.unwrap();
        sink.call(sent("deleteRole")).await.unwrap();
        sink.call(closed.clone()).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        assert_eq!(sink.events(), vec![sent("deleteRole"), closed]);
        assert_eq!(sink.for_command("deleteRole").len(), 1);
        assert!(sink.for_command("createRole").is_empty());

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_multicast_reaches_both() {
        let a = MemorySink::new();
        let b = MemorySink::new();
        let mut sink = MulticastSink::new(a.clone(), b.clone());
        sink.call(sent("getClient")).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn test_emit_best_effort_swallows_errors() {
        #[derive(Clone)]
        struct Fails;
        impl TelemetrySink for Fails {
            type SinkError = std::io::Error;
        }
        impl tower::Service<ControlEvent> for Fails {
            type Response = ();
            type Error = std::io::Error;
            type Future = SinkFuture<std::io::Error>;
            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }
            fn call(&mut self, _req: ControlEvent) -> Self::Future {
                Box::pin(async { Err(std::io::Error::new(std::io::ErrorKind::Other, "fail")) })
            }
        }

        emit_best_effort(
            Fails,
            ControlEvent::Command(CommandEvent::Failed {
                command: "deleteClient",
                kind: FailureKind::BrokerReported,
                duration: Duration::from_millis(1),
            }),
        )
        .await;
    }

    #[tokio::test]
    async fn test_log_sink() {
        let mut sink = LogSink;
        sink.call(sent("listClients")).await.unwrap();
    }
}
