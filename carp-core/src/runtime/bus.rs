// carp-core/src/runtime/bus.rs
// ============================================================================
// Module: CARP Runtime In-Memory Telemetry Bus
// Description: Default in-process implementation of the Telemetry Bus
//              subscriber fan-out contract.
// Purpose: Back local runs, tests, and demos; richer sinks/sources (log,
//          file, HTTP) live in the telemetry crate built on this contract.
// Dependencies: crate::{core, interfaces}, tokio
// ============================================================================

//! ## Overview
//! This module provides the minimal [`EventBus`] implementation every other
//! component can depend on directly: publishing hands each subscriber's
//! channel a non-blocking `try_send`, dropping the event for any subscriber
//! whose buffer is saturated rather than blocking the emitter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::Sender;

use crate::core::TraceEvent;
use crate::interfaces::BusError;
use crate::interfaces::EventBus;

// ============================================================================
// SECTION: In-Memory Bus
// ============================================================================

/// In-memory, in-process [`EventBus`]. Subscriber channels are bounded;
/// publishing never blocks, and a full channel simply drops the event for
/// that one subscriber.
pub struct InMemoryEventBus {
    capacity: usize,
    subscribers: Mutex<Vec<Sender<TraceEvent>>>,
}

impl InMemoryEventBus {
    /// Creates a bus whose subscriber channels each hold up to `capacity`
    /// buffered events before new events are dropped for that subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, event: TraceEvent) -> Result<(), BusError> {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(_) => return Err(BusError::NoCapacity),
        };
        if subscribers.is_empty() {
            return Ok(());
        }
        subscribers.retain(|sender| !sender.is_closed());
        if subscribers.is_empty() {
            return Ok(());
        }
        for sender in subscribers.iter() {
            // Drop-on-saturation: a full subscriber channel never blocks the emitter.
            let _ = sender.try_send(event.clone());
        }
        Ok(())
    }

    fn subscribe(&self) -> Receiver<TraceEvent> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(sender);
        }
        receiver
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use expect on deterministic fixtures"
)]
mod tests {
    use super::*;
    use crate::core::Actor;
    use crate::core::SessionId;
    use crate::core::Severity;
    use crate::core::SpanId;
    use crate::core::TraceContext;
    use crate::core::TraceId;
    use crate::core::Timestamp;
    use crate::core::event_type;

    fn event() -> TraceEvent {
        TraceEvent {
            trace_version: crate::core::TRACE_VERSION.to_string(),
            event_type: event_type("session.started"),
            time: Timestamp::now(),
            trace: TraceContext {
                trace_id: TraceId::new("t1"),
                span_id: SpanId::new("sp1"),
                parent_span_id: None,
            },
            session_id: SessionId::new("s1"),
            atlas: None,
            actor: Actor::runtime(),
            severity: Severity::Info,
            payload: serde_json::Value::Null,
            artifacts: vec![],
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_succeeds() {
        let bus = InMemoryEventBus::new(4);
        assert!(bus.publish(event()).is_ok());
    }

    #[tokio::test]
    async fn subscriber_receives_published_events() {
        let bus = InMemoryEventBus::new(4);
        let mut receiver = bus.subscribe();
        bus.publish(event()).expect("publish");
        let received = receiver.recv().await.expect("receive");
        assert_eq!(received.event_type, "trace.session.started");
    }

    #[tokio::test]
    async fn saturated_subscriber_drops_rather_than_blocks() {
        let bus = InMemoryEventBus::new(1);
        let mut receiver = bus.subscribe();
        bus.publish(event()).expect("first publish");
        bus.publish(event()).expect("second publish does not block");
        let _ = receiver.recv().await.expect("receive first");
        assert!(receiver.try_recv().is_err());
    }
}
