use crate::error::IngestError;
use crate::flow::key::FlowKey;
use std::time::Duration;

/// A packet lifecycle event, as reported by the simulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// A packet left its source
    Sent {
        flow: FlowKey,
        size_bytes: u64,
        time: Duration,
    },
    /// A packet arrived at its destination
    Received {
        flow: FlowKey,
        size_bytes: u64,
        sent_at: Duration,
        received_at: Duration,
    },
    /// The simulation itself declared a packet lost
    Lost { flow: FlowKey, time: Duration },
}

impl FlowEvent {
    pub fn flow(&self) -> &FlowKey {
        match self {
            FlowEvent::Sent { flow, .. }
            | FlowEvent::Received { flow, .. }
            | FlowEvent::Lost { flow, .. } => flow,
        }
    }

    /// The simulated time at which the event happened
    pub fn time(&self) -> Duration {
        match self {
            FlowEvent::Sent { time, .. } | FlowEvent::Lost { time, .. } => *time,
            FlowEvent::Received { received_at, .. } => *received_at,
        }
    }
}

/// Consumer of the events produced by a running simulation
///
/// Events must be delivered one at a time, in non-decreasing simulated time.
pub trait FlowEventSink {
    fn on_sent(
        &mut self,
        flow: &FlowKey,
        size_bytes: u64,
        time: Duration,
    ) -> Result<(), IngestError>;

    fn on_received(
        &mut self,
        flow: &FlowKey,
        size_bytes: u64,
        sent_at: Duration,
        received_at: Duration,
    ) -> Result<(), IngestError>;

    fn on_lost(&mut self, flow: &FlowKey, time: Duration) -> Result<(), IngestError>;

    fn deliver(&mut self, event: &FlowEvent) -> Result<(), IngestError> {
        match event {
            FlowEvent::Sent {
                flow,
                size_bytes,
                time,
            } => self.on_sent(flow, *size_bytes, *time),
            FlowEvent::Received {
                flow,
                size_bytes,
                sent_at,
                received_at,
            } => self.on_received(flow, *size_bytes, *sent_at, *received_at),
            FlowEvent::Lost { flow, time } => self.on_lost(flow, *time),
        }
    }
}
