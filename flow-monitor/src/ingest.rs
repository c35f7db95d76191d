use crate::error::IngestError;
use crate::event::FlowEventSink;
use crate::flow::key::FlowKey;
use crate::flow::record::CounterOverflow;
use crate::flow::{FlowEntry, FlowTable};
use std::time::Duration;

/// Single entry point through which the simulation reports packet events
///
/// The ingestor owns the flow table for the whole run. Each event is applied to exactly one flow
/// and either fully or not at all.
#[derive(Debug, Default)]
pub struct EventIngestor {
    flows: FlowTable,
    ingested_events: u64,
}

impl EventIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// The flows collected so far (usable even if the simulation stopped early)
    pub fn flows(&self) -> &FlowTable {
        &self.flows
    }

    pub fn ingested_events(&self) -> u64 {
        self.ingested_events
    }

    /// Ends ingestion, handing out the now read-only flow table
    pub fn finish(self) -> FlowTable {
        self.flows
    }
}

impl FlowEventSink for EventIngestor {
    fn on_sent(
        &mut self,
        flow: &FlowKey,
        size_bytes: u64,
        time: Duration,
    ) -> Result<(), IngestError> {
        self.ingested_events += 1;
        let (entry, created) = self.flows.get_or_insert(flow);
        if created {
            tracing::debug!(flow_id = %entry.id, "new flow {flow}");
        }

        tracing::trace!(flow_id = %entry.id, size_bytes, ?time, "packet sent");
        let result = entry.record.record_send(size_bytes, time);
        reject_overflow(entry, result)
    }

    fn on_received(
        &mut self,
        flow: &FlowKey,
        size_bytes: u64,
        sent_at: Duration,
        received_at: Duration,
    ) -> Result<(), IngestError> {
        self.ingested_events += 1;

        // Malformed timestamps are reported as such, even for flows we never saw
        let Some(delay) = received_at.checked_sub(sent_at) else {
            let err = IngestError::InvalidTimestamp {
                flow: flow.clone(),
                sent_at,
                received_at,
            };

            let first_occurrence = match self.flows.get_mut(flow) {
                Some(entry) => {
                    entry.invalid_timestamps += 1;
                    entry.invalid_timestamps == 1
                }
                None => {
                    let orphan = self.flows.orphan_mut(flow);
                    orphan.invalid_timestamps = orphan.invalid_timestamps.saturating_add(1);
                    orphan.invalid_timestamps == 1
                }
            };
            warn_once(first_occurrence, &err);

            return Err(err);
        };

        let Some(entry) = self.flows.get_mut(flow) else {
            let orphan = self.flows.orphan_mut(flow);
            orphan.receives = orphan.receives.saturating_add(1);
            orphan.received_bytes = orphan.received_bytes.saturating_add(size_bytes);

            let err = IngestError::OrphanReceive {
                flow: flow.clone(),
                received_at,
            };
            warn_once(orphan.receives == 1, &err);
            return Err(err);
        };

        tracing::trace!(flow_id = %entry.id, size_bytes, ?delay, ?received_at, "packet received");
        let result = entry.record.record_receive(size_bytes, delay, received_at);
        reject_overflow(entry, result)
    }

    fn on_lost(&mut self, flow: &FlowKey, time: Duration) -> Result<(), IngestError> {
        self.ingested_events += 1;

        let Some(entry) = self.flows.get_mut(flow) else {
            let orphan = self.flows.orphan_mut(flow);
            orphan.losses = orphan.losses.saturating_add(1);

            let err = IngestError::OrphanLoss {
                flow: flow.clone(),
                time,
            };
            warn_once(orphan.losses == 1, &err);
            return Err(err);
        };

        tracing::trace!(flow_id = %entry.id, ?time, "packet reported lost");
        let result = entry.record.record_lost();
        reject_overflow(entry, result)
    }
}

/// Turns a counter overflow into an ingestion error, remembering it on the flow
fn reject_overflow(
    entry: &mut FlowEntry,
    result: Result<(), CounterOverflow>,
) -> Result<(), IngestError> {
    let Err(overflow) = result else {
        return Ok(());
    };

    entry.overflowed_events += 1;
    let err = IngestError::CounterOverflow {
        flow: entry.key.clone(),
        counter: overflow.counter,
    };
    warn_once(entry.overflowed_events == 1, &err);
    Err(err)
}

fn warn_once(first_occurrence: bool, err: &IngestError) {
    if first_occurrence {
        tracing::warn!(
            "{err} (further warnings of this kind for this flow will be omitted to avoid cluttering the output)"
        );
    }
}
