use crate::flow::key::FlowKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A data-quality problem found while ingesting a single event
///
/// These never abort ingestion of other events: the offending event is left out of the counters
/// and the problem is remembered for the flow it referenced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error(
        "flow {flow} received a packet at {received_at:?}, but no packet was ever sent on that flow"
    )]
    OrphanReceive { flow: FlowKey, received_at: Duration },
    #[error("flow {flow} received a packet at {received_at:?} that was only sent at {sent_at:?}")]
    InvalidTimestamp {
        flow: FlowKey,
        sent_at: Duration,
        received_at: Duration,
    },
    #[error("flow {flow} reported a lost packet at {time:?}, but no packet was ever sent on that flow")]
    OrphanLoss { flow: FlowKey, time: Duration },
    #[error("flow {flow} rejected an event that would overflow its {counter} counter")]
    CounterOverflow {
        flow: FlowKey,
        counter: &'static str,
    },
}

impl IngestError {
    pub fn flow(&self) -> &FlowKey {
        match self {
            IngestError::OrphanReceive { flow, .. }
            | IngestError::InvalidTimestamp { flow, .. }
            | IngestError::OrphanLoss { flow, .. }
            | IngestError::CounterOverflow { flow, .. } => flow,
        }
    }
}

/// Signals that a derived metric is undefined for the current counters
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("metric is undefined for the current counters")]
pub(crate) struct UndefinedMetric;

/// A problem attached to a flow's metrics row
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum FlowIssue {
    #[error("{count} packet(s) were received before they were sent and were ignored")]
    InvalidTimestamps { count: u64 },
    #[error("{rx_packets} packets were received, but only {tx_packets} were sent")]
    MoreReceivedThanSent { tx_packets: u64, rx_packets: u64 },
    #[error(
        "the simulation reported {reported} lost packet(s), but {derived} were sent and never received"
    )]
    LossMismatch { reported: u64, derived: u64 },
    #[error("{count} event(s) would have overflowed the flow's counters and were ignored")]
    CounterOverflow { count: u64 },
}

impl FlowIssue {
    /// Short machine-readable form, used in tabular reports
    pub fn code(&self) -> String {
        match self {
            FlowIssue::InvalidTimestamps { count } => format!("invalid-timestamps={count}"),
            FlowIssue::MoreReceivedThanSent {
                tx_packets,
                rx_packets,
            } => format!("more-received-than-sent={rx_packets}/{tx_packets}"),
            FlowIssue::LossMismatch { reported, derived } => {
                format!("loss-mismatch={reported}/{derived}")
            }
            FlowIssue::CounterOverflow { count } => format!("counter-overflow={count}"),
        }
    }
}
