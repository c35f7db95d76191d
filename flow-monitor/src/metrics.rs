use crate::error::{FlowIssue, UndefinedMetric};
use crate::flow::key::{FlowId, FlowKey, Protocol};
use crate::flow::record::FlowRecord;
use crate::flow::{FlowEntry, FlowTable, OrphanFlow};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Derived, read-only metrics for a single flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub flow_id: FlowId,
    #[serde(flatten)]
    pub flow: FlowKey,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    #[serde(with = "crate::util::serde_no_data")]
    pub lost_packets: Option<u64>,
    #[serde(with = "crate::util::serde_no_data")]
    pub packet_delivery_ratio: Option<f64>,
    #[serde(with = "crate::util::serde_no_data")]
    pub packet_loss_ratio: Option<f64>,
    /// Mean end-to-end delay, in seconds of simulated time
    #[serde(with = "crate::util::serde_no_data")]
    pub average_delay_s: Option<f64>,
    /// Mean absolute difference between consecutive delays, in seconds
    #[serde(with = "crate::util::serde_no_data")]
    pub average_jitter_s: Option<f64>,
    /// Received bits per second of simulated time, between the first send and the last receive
    #[serde(with = "crate::util::serde_no_data")]
    pub throughput_bps: Option<f64>,
    pub issues: Vec<FlowIssue>,
}

/// Aggregated metrics over a set of flows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficSummary {
    pub flows: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    #[serde(with = "crate::util::serde_no_data")]
    pub lost_packets: Option<u64>,
    #[serde(with = "crate::util::serde_no_data")]
    pub packet_delivery_ratio: Option<f64>,
    #[serde(with = "crate::util::serde_no_data")]
    pub average_delay_s: Option<f64>,
    #[serde(with = "crate::util::serde_no_data")]
    pub average_jitter_s: Option<f64>,
    /// Sum of the throughput of every flow for which it is defined
    #[serde(with = "crate::util::serde_no_data")]
    pub throughput_bps: Option<f64>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSummary {
    #[serde_as(as = "DisplayFromStr")]
    pub protocol: Protocol,
    #[serde(flatten)]
    pub summary: TrafficSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub total: TrafficSummary,
    /// Ordered by protocol number
    pub by_protocol: Vec<ProtocolSummary>,
}

/// Everything derived from a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowMetrics {
    /// Ordered by flow id
    pub flows: Vec<MetricsRow>,
    pub orphans: Vec<OrphanFlow>,
    pub summary: NetworkSummary,
}

/// Selects the flows that should be reported on
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlowFilter {
    pub source: Option<IpAddr>,
    pub destination: Option<IpAddr>,
    pub protocol: Option<Protocol>,
}

impl FlowFilter {
    pub fn matches(&self, key: &FlowKey) -> bool {
        self.source.is_none_or(|ip| ip == key.source_address)
            && self
                .destination
                .is_none_or(|ip| ip == key.destination_address)
            && self.protocol.is_none_or(|p| p == key.protocol)
    }
}

/// Turns raw flow records into metrics, applying the same "no data" policy to every flow
#[derive(Debug, Default, Clone)]
pub struct MetricsComputer {
    filter: FlowFilter,
}

impl MetricsComputer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: FlowFilter) -> Self {
        Self { filter }
    }

    pub fn compute(&self, flows: &FlowTable) -> FlowMetrics {
        let selected: Vec<_> = flows
            .iter()
            .filter(|entry| self.filter.matches(&entry.key))
            .collect();

        let rows: Vec<_> = selected.iter().map(|entry| metrics_row(entry)).collect();

        let mut total = SummaryAccumulator::default();
        let mut by_protocol: BTreeMap<Protocol, SummaryAccumulator> = BTreeMap::new();
        for (entry, row) in selected.iter().zip(&rows) {
            total.add(&entry.record, row);
            by_protocol
                .entry(entry.key.protocol)
                .or_default()
                .add(&entry.record, row);
        }

        let orphans = flows
            .orphans()
            .iter()
            .filter(|orphan| self.filter.matches(&orphan.key))
            .cloned()
            .collect();

        FlowMetrics {
            flows: rows,
            orphans,
            summary: NetworkSummary {
                total: total.finish(),
                by_protocol: by_protocol
                    .into_iter()
                    .map(|(protocol, acc)| ProtocolSummary {
                        protocol,
                        summary: acc.finish(),
                    })
                    .collect(),
            },
        }
    }
}

pub fn metrics_row(entry: &FlowEntry) -> MetricsRow {
    let record = &entry.record;
    let lost_packets = record.lost_packets();

    MetricsRow {
        flow_id: entry.id,
        flow: entry.key.clone(),
        tx_packets: record.tx_packets(),
        rx_packets: record.rx_packets(),
        tx_bytes: record.tx_bytes(),
        rx_bytes: record.rx_bytes(),
        lost_packets,
        packet_delivery_ratio: packet_delivery_ratio(record).ok(),
        packet_loss_ratio: packet_loss_ratio(record).ok(),
        average_delay_s: average_delay(record).ok(),
        average_jitter_s: average_jitter(record).ok(),
        throughput_bps: throughput_bps(record).ok(),
        issues: issues(entry),
    }
}

fn issues(entry: &FlowEntry) -> Vec<FlowIssue> {
    let record = &entry.record;
    let mut issues = Vec::new();

    if entry.invalid_timestamps > 0 {
        issues.push(FlowIssue::InvalidTimestamps {
            count: entry.invalid_timestamps,
        });
    }

    if entry.overflowed_events > 0 {
        issues.push(FlowIssue::CounterOverflow {
            count: entry.overflowed_events,
        });
    }

    match (record.lost_packets(), record.reported_lost()) {
        (None, _) => issues.push(FlowIssue::MoreReceivedThanSent {
            tx_packets: record.tx_packets(),
            rx_packets: record.rx_packets(),
        }),
        (Some(derived), Some(reported)) if derived != reported => {
            issues.push(FlowIssue::LossMismatch { reported, derived })
        }
        _ => {}
    }

    issues
}

fn ratio(numerator: f64, denominator: f64) -> Result<f64, UndefinedMetric> {
    if denominator > 0.0 {
        Ok(numerator / denominator)
    } else {
        Err(UndefinedMetric)
    }
}

pub(crate) fn packet_delivery_ratio(record: &FlowRecord) -> Result<f64, UndefinedMetric> {
    ratio(record.rx_packets() as f64, record.tx_packets() as f64)
}

pub(crate) fn packet_loss_ratio(record: &FlowRecord) -> Result<f64, UndefinedMetric> {
    let lost = record.lost_packets().ok_or(UndefinedMetric)?;
    ratio(lost as f64, record.tx_packets() as f64)
}

pub(crate) fn average_delay(record: &FlowRecord) -> Result<f64, UndefinedMetric> {
    ratio(
        record.delay_sum().as_secs_f64(),
        record.rx_packets() as f64,
    )
}

pub(crate) fn average_jitter(record: &FlowRecord) -> Result<f64, UndefinedMetric> {
    ratio(
        record.jitter_sum().as_secs_f64(),
        record.rx_packets().saturating_sub(1) as f64,
    )
}

/// Time between the first send and the last receive, if positive
pub(crate) fn active_duration(record: &FlowRecord) -> Result<Duration, UndefinedMetric> {
    if record.rx_packets() == 0 {
        return Err(UndefinedMetric);
    }

    let first_tx = record.time_first_tx().ok_or(UndefinedMetric)?;
    let last_rx = record.time_last_rx().ok_or(UndefinedMetric)?;
    last_rx
        .checked_sub(first_tx)
        .filter(|d| !d.is_zero())
        .ok_or(UndefinedMetric)
}

pub(crate) fn throughput_bps(record: &FlowRecord) -> Result<f64, UndefinedMetric> {
    let duration = active_duration(record)?;
    ratio(record.rx_bytes() as f64 * 8.0, duration.as_secs_f64())
}

#[derive(Default)]
struct SummaryAccumulator {
    flows: u64,
    tx_packets: u64,
    rx_packets: u64,
    tx_bytes: u64,
    rx_bytes: u64,
    lost_packets: Option<u64>,
    any_undefined_loss: bool,
    delay_sum: Duration,
    jitter_sum: Duration,
    jitter_samples: u64,
    throughput_bps: Option<f64>,
}

impl SummaryAccumulator {
    fn add(&mut self, record: &FlowRecord, row: &MetricsRow) {
        self.flows += 1;
        self.tx_packets = self.tx_packets.saturating_add(record.tx_packets());
        self.rx_packets = self.rx_packets.saturating_add(record.rx_packets());
        self.tx_bytes = self.tx_bytes.saturating_add(record.tx_bytes());
        self.rx_bytes = self.rx_bytes.saturating_add(record.rx_bytes());

        match row.lost_packets {
            Some(lost) => {
                let total = self.lost_packets.get_or_insert(0);
                *total = total.saturating_add(lost);
            }
            None => self.any_undefined_loss = true,
        }

        self.delay_sum = self.delay_sum.saturating_add(record.delay_sum());
        self.jitter_sum = self.jitter_sum.saturating_add(record.jitter_sum());
        self.jitter_samples = self
            .jitter_samples
            .saturating_add(record.rx_packets().saturating_sub(1));

        if let Some(throughput) = row.throughput_bps {
            *self.throughput_bps.get_or_insert(0.0) += throughput;
        }
    }

    fn finish(self) -> TrafficSummary {
        TrafficSummary {
            flows: self.flows,
            tx_packets: self.tx_packets,
            rx_packets: self.rx_packets,
            tx_bytes: self.tx_bytes,
            rx_bytes: self.rx_bytes,
            lost_packets: if self.any_undefined_loss {
                None
            } else {
                self.lost_packets
            },
            packet_delivery_ratio: ratio(self.rx_packets as f64, self.tx_packets as f64).ok(),
            average_delay_s: ratio(self.delay_sum.as_secs_f64(), self.rx_packets as f64).ok(),
            average_jitter_s: ratio(self.jitter_sum.as_secs_f64(), self.jitter_samples as f64)
                .ok(),
            throughput_bps: self.throughput_bps,
        }
    }
}
