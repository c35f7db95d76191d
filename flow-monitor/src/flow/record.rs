use serde::{Deserialize, Serialize};
use std::cmp;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketStats {
    pub packets: u64,
    pub bytes: u64,
}

impl PacketStats {
    /// The stats after accounting for one more packet, or `None` if a counter would overflow
    pub fn track_one(self, size_bytes: u64) -> Option<Self> {
        Some(Self {
            packets: self.packets.checked_add(1)?,
            bytes: self.bytes.checked_add(size_bytes)?,
        })
    }
}

/// An event would push one of the flow's counters past its maximum value
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("event would overflow the flow's {counter} counter")]
pub struct CounterOverflow {
    pub counter: &'static str,
}

/// Raw per-flow counters and timing extremes, accumulated while the simulation runs
///
/// Every update is all-or-nothing: if any counter would overflow, none of them changes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlowRecord {
    tx: PacketStats,
    rx: PacketStats,
    reported_lost: Option<u64>,
    delay_sum: Duration,
    jitter_sum: Duration,
    last_delay: Option<Duration>,
    time_first_tx: Option<Duration>,
    time_last_tx: Option<Duration>,
    time_first_rx: Option<Duration>,
    time_last_rx: Option<Duration>,
}

impl FlowRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts for a packet leaving its source
    ///
    /// Send events may arrive out of chronological order, so the first/last transmit times are
    /// tracked as extremes rather than as the first/last call.
    pub fn record_send(&mut self, size_bytes: u64, time: Duration) -> Result<(), CounterOverflow> {
        self.tx = self.tx.track_one(size_bytes).ok_or(CounterOverflow { counter: "tx" })?;
        self.time_first_tx = Some(min_time(self.time_first_tx, time));
        self.time_last_tx = Some(max_time(self.time_last_tx, time));
        Ok(())
    }

    /// Accounts for a packet arriving at its destination after `delay`
    ///
    /// The delay is derived from the packet's timestamps by the caller, which is also responsible
    /// for rejecting packets received before they were sent.
    pub fn record_receive(
        &mut self,
        size_bytes: u64,
        delay: Duration,
        received_at: Duration,
    ) -> Result<(), CounterOverflow> {
        let rx = self.rx.track_one(size_bytes).ok_or(CounterOverflow { counter: "rx" })?;
        let delay_sum = self
            .delay_sum
            .checked_add(delay)
            .ok_or(CounterOverflow { counter: "delay" })?;

        // The first packet of a flow has no predecessor and contributes no jitter
        let jitter_sum = match self.last_delay {
            Some(previous) => self
                .jitter_sum
                .checked_add(delay.abs_diff(previous))
                .ok_or(CounterOverflow { counter: "jitter" })?,
            None => self.jitter_sum,
        };

        self.rx = rx;
        self.delay_sum = delay_sum;
        self.jitter_sum = jitter_sum;
        self.last_delay = Some(delay);
        self.time_first_rx = Some(min_time(self.time_first_rx, received_at));
        self.time_last_rx = Some(max_time(self.time_last_rx, received_at));

        Ok(())
    }

    /// Accounts for a loss reported directly by the simulation
    pub fn record_lost(&mut self) -> Result<(), CounterOverflow> {
        let lost = self
            .reported_lost
            .unwrap_or(0)
            .checked_add(1)
            .ok_or(CounterOverflow { counter: "reported loss" })?;
        self.reported_lost = Some(lost);
        Ok(())
    }

    pub fn tx_packets(&self) -> u64 {
        self.tx.packets
    }

    pub fn rx_packets(&self) -> u64 {
        self.rx.packets
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx.bytes
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx.bytes
    }

    /// Packets that were sent but never received, or `None` if more packets were received than
    /// sent (which points to an accounting bug upstream)
    pub fn lost_packets(&self) -> Option<u64> {
        self.tx.packets.checked_sub(self.rx.packets)
    }

    /// The loss count reported independently by the simulation, if it reported any
    pub fn reported_lost(&self) -> Option<u64> {
        self.reported_lost
    }

    pub fn delay_sum(&self) -> Duration {
        self.delay_sum
    }

    pub fn jitter_sum(&self) -> Duration {
        self.jitter_sum
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    pub fn time_first_tx(&self) -> Option<Duration> {
        self.time_first_tx
    }

    pub fn time_last_tx(&self) -> Option<Duration> {
        self.time_last_tx
    }

    pub fn time_first_rx(&self) -> Option<Duration> {
        self.time_first_rx
    }

    pub fn time_last_rx(&self) -> Option<Duration> {
        self.time_last_rx
    }
}

fn min_time(current: Option<Duration>, candidate: Duration) -> Duration {
    current.map_or(candidate, |c| cmp::min(c, candidate))
}

fn max_time(current: Option<Duration>, candidate: Duration) -> Duration {
    current.map_or(candidate, |c| cmp::max(c, candidate))
}
