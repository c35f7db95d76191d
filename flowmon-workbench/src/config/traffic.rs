use crate::config::trace::FlowKeyJson;
use anyhow::{Context, bail};
use serde::Deserialize;

/// A point-to-point link carrying constant bit rate traffic
#[derive(Deserialize, Clone)]
pub struct TrafficJson {
    /// The point in time (since the start of the run) at which the simulation stops
    pub duration_ms: u64,
    /// Whether packets dropped by the link should additionally be reported as lost
    #[serde(default)]
    pub report_losses: bool,
    pub link: LinkJson,
    pub flows: Vec<TrafficFlowJson>,
}

#[derive(Deserialize, Clone)]
pub struct LinkJson {
    /// The one-way delay of the link, in milliseconds
    pub delay_ms: u64,
    /// The extra delay of the link, which will be applied at random according to
    /// `extra_delay_ratio`
    #[serde(default)]
    pub extra_delay_ms: u64,
    /// The ratio of packets that will have an extra delay applied, to simulate packet reordering
    /// (the value must be between 0 and 1)
    #[serde(default)]
    pub extra_delay_ratio: f64,
    /// The ratio of packets that will be lost (the value must be between 0 and 1)
    #[serde(default)]
    pub packet_loss_ratio: f64,
    /// The link's bandwidth, in bits per second
    pub bandwidth_bps: u64,
}

#[derive(Deserialize, Clone)]
pub struct TrafficFlowJson {
    #[serde(flatten)]
    pub key: FlowKeyJson,
    /// The size of every packet of the flow, in bytes
    pub packet_size: u64,
    /// The time between two consecutive packets, in milliseconds
    pub interval_ms: u64,
    pub start_ms: u64,
    pub stop_ms: u64,
}

impl TrafficJson {
    pub fn validate(&self) -> anyhow::Result<()> {
        let link = &self.link;
        check_ratio("extra_delay_ratio", link.extra_delay_ratio)?;
        check_ratio("packet_loss_ratio", link.packet_loss_ratio)?;
        if link.bandwidth_bps == 0 {
            bail!("the link's bandwidth must be greater than zero");
        }

        for (i, flow) in self.flows.iter().enumerate() {
            flow.validate()
                .with_context(|| format!("invalid traffic source #{i}"))?;
        }

        Ok(())
    }
}

impl TrafficFlowJson {
    fn validate(&self) -> anyhow::Result<()> {
        if self.interval_ms == 0 {
            bail!("interval_ms must be greater than zero");
        }
        if self.start_ms > self.stop_ms {
            bail!(
                "start_ms ({}) is after stop_ms ({})",
                self.start_ms,
                self.stop_ms
            );
        }

        Ok(())
    }
}

fn check_ratio(name: &str, ratio: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&ratio) {
        bail!("{name} must be between 0 and 1, but is {ratio}");
    }

    Ok(())
}
