use anyhow::bail;
use flow_monitor::{FlowEvent, FlowKey, Protocol};
use serde::Deserialize;
use serde_with::{DisplayFromStr, DurationSecondsWithFrac, serde_as};
use std::net::IpAddr;
use std::time::Duration;

/// A recorded run: the flows seen by the simulation and the events that happened on them
#[derive(Deserialize, Clone)]
pub struct TraceJson {
    pub flows: Vec<FlowKeyJson>,
    pub events: Vec<EventJson>,
}

#[serde_as]
#[derive(Deserialize, Clone)]
pub struct FlowKeyJson {
    #[serde_as(as = "DisplayFromStr")]
    pub source: IpAddr,
    #[serde_as(as = "DisplayFromStr")]
    pub destination: IpAddr,
    #[serde_as(as = "DisplayFromStr")]
    pub protocol: Protocol,
    pub source_port: u16,
    pub destination_port: u16,
}

impl From<FlowKeyJson> for FlowKey {
    fn from(json: FlowKeyJson) -> Self {
        FlowKey::new(
            json.source,
            json.source_port,
            json.destination,
            json.destination_port,
            json.protocol,
        )
    }
}

/// A packet event, referencing its flow by index into [`TraceJson::flows`]
#[serde_as]
#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum EventJson {
    Sent {
        flow: usize,
        size_bytes: u64,
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        time_s: Duration,
    },
    Received {
        flow: usize,
        size_bytes: u64,
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        sent_time_s: Duration,
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        received_time_s: Duration,
    },
    Lost {
        flow: usize,
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        time_s: Duration,
    },
}

impl EventJson {
    fn flow(&self) -> usize {
        match self {
            EventJson::Sent { flow, .. }
            | EventJson::Received { flow, .. }
            | EventJson::Lost { flow, .. } => *flow,
        }
    }
}

impl TraceJson {
    /// Resolves flow indices, in the order the events appear in the trace
    pub fn into_events(self) -> anyhow::Result<Vec<FlowEvent>> {
        let flows: Vec<FlowKey> = self.flows.into_iter().map(|f| f.into()).collect();

        let mut events = Vec::with_capacity(self.events.len());
        for (i, event) in self.events.into_iter().enumerate() {
            let Some(flow) = flows.get(event.flow()).cloned() else {
                bail!(
                    "event #{i} references flow {}, but the trace only defines {} flows",
                    event.flow(),
                    flows.len()
                );
            };

            events.push(match event {
                EventJson::Sent {
                    size_bytes, time_s, ..
                } => FlowEvent::Sent {
                    flow,
                    size_bytes,
                    time: time_s,
                },
                EventJson::Received {
                    size_bytes,
                    sent_time_s,
                    received_time_s,
                    ..
                } => FlowEvent::Received {
                    flow,
                    size_bytes,
                    sent_at: sent_time_s,
                    received_at: received_time_s,
                },
                EventJson::Lost { time_s, .. } => FlowEvent::Lost { flow, time: time_s },
            });
        }

        Ok(events)
    }
}
