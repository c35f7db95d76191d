use crate::config::traffic::TrafficJson;
use anyhow::Context;
use fastrand::Rng;
use flow_monitor::{FlowEvent, FlowKey};
use std::time::Duration;

/// A single link shared by constant bit rate sources
pub struct TrafficSpec {
    pub duration: Duration,
    pub report_losses: bool,
    pub link: LinkSpec,
    pub sources: Vec<CbrSource>,
}

pub struct LinkSpec {
    pub delay: Duration,
    pub extra_delay: Duration,
    pub extra_delay_ratio: f64,
    pub packet_loss_ratio: f64,
    pub bandwidth_bps: u64,
}

/// Sends a packet of `packet_size` bytes every `interval`, from `start` (inclusive) to `stop`
/// (exclusive)
pub struct CbrSource {
    pub flow: FlowKey,
    pub packet_size: u64,
    pub interval: Duration,
    pub start: Duration,
    pub stop: Duration,
}

impl From<TrafficJson> for TrafficSpec {
    fn from(json: TrafficJson) -> Self {
        TrafficSpec {
            duration: Duration::from_millis(json.duration_ms),
            report_losses: json.report_losses,
            link: LinkSpec {
                delay: Duration::from_millis(json.link.delay_ms),
                extra_delay: Duration::from_millis(json.link.extra_delay_ms),
                extra_delay_ratio: json.link.extra_delay_ratio,
                packet_loss_ratio: json.link.packet_loss_ratio,
                bandwidth_bps: json.link.bandwidth_bps,
            },
            sources: json
                .flows
                .into_iter()
                .map(|f| CbrSource {
                    flow: f.key.into(),
                    packet_size: f.packet_size,
                    interval: Duration::from_millis(f.interval_ms),
                    start: Duration::from_millis(f.start_ms),
                    stop: Duration::from_millis(f.stop_ms),
                })
                .collect(),
        }
    }
}

impl LinkSpec {
    fn transmission_time(&self, size_bytes: u64) -> anyhow::Result<Duration> {
        let secs = size_bytes as f64 * 8.0 / self.bandwidth_bps as f64;
        Duration::try_from_secs_f64(secs).with_context(|| {
            format!(
                "a packet of {size_bytes} bytes takes too long to transmit at {} bps",
                self.bandwidth_bps
            )
        })
    }

    /// The time at which a packet sent at `sent_at` arrives, unless it is lost
    fn arrival_time(
        &self,
        sent_at: Duration,
        transmission_time: Duration,
        extra_delay: bool,
    ) -> anyhow::Result<Duration> {
        let mut arrival = sent_at
            .checked_add(self.delay)
            .and_then(|t| t.checked_add(transmission_time));
        if extra_delay {
            arrival = arrival.and_then(|t| t.checked_add(self.extra_delay));
        }

        arrival.with_context(|| {
            format!("the arrival time of a packet sent at {sent_at:?} cannot be represented")
        })
    }
}

/// Generates the events of a whole run, in non-decreasing time order
///
/// Packets that would arrive after the simulation stops are neither received nor reported lost,
/// just like packets still in flight when a real simulation ends.
pub fn generate_events(spec: &TrafficSpec, rng: &mut Rng) -> anyhow::Result<Vec<FlowEvent>> {
    let mut events = Vec::new();
    for source in &spec.sources {
        let transmission_time = spec
            .link
            .transmission_time(source.packet_size)
            .with_context(|| format!("invalid traffic source for flow {}", source.flow))?;

        let stop = source.stop.min(spec.duration);
        let mut sent_at = source.start;
        while sent_at < stop {
            events.push(FlowEvent::Sent {
                flow: source.flow.clone(),
                size_bytes: source.packet_size,
                time: sent_at,
            });

            if rng.f64() < spec.link.packet_loss_ratio {
                if spec.report_losses {
                    events.push(FlowEvent::Lost {
                        flow: source.flow.clone(),
                        time: sent_at,
                    });
                }
            } else {
                let extra_delay = rng.f64() < spec.link.extra_delay_ratio;
                let received_at = spec
                    .link
                    .arrival_time(sent_at, transmission_time, extra_delay)?;

                if received_at <= spec.duration {
                    events.push(FlowEvent::Received {
                        flow: source.flow.clone(),
                        size_bytes: source.packet_size,
                        sent_at,
                        received_at,
                    });
                }
            }

            let Some(next) = sent_at.checked_add(source.interval) else {
                break;
            };
            sent_at = next;
        }
    }

    // Stable, so a packet's send always precedes its arrival at the same instant
    events.sort_by_key(|e| e.time());
    Ok(events)
}

#[cfg(test)]
mod test {
    use super::*;
    use flow_monitor::Protocol;

    fn spec(packet_loss_ratio: f64, report_losses: bool) -> TrafficSpec {
        TrafficSpec {
            duration: Duration::from_secs(1),
            report_losses,
            link: LinkSpec {
                delay: Duration::from_millis(20),
                extra_delay: Duration::from_millis(50),
                extra_delay_ratio: 0.0,
                packet_loss_ratio,
                bandwidth_bps: 8_000_000,
            },
            sources: vec![CbrSource {
                flow: FlowKey::new(
                    "10.1.1.1".parse().unwrap(),
                    49153,
                    "10.1.1.2".parse().unwrap(),
                    9,
                    Protocol::UDP,
                ),
                packet_size: 1000,
                interval: Duration::from_millis(100),
                start: Duration::ZERO,
                stop: Duration::from_secs(2),
            }],
        }
    }

    #[test]
    fn test_lossless_link() {
        let events = generate_events(&spec(0.0, false), &mut Rng::with_seed(42)).unwrap();

        let sent = events
            .iter()
            .filter(|e| matches!(e, FlowEvent::Sent { .. }))
            .count();
        let received = events
            .iter()
            .filter(|e| matches!(e, FlowEvent::Received { .. }))
            .count();

        // Sending stops at the end of the run, not at the source's own stop time
        assert_eq!(sent, 10);
        assert_eq!(received, 10);
        assert!(events.windows(2).all(|w| w[0].time() <= w[1].time()));

        let FlowEvent::Received {
            sent_at,
            received_at,
            ..
        } = &events[1]
        else {
            panic!("expected the first packet to arrive before the second is sent");
        };
        assert_eq!(*received_at - *sent_at, Duration::from_millis(21));
    }

    #[test]
    fn test_lossy_link_reports_losses() {
        let events = generate_events(&spec(1.0, true), &mut Rng::with_seed(42)).unwrap();
        assert_eq!(events.len(), 20);
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, FlowEvent::Received { .. }))
        );

        let events = generate_events(&spec(1.0, false), &mut Rng::with_seed(42)).unwrap();
        assert_eq!(events.len(), 10);
    }

    #[test]
    fn test_same_seed_same_events() {
        let spec = spec(0.3, true);
        assert_eq!(
            generate_events(&spec, &mut Rng::with_seed(7)).unwrap(),
            generate_events(&spec, &mut Rng::with_seed(7)).unwrap()
        );
    }

    #[test]
    fn test_untransmittable_packet_is_an_error() {
        let mut spec = spec(0.0, false);
        spec.link.bandwidth_bps = 1;
        spec.sources[0].packet_size = u64::MAX / 2;

        let err = generate_events(&spec, &mut Rng::with_seed(42)).unwrap_err();
        assert!(err.to_string().starts_with("invalid traffic source for flow"));
    }

    #[test]
    fn test_unrepresentable_arrival_is_an_error() {
        let mut spec = spec(0.0, false);
        spec.duration = Duration::MAX;
        spec.link.delay = Duration::MAX;

        let err = generate_events(&spec, &mut Rng::with_seed(42)).unwrap_err();
        assert!(err.to_string().contains("cannot be represented"));
    }
}
