use crate::metrics::FlowMetrics;
use crate::report::Reporter;
use std::io;
use std::io::Write;

/// Structured report containing the flows, the orphan flows and the summary
pub struct JsonReporter {
    pretty: bool,
}

impl JsonReporter {
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Reporter for JsonReporter {
    fn write_report(&self, metrics: &FlowMetrics, mut out: &mut dyn Write) -> io::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut out, metrics)?;
        } else {
            serde_json::to_writer(&mut out, metrics)?;
        }

        writeln!(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::FlowEventSink;
    use crate::flow::key::{FlowKey, Protocol};
    use crate::ingest::EventIngestor;
    use crate::metrics::MetricsComputer;
    use std::time::Duration;

    fn metrics() -> FlowMetrics {
        let key = FlowKey::new(
            "10.1.1.1".parse().unwrap(),
            49153,
            "10.1.1.2".parse().unwrap(),
            9,
            Protocol::UDP,
        );
        let orphan = key.reversed();

        let mut ingestor = EventIngestor::new();
        ingestor.on_sent(&key, 512, Duration::ZERO).unwrap();
        assert!(
            ingestor
                .on_received(&orphan, 64, Duration::ZERO, Duration::from_millis(2))
                .is_err()
        );
        MetricsComputer::new().compute(ingestor.flows())
    }

    #[test]
    fn test_json_uses_the_no_data_sentinel() {
        let mut out = Vec::new();
        JsonReporter::compact().write_report(&metrics(), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        let flow = &value["flows"][0];
        assert_eq!(flow["flow_id"], 1);
        assert_eq!(flow["source_address"], "10.1.1.1");
        assert_eq!(flow["protocol"], "UDP");
        assert_eq!(flow["lost_packets"], 1);
        assert_eq!(flow["packet_delivery_ratio"], 0.0);
        assert_eq!(flow["average_delay_s"], "N/A");
        assert_eq!(flow["throughput_bps"], "N/A");

        let orphan = &value["orphans"][0];
        assert_eq!(orphan["source_address"], "10.1.1.2");
        assert_eq!(orphan["receives"], 1);

        assert_eq!(value["summary"]["total"]["average_jitter_s"], "N/A");
        assert_eq!(value["summary"]["by_protocol"][0]["protocol"], "UDP");
    }

    #[test]
    fn test_json_report_parses_back() {
        let metrics = metrics();
        for reporter in [JsonReporter::compact(), JsonReporter::pretty()] {
            let mut out = Vec::new();
            reporter.write_report(&metrics, &mut out).unwrap();
            let parsed: FlowMetrics = serde_json::from_slice(&out).unwrap();
            assert_eq!(parsed, metrics);
        }
    }
}
