//! Per-flow packet accounting for network simulations
//!
//! The simulation reports every packet it sends, delivers or drops to an [`EventIngestor`],
//! which keeps one [`FlowRecord`] per 5-tuple. Once the run is over, the [`MetricsComputer`]
//! derives delivery ratio, delay, jitter and throughput from the raw counters, and a
//! [`report::Reporter`] renders them.

pub mod error;
pub mod event;
pub mod flow;
pub mod ingest;
pub mod metrics;
pub mod report;
pub mod util;

pub use error::{FlowIssue, IngestError};
pub use event::{FlowEvent, FlowEventSink};
pub use flow::key::{FlowId, FlowKey, Protocol};
pub use flow::record::FlowRecord;
pub use flow::{FlowEntry, FlowTable, OrphanFlow};
pub use ingest::EventIngestor;
pub use metrics::{FlowFilter, FlowMetrics, MetricsComputer, MetricsRow};

#[cfg(test)]
mod test {
    use super::*;
    use crate::report::csv::{CsvReporter, read_csv};
    use crate::report::json::JsonReporter;
    use crate::report::{ReportFormat, Reporter};
    use bon::builder;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    const CLIENT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1));
    const SERVER_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 1, 1, 2));

    #[builder]
    fn flow(
        source_port: u16,
        source: Option<IpAddr>,
        destination: Option<IpAddr>,
        protocol: Option<Protocol>,
    ) -> FlowKey {
        FlowKey::new(
            source.unwrap_or(CLIENT_ADDR),
            source_port,
            destination.unwrap_or(SERVER_ADDR),
            9,
            protocol.unwrap_or(Protocol::UDP),
        )
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    fn sent(flow: &FlowKey, size_bytes: u64, time: f64) -> FlowEvent {
        FlowEvent::Sent {
            flow: flow.clone(),
            size_bytes,
            time: secs(time),
        }
    }

    fn received(flow: &FlowKey, size_bytes: u64, sent_at: f64, received_at: f64) -> FlowEvent {
        FlowEvent::Received {
            flow: flow.clone(),
            size_bytes,
            sent_at: secs(sent_at),
            received_at: secs(received_at),
        }
    }

    /// Feeds every event to a fresh ingestor, collecting the rejected ones
    fn run(events: &[FlowEvent]) -> (FlowTable, Vec<IngestError>) {
        let mut ingestor = EventIngestor::new();
        let errors = events
            .iter()
            .filter_map(|event| ingestor.deliver(event).err())
            .collect();

        (ingestor.finish(), errors)
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("metric should be defined");
        assert!(
            (actual - expected).abs() <= expected.abs() * 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_single_delivered_packet() {
        let f1 = flow().source_port(1).call();
        let (flows, errors) = run(&[sent(&f1, 1024, 0.0), received(&f1, 1024, 0.0, 0.02)]);
        assert!(errors.is_empty());

        let metrics = MetricsComputer::new().compute(&flows);
        let row = &metrics.flows[0];
        assert_eq!(row.packet_delivery_ratio, Some(1.0));
        assert_close(row.average_delay_s, 0.02);
        assert_eq!(row.average_jitter_s, None);
        assert_close(row.throughput_bps, 409_600.0);
    }

    #[test]
    fn test_packet_never_received() {
        let f2 = flow().source_port(2).call();
        let (flows, _) = run(&[sent(&f2, 512, 0.0)]);

        let row = &MetricsComputer::new().compute(&flows).flows[0];
        assert_eq!(row.tx_packets, 1);
        assert_eq!(row.rx_packets, 0);
        assert_eq!(row.lost_packets, Some(1));
        assert_eq!(row.packet_delivery_ratio, Some(0.0));
        assert_eq!(row.average_delay_s, None);
        assert_eq!(row.throughput_bps, None);
    }

    #[test]
    fn test_jitter_over_two_packets() {
        let f3 = flow().source_port(3).call();
        let (flows, _) = run(&[
            sent(&f3, 100, 0.0),
            received(&f3, 100, 0.0, 1.0),
            sent(&f3, 100, 1.0),
            received(&f3, 100, 1.0, 1.5),
        ]);

        let entry = flows.get(&f3).unwrap();
        assert_eq!(entry.record.delay_sum(), secs(1.5));
        assert_eq!(entry.record.rx_packets(), 2);

        let row = &MetricsComputer::new().compute(&flows).flows[0];
        assert_eq!(row.average_delay_s, Some(0.75));
        assert_eq!(row.average_jitter_s, Some(0.5));
    }

    #[test]
    fn test_malformed_receive_does_not_poison_other_flows() {
        let f1 = flow().source_port(1).call();
        let f4 = flow().source_port(4).call();
        let (flows, errors) = run(&[
            sent(&f1, 1024, 0.0),
            sent(&f4, 10, 0.0),
            received(&f4, 10, 5.0, 3.0),
            received(&f1, 1024, 0.0, 0.02),
        ]);

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], IngestError::InvalidTimestamp { .. }));

        let f4_record = &flows.get(&f4).unwrap().record;
        assert_eq!(f4_record.delay_sum(), Duration::ZERO);
        assert_eq!(f4_record.jitter_sum(), Duration::ZERO);

        let metrics = MetricsComputer::new().compute(&flows);
        assert_eq!(metrics.flows[0].packet_delivery_ratio, Some(1.0));
        assert_eq!(
            metrics.flows[1].issues,
            vec![FlowIssue::InvalidTimestamps { count: 1 }]
        );
    }

    #[test]
    fn test_flow_without_sends_has_no_delivery_ratio() {
        let mut flows = FlowTable::new();
        flows.get_or_insert(&flow().source_port(5).call());

        let row = &MetricsComputer::new().compute(&flows).flows[0];
        assert_eq!(row.tx_packets, 0);
        assert_eq!(row.packet_delivery_ratio, None);
        assert_eq!(row.packet_loss_ratio, None);
        assert_eq!(row.lost_packets, Some(0));
    }

    #[test]
    fn test_receive_count_never_exceeds_send_count_through_orphans() {
        let f1 = flow().source_port(1).call();
        let stranger = flow()
            .source_port(1)
            .source(SERVER_ADDR)
            .destination(CLIENT_ADDR)
            .call();
        let (flows, errors) = run(&[
            received(&stranger, 10, 0.0, 0.1),
            sent(&f1, 10, 0.2),
            received(&f1, 10, 0.2, 0.3),
            received(&stranger, 10, 0.2, 0.4),
        ]);

        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .all(|e| matches!(e, IngestError::OrphanReceive { .. }))
        );
        for entry in flows.iter() {
            assert!(entry.record.rx_packets() <= entry.record.tx_packets());
        }
        assert_eq!(flows.orphans()[0].receives, 2);
    }

    #[test]
    fn test_partial_run_can_be_reported() {
        let f1 = flow().source_port(1).call();
        let tcp = flow().source_port(2).protocol(Protocol::TCP).call();
        let mut ingestor = EventIngestor::new();
        ingestor.deliver(&sent(&f1, 100, 0.0)).unwrap();
        ingestor.deliver(&sent(&tcp, 100, 0.0)).unwrap();
        ingestor.deliver(&received(&f1, 100, 0.0, 0.5)).unwrap();

        // The simulation stops here, with the TCP packet still in flight
        let metrics = MetricsComputer::new().compute(ingestor.flows());
        assert_eq!(metrics.flows.len(), 2);
        assert_eq!(metrics.flows[1].lost_packets, Some(1));
        assert_eq!(metrics.summary.total.lost_packets, Some(1));

        for format in [ReportFormat::Console, ReportFormat::Csv, ReportFormat::Json] {
            let mut out = Vec::new();
            format.reporter().write_report(&metrics, &mut out).unwrap();
            let rendered = String::from_utf8(out).unwrap();
            assert!(rendered.contains("N/A"), "{format:?} report lacks sentinel");
        }
    }

    #[test]
    fn test_identical_streams_produce_identical_reports() {
        let f1 = flow().source_port(1).call();
        let f2 = flow().source_port(2).call();
        let events = [
            sent(&f2, 300, 0.0),
            sent(&f1, 100, 0.1),
            received(&f2, 300, 0.0, 0.15),
            received(&f1, 100, 0.1, 0.35),
            sent(&f1, 100, 0.4),
        ];

        let render = |reporter: &dyn Reporter| {
            let (flows, _) = run(&events);
            let metrics = MetricsComputer::new().compute(&flows);
            let mut out = Vec::new();
            reporter.write_report(&metrics, &mut out).unwrap();
            out
        };

        assert_eq!(render(&CsvReporter), render(&CsvReporter));
        assert_eq!(
            render(&JsonReporter::compact()),
            render(&JsonReporter::compact())
        );

        let rows = read_csv(render(&CsvReporter).as_slice()).unwrap();
        let ports: Vec<_> = rows.iter().map(|r| r.flow.source_port).collect();
        assert_eq!(ports, vec![2, 1]);
    }
}
