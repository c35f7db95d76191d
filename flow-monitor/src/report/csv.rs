use crate::flow::key::{FlowId, FlowKey, Protocol};
use crate::metrics::{FlowMetrics, MetricsRow};
use crate::report::{COLUMNS, Reporter, row_values};
use crate::util::NO_DATA;
use std::io;
use std::io::{BufRead, Write};
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// One line per flow, preceded by a header naming the columns
///
/// Only tracked flows are listed, so every line has the same columns. Events for flows that never
/// sent anything end up in [`FlowMetrics::orphans`], which the console and JSON reports include.
pub struct CsvReporter;

impl Reporter for CsvReporter {
    fn write_report(&self, metrics: &FlowMetrics, out: &mut dyn Write) -> io::Result<()> {
        let header: Vec<_> = COLUMNS.iter().map(|c| c.name).collect();
        writeln!(out, "{}", header.join(","))?;

        for row in &metrics.flows {
            let fields: Vec<_> = row_values(row).iter().map(|v| escape_field(v)).collect();
            writeln!(out, "{}", fields.join(","))?;
        }

        Ok(())
    }
}

fn escape_field(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to read report")]
    Io(#[from] io::Error),
    #[error("report header does not match the expected columns")]
    InvalidHeader,
    #[error("line {line} has {found} fields, but {expected} were expected")]
    WrongFieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line} has an unterminated quoted field")]
    UnterminatedQuote { line: usize },
    #[error("line {line}, column `{column}`: invalid value `{value}`")]
    InvalidField {
        line: usize,
        column: &'static str,
        value: String,
    },
}

/// A flow row parsed back from a CSV report
///
/// Issues are kept in their short code form.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub flow_id: FlowId,
    pub flow: FlowKey,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub lost_packets: Option<u64>,
    pub packet_delivery_ratio: Option<f64>,
    pub packet_loss_ratio: Option<f64>,
    pub average_delay_s: Option<f64>,
    pub average_jitter_s: Option<f64>,
    pub throughput_bps: Option<f64>,
    pub issues: Vec<String>,
}

impl CsvRow {
    /// Whether this row carries exactly the values of `row`
    pub fn matches(&self, row: &MetricsRow) -> bool {
        let issues: Vec<_> = row.issues.iter().map(|i| i.code()).collect();
        self.flow_id == row.flow_id
            && self.flow == row.flow
            && self.tx_packets == row.tx_packets
            && self.rx_packets == row.rx_packets
            && self.tx_bytes == row.tx_bytes
            && self.rx_bytes == row.rx_bytes
            && self.lost_packets == row.lost_packets
            && self.packet_delivery_ratio == row.packet_delivery_ratio
            && self.packet_loss_ratio == row.packet_loss_ratio
            && self.average_delay_s == row.average_delay_s
            && self.average_jitter_s == row.average_jitter_s
            && self.throughput_bps == row.throughput_bps
            && self.issues == issues
    }
}

/// Parses a report produced by [`CsvReporter`]
pub fn read_csv(reader: impl BufRead) -> Result<Vec<CsvRow>, ReportError> {
    let mut lines = reader.lines().enumerate();

    let expected_header: Vec<_> = COLUMNS.iter().map(|c| c.name).collect();
    let header = match lines.next() {
        Some((_, header)) => header?,
        None => return Err(ReportError::InvalidHeader),
    };
    if split_fields(&header, 1)? != expected_header {
        return Err(ReportError::InvalidHeader);
    }

    let mut rows = Vec::new();
    for (i, line) in lines {
        let line_number = i + 1;
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let fields = split_fields(&line, line_number)?;
        if fields.len() != COLUMNS.len() {
            return Err(ReportError::WrongFieldCount {
                line: line_number,
                expected: COLUMNS.len(),
                found: fields.len(),
            });
        }

        let mut fields = FieldCursor {
            fields: fields.into_iter(),
            column: 0,
            line: line_number,
        };
        rows.push(CsvRow {
            flow_id: FlowId(fields.parse()?),
            flow: {
                let source: IpAddr = fields.parse()?;
                let source_port = fields.parse()?;
                let destination: IpAddr = fields.parse()?;
                let destination_port = fields.parse()?;
                let protocol: Protocol = fields.parse()?;
                FlowKey::new(source, source_port, destination, destination_port, protocol)
            },
            tx_packets: fields.parse()?,
            rx_packets: fields.parse()?,
            tx_bytes: fields.parse()?,
            rx_bytes: fields.parse()?,
            lost_packets: fields.parse_metric()?,
            packet_delivery_ratio: fields.parse_metric()?,
            packet_loss_ratio: fields.parse_metric()?,
            average_delay_s: fields.parse_metric()?,
            average_jitter_s: fields.parse_metric()?,
            throughput_bps: fields.parse_metric()?,
            issues: fields
                .next_raw()
                .split(';')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        });
    }

    Ok(rows)
}

struct FieldCursor {
    fields: std::vec::IntoIter<String>,
    column: usize,
    line: usize,
}

impl FieldCursor {
    fn next_raw(&mut self) -> String {
        self.column += 1;
        self.fields.next().unwrap_or_default()
    }

    fn invalid(&self, value: String) -> ReportError {
        ReportError::InvalidField {
            line: self.line,
            column: COLUMNS[self.column - 1].name,
            value,
        }
    }

    fn parse<T: FromStr>(&mut self) -> Result<T, ReportError> {
        let raw = self.next_raw();
        raw.parse().map_err(|_| self.invalid(raw))
    }

    fn parse_metric<T: FromStr>(&mut self) -> Result<Option<T>, ReportError> {
        let raw = self.next_raw();
        if raw == NO_DATA {
            return Ok(None);
        }

        match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(self.invalid(raw)),
        }
    }
}

fn split_fields(line: &str, line_number: usize) -> Result<Vec<String>, ReportError> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }

    if in_quotes {
        return Err(ReportError::UnterminatedQuote { line: line_number });
    }

    fields.push(current);
    Ok(fields)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::FlowEventSink;
    use crate::ingest::EventIngestor;
    use crate::metrics::MetricsComputer;
    use std::time::Duration;

    fn key(source: &str, destination: &str, protocol: Protocol) -> FlowKey {
        FlowKey::new(
            source.parse().unwrap(),
            49153,
            destination.parse().unwrap(),
            9,
            protocol,
        )
    }

    fn sample_metrics() -> FlowMetrics {
        let ms = Duration::from_millis;
        let delivered = key("10.1.1.1", "10.1.1.2", Protocol::UDP);
        let silent = key("10.1.1.2", "10.1.1.1", Protocol::UDP);
        let v6 = key("2001:db8::1", "2001:db8::2", Protocol::TCP);

        let mut ingestor = EventIngestor::new();
        ingestor.on_sent(&delivered, 1024, ms(0)).unwrap();
        ingestor.on_received(&delivered, 1024, ms(0), ms(20)).unwrap();
        ingestor.on_sent(&delivered, 1024, ms(10)).unwrap();
        ingestor.on_received(&delivered, 1024, ms(10), ms(37)).unwrap();
        ingestor.on_sent(&silent, 512, ms(0)).unwrap();
        ingestor.on_sent(&v6, 100, ms(3)).unwrap();
        ingestor.on_received(&v6, 100, ms(3), ms(4)).unwrap();
        ingestor.on_received(&v6, 100, ms(3), ms(5)).unwrap();
        assert!(ingestor.on_received(&v6, 100, ms(9), ms(6)).is_err());

        MetricsComputer::new().compute(ingestor.flows())
    }

    fn render(metrics: &FlowMetrics) -> String {
        let mut out = Vec::new();
        CsvReporter.write_report(metrics, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_round_trip_preserves_values_and_sentinels() {
        let metrics = sample_metrics();
        let rendered = render(&metrics);
        let parsed = read_csv(rendered.as_bytes()).unwrap();

        assert_eq!(parsed.len(), metrics.flows.len());
        for (parsed, original) in parsed.iter().zip(&metrics.flows) {
            assert!(parsed.matches(original), "{parsed:?} != {original:?}");
        }

        // The flow that never received anything keeps its "no data" values
        assert_eq!(parsed[1].packet_delivery_ratio, Some(0.0));
        assert_eq!(parsed[1].average_delay_s, None);
        assert_eq!(parsed[1].throughput_bps, None);
        assert_eq!(
            parsed[2].issues,
            vec!["invalid-timestamps=1", "more-received-than-sent=2/1"]
        );
    }

    #[test]
    fn test_rendering_is_stable() {
        assert_eq!(render(&sample_metrics()), render(&sample_metrics()));

        let rendered = render(&sample_metrics());
        let mut lines = rendered.lines();
        assert_eq!(
            lines.next().unwrap(),
            "flow_id,source_address,source_port,destination_address,destination_port,protocol,tx_packets,rx_packets,tx_bytes,rx_bytes,lost_packets,packet_delivery_ratio,packet_loss_ratio,average_delay_s,average_jitter_s,throughput_bps,issues"
        );
        assert_eq!(
            lines.nth(1).unwrap(),
            "2,10.1.1.2,49153,10.1.1.1,9,UDP,1,0,512,0,1,0,1,N/A,N/A,N/A,"
        );
    }

    #[test]
    fn test_quoted_fields() {
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(
            split_fields("\"a,b\",\"say \"\"hi\"\"\",c", 1).unwrap(),
            vec!["a,b", "say \"hi\"", "c"]
        );
        assert!(matches!(
            split_fields("\"open,field", 3),
            Err(ReportError::UnterminatedQuote { line: 3 })
        ));
    }

    #[test]
    fn test_invalid_input_is_rejected() {
        assert!(matches!(
            read_csv("flow_id,oops\n".as_bytes()),
            Err(ReportError::InvalidHeader)
        ));

        let mut rendered = render(&sample_metrics());
        rendered.push_str("4,10.0.0.1\n");
        assert!(matches!(
            read_csv(rendered.as_bytes()),
            Err(ReportError::WrongFieldCount {
                line: 5,
                found: 2,
                ..
            })
        ));

        let bad_ratio = render(&sample_metrics()).replace(",1,0,1,N/A,", ",1,zero,1,N/A,");
        assert!(matches!(
            read_csv(bad_ratio.as_bytes()),
            Err(ReportError::InvalidField {
                column: "packet_delivery_ratio",
                ..
            })
        ));
    }

    #[test]
    fn test_orphans_are_left_out() {
        let metrics = sample_metrics();
        let orphan = metrics.flows[0].flow.reversed();
        let mut ingestor = EventIngestor::new();
        assert!(
            ingestor
                .on_received(&orphan, 64, Duration::ZERO, Duration::from_millis(1))
                .is_err()
        );
        let orphans_only = MetricsComputer::new().compute(ingestor.flows());
        assert_eq!(orphans_only.orphans.len(), 1);

        let rendered = render(&orphans_only);
        assert_eq!(rendered.lines().count(), 1);
        assert!(read_csv(rendered.as_bytes()).unwrap().is_empty());
    }
}
