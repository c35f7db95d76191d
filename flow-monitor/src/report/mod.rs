pub mod console;
pub mod csv;
pub mod json;

use crate::metrics::{FlowMetrics, MetricsRow};
use crate::util::NO_DATA;
use std::fmt::Display;
use std::io;
use std::io::Write;

/// Renders computed metrics without altering them
pub trait Reporter {
    fn write_report(&self, metrics: &FlowMetrics, out: &mut dyn Write) -> io::Result<()>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Console,
    Csv,
    Json,
}

impl ReportFormat {
    pub fn reporter(self) -> Box<dyn Reporter> {
        match self {
            ReportFormat::Console => Box::new(console::ConsoleReporter),
            ReportFormat::Csv => Box::new(csv::CsvReporter),
            ReportFormat::Json => Box::new(json::JsonReporter::pretty()),
        }
    }
}

pub struct Column {
    pub name: &'static str,
    pub label: &'static str,
}

/// The columns of a flow row, in the order every rendering uses
pub const COLUMNS: [Column; 17] = [
    Column { name: "flow_id", label: "Flow" },
    Column { name: "source_address", label: "Source address" },
    Column { name: "source_port", label: "Source port" },
    Column { name: "destination_address", label: "Destination address" },
    Column { name: "destination_port", label: "Destination port" },
    Column { name: "protocol", label: "Protocol" },
    Column { name: "tx_packets", label: "Tx packets" },
    Column { name: "rx_packets", label: "Rx packets" },
    Column { name: "tx_bytes", label: "Tx bytes" },
    Column { name: "rx_bytes", label: "Rx bytes" },
    Column { name: "lost_packets", label: "Lost packets" },
    Column { name: "packet_delivery_ratio", label: "Packet delivery ratio" },
    Column { name: "packet_loss_ratio", label: "Packet loss ratio" },
    Column { name: "average_delay_s", label: "Average delay (s)" },
    Column { name: "average_jitter_s", label: "Average jitter (s)" },
    Column { name: "throughput_bps", label: "Throughput (bps)" },
    Column { name: "issues", label: "Issues" },
];

/// Index of the first column that is not part of the flow's identity
pub(crate) const FIRST_COUNTER_COLUMN: usize = 6;

/// Formats an optional metric, using the shortest representation that parses back to the same
/// value
pub fn format_metric<T: Display>(value: Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => NO_DATA.to_string(),
    }
}

/// The values of a row, in [`COLUMNS`] order
pub fn row_values(row: &MetricsRow) -> [String; 17] {
    [
        row.flow_id.to_string(),
        row.flow.source_address.to_string(),
        row.flow.source_port.to_string(),
        row.flow.destination_address.to_string(),
        row.flow.destination_port.to_string(),
        row.flow.protocol.to_string(),
        row.tx_packets.to_string(),
        row.rx_packets.to_string(),
        row.tx_bytes.to_string(),
        row.rx_bytes.to_string(),
        format_metric(row.lost_packets),
        format_metric(row.packet_delivery_ratio),
        format_metric(row.packet_loss_ratio),
        format_metric(row.average_delay_s),
        format_metric(row.average_jitter_s),
        format_metric(row.throughput_bps),
        row.issues
            .iter()
            .map(|issue| issue.code())
            .collect::<Vec<_>>()
            .join(";"),
    ]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_no_data_is_never_formatted_as_zero() {
        assert_eq!(format_metric::<f64>(None), "N/A");
        assert_eq!(format_metric(Some(0.0)), "0");
        assert_eq!(format_metric(Some(0u64)), "0");
        assert_eq!(format_metric(Some(409600.0)), "409600");
        assert_eq!(format_metric(Some(0.75)), "0.75");
    }

    #[test]
    fn test_column_names_are_unique() {
        let mut names: Vec<_> = COLUMNS.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), COLUMNS.len());
        assert_eq!(COLUMNS[FIRST_COUNTER_COLUMN].name, "tx_packets");
    }
}
