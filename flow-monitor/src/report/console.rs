use crate::metrics::{FlowMetrics, TrafficSummary};
use crate::report::{COLUMNS, FIRST_COUNTER_COLUMN, Reporter, format_metric, row_values};
use std::io;
use std::io::Write;

/// Human-readable report, one block per flow
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn write_report(&self, metrics: &FlowMetrics, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "--- Flows ---")?;
        if metrics.flows.is_empty() {
            writeln!(out, "* No flows")?;
        }

        for row in &metrics.flows {
            let values = row_values(row);
            writeln!(out, "* Flow {}: {}", row.flow_id, row.flow)?;
            for (column, value) in COLUMNS.iter().zip(&values).skip(FIRST_COUNTER_COLUMN) {
                if column.name == "issues" && value.is_empty() {
                    continue;
                }

                writeln!(out, "  * {}: {value}", column.label)?;
            }
        }

        writeln!(out, "--- Summary ---")?;
        write_summary(out, "All flows", &metrics.summary.total)?;
        for protocol in &metrics.summary.by_protocol {
            write_summary(
                out,
                &format!("{} flows", protocol.protocol),
                &protocol.summary,
            )?;
        }

        let flows_with_issues: Vec<_> = metrics
            .flows
            .iter()
            .filter(|row| !row.issues.is_empty())
            .collect();
        if flows_with_issues.is_empty() && metrics.orphans.is_empty() {
            return Ok(());
        }

        writeln!(out, "--- Data quality ---")?;
        for row in flows_with_issues {
            for issue in &row.issues {
                writeln!(out, "* Flow {} ({}): {issue}", row.flow_id, row.flow)?;
            }
        }

        for orphan in &metrics.orphans {
            writeln!(
                out,
                "* Unknown flow {}: {} packet(s) received ({} bytes) and {} loss(es) reported without any packet being sent, {} packet(s) received before they were sent",
                orphan.key,
                orphan.receives,
                orphan.received_bytes,
                orphan.losses,
                orphan.invalid_timestamps
            )?;
        }

        Ok(())
    }
}

fn write_summary(out: &mut dyn Write, title: &str, summary: &TrafficSummary) -> io::Result<()> {
    writeln!(out, "* {title} ({})", summary.flows)?;
    writeln!(
        out,
        "  * Tx packets: {} ({} bytes)",
        summary.tx_packets, summary.tx_bytes
    )?;
    writeln!(
        out,
        "  * Rx packets: {} ({} bytes)",
        summary.rx_packets, summary.rx_bytes
    )?;
    writeln!(
        out,
        "  * Lost packets: {}",
        format_metric(summary.lost_packets)
    )?;
    writeln!(
        out,
        "  * Packet delivery ratio: {}",
        format_metric(summary.packet_delivery_ratio)
    )?;
    writeln!(
        out,
        "  * Average delay (s): {}",
        format_metric(summary.average_delay_s)
    )?;
    writeln!(
        out,
        "  * Average jitter (s): {}",
        format_metric(summary.average_jitter_s)
    )?;
    writeln!(
        out,
        "  * Throughput (bps): {}",
        format_metric(summary.throughput_bps)
    )
}
