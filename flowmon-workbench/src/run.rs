use crate::config::cli::{CliOpt, OutputFormat};
use anyhow::Context;
use flow_monitor::report::csv::CsvReporter;
use flow_monitor::report::json::JsonReporter;
use flow_monitor::report::{ReportFormat, Reporter};
use flow_monitor::{
    EventIngestor, FlowEvent, FlowEventSink, FlowFilter, FlowMetrics, MetricsComputer,
};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Progress output, which must stay out of the way when stdout carries a CSV or JSON document
pub struct Progress {
    to_stdout: bool,
}

impl Progress {
    pub fn new(options: &CliOpt) -> Self {
        Self {
            to_stdout: options.format == OutputFormat::Console,
        }
    }

    pub fn line(&self, line: impl Display) {
        if self.to_stdout {
            println!("{line}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Feeds the events, in order, to a fresh ingestor
///
/// Rejected events are only fatal in strict mode. Otherwise they are counted and show up in the
/// report as data quality issues.
pub fn ingest(
    events: &[FlowEvent],
    strict: bool,
    progress: &Progress,
) -> anyhow::Result<EventIngestor> {
    let mut ingestor = EventIngestor::new();
    let mut rejected = 0;
    for (i, event) in events.iter().enumerate() {
        if let Err(e) = ingestor.deliver(event) {
            if strict {
                return Err(e).with_context(|| format!("event #{i} was rejected (strict mode)"));
            }

            rejected += 1;
        }
    }

    progress.line("--- Ingestion ---");
    progress.line(format_args!(
        "* Ingested events: {} ({rejected} rejected)",
        ingestor.ingested_events()
    ));
    progress.line(format_args!("* Flows: {}", ingestor.flows().len()));
    Ok(ingestor)
}

pub fn report(
    options: &CliOpt,
    ingestor: &EventIngestor,
    progress: &Progress,
) -> anyhow::Result<()> {
    let filter = FlowFilter {
        source: options.source,
        destination: options.destination,
        protocol: options.protocol,
    };
    let metrics = MetricsComputer::with_filter(filter).compute(ingestor.flows());

    let mut stdout = std::io::stdout().lock();
    ReportFormat::from(options.format)
        .reporter()
        .write_report(&metrics, &mut stdout)
        .context("failed to print report")?;
    stdout.flush()?;
    drop(stdout);

    if options.csv.is_some() || options.json.is_some() {
        progress.line("--- Saved reports ---");
    }

    if let Some(path) = &options.csv {
        save_report(&CsvReporter, &metrics, path)?;
        progress.line(format_args!("* CSV: {}", path.display()));
    }

    if let Some(path) = &options.json {
        save_report(&JsonReporter::pretty(), &metrics, path)?;
        progress.line(format_args!("* JSON: {}", path.display()));
    }

    Ok(())
}

fn save_report(
    reporter: &dyn Reporter,
    metrics: &FlowMetrics,
    path: &Path,
) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    reporter
        .write_report(metrics, &mut out)
        .and_then(|_| out.flush())
        .with_context(|| format!("failed to write report to {}", path.display()))
}
