use crate::config::cli::{CliOpt, Command};
use crate::config::load_json;
use crate::config::trace::TraceJson;
use crate::config::traffic::TrafficJson;
use crate::run::Progress;
use crate::synthetic::TrafficSpec;
use clap::Parser;
use fastrand::Rng;
use flow_monitor::FlowEvent;
use tracing_subscriber::EnvFilter;

mod config;
mod replay;
mod run;
mod synthetic;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let options = CliOpt::parse();
    let progress = Progress::new(&options);

    let events = match &options.command {
        Command::Replay(replay_opt) => {
            progress.line("--- Params ---");
            progress.line(format_args!("* Trace path: {}", replay_opt.trace.display()));

            let trace: TraceJson = load_json(&replay_opt.trace)?;
            replay::order_events(trace.into_events()?)
        }
        Command::Synthetic(synthetic_opt) => {
            let rng_seed = if synthetic_opt.non_deterministic {
                Rng::new().u64(..)
            } else {
                synthetic_opt.rng_seed
            };

            progress.line("--- Params ---");
            progress.line(format_args!("* Seed: {rng_seed}"));
            progress.line(format_args!(
                "* Traffic config path: {}",
                synthetic_opt.traffic.display()
            ));

            let traffic: TrafficJson = load_json(&synthetic_opt.traffic)?;
            traffic.validate()?;
            let spec = TrafficSpec::from(traffic);
            synthetic::generate_events(&spec, &mut Rng::with_seed(rng_seed))?
        }
    };

    tracing::debug!(events = events.len(), "events ready for ingestion");
    print_event_counts(&events, &progress);

    let ingestor = run::ingest(&events, options.strict, &progress)?;
    run::report(&options, &ingestor, &progress)
}

fn print_event_counts(events: &[FlowEvent], progress: &Progress) {
    let mut sent = 0;
    let mut received = 0;
    let mut lost = 0;
    for event in events {
        match event {
            FlowEvent::Sent { .. } => sent += 1,
            FlowEvent::Received { .. } => received += 1,
            FlowEvent::Lost { .. } => lost += 1,
        }
    }

    progress.line(format_args!(
        "* Events: {sent} sent, {received} received, {lost} lost"
    ));
}
