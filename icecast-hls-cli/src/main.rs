//! Process entry point (§6): parses `[-V] [--] <config.ini>`, and either
//! prints the `-V` plugin listing or runs the wired pipeline to
//! completion.
//!
//! ## License
//!
//! MIT License
//!
//! ## Authors
//!
//! - hua0512
//!

mod cli;
mod error;
mod signals;
mod wiring;

use std::process::ExitCode;

use clap::Parser;
use cli::CliArgs;
use error::IcecastHlsError;
use stages::{DestinationList, SourceList};
use stages::sourcelist::SourceOutcome;
use stages::registries::Registries;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let registries = Registries::build();

    if args.list_plugins {
        print_plugins(&registries);
        return ExitCode::SUCCESS;
    }

    let Some(config_path) = args.config else {
        eprintln!("usage: icecast-hls [-V] [--] <config.ini>");
        return ExitCode::FAILURE;
    };

    match run(&config_path, &registries) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("icecast-hls: {e}");
            ExitCode::FAILURE
        }
    }
}

/// `-V`/`--list-plugins` (§6): version, then every registered plugin name
/// grouped by stage kind.
fn print_plugins(registries: &Registries) {
    println!("icecast-hls {}", env!("CARGO_PKG_VERSION"));
    print_group("input", registries.inputs.names());
    print_group("demuxer", registries.demuxers.names());
    print_group("decoder", registries.decoders.names());
    print_group("filter", registries.filters.names());
    print_group("encoder", registries.encoders.names());
    print_group("muxer", registries.muxers.names());
    print_group("output", registries.outputs.names());
}

fn print_group<'a>(kind: &str, names: impl Iterator<Item = &'a str>) {
    let joined = names.collect::<Vec<_>>().join(", ");
    println!("  {kind}: {joined}");
}

fn init_logging(level: icecast_hls_config::LogLevel) {
    use icecast_hls_config::LogLevel as Lvl;
    let max_level = match level {
        Lvl::Trace => tracing::Level::TRACE,
        Lvl::Debug => tracing::Level::DEBUG,
        Lvl::Info => tracing::Level::INFO,
        Lvl::Warn => tracing::Level::WARN,
        Lvl::Error | Lvl::Fatal => tracing::Level::ERROR,
    };
    let subscriber = tracing_subscriber::fmt().with_max_level(max_level).finish();
    // main() only ever calls this once; a failure here means something
    // else already installed a global subscriber first, which is harmless
    // to ignore rather than panic over.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Parses `path`, wires the pipeline, runs it to completion and returns
/// whether every source ended cleanly (§6 "Exit code 0 on clean EOF of
/// all sources; 1 otherwise").
fn run(path: &str, registries: &Registries) -> Result<bool, IcecastHlsError> {
    let config = icecast_hls_config::parse_file(path)?;
    init_logging(config.options.log_level);

    let pipeline = wiring::wire(&config, registries)?;
    let quit_handles = pipeline.quit_handles;
    let stop_on_source_ending = config.options.stop_on_source_ending;

    // Destinations first, so every rendezvous consumer is already
    // listening before a source thread starts pushing (§4.12, §5).
    let mut destination_list = DestinationList::new();
    for wired in pipeline.destinations {
        destination_list.spawn(wired.destination, wired.consumer);
    }

    let mut source_list = SourceList::new();
    for source in pipeline.sources {
        let id = source.id().to_string();
        source_list
            .spawn(source)
            .map_err(|e| IcecastHlsError::Stage { section: "source", id, source: e })?;
    }

    let counter_entries = source_list
        .counters()
        .into_iter()
        .chain(destination_list.counters())
        .map(|(label, counters)| signals::CounterEntry { label, counters })
        .collect();
    signals::install(counter_entries);

    info!(sources = source_list.len(), destinations = destination_list.len(), "pipeline running");

    let source_outcomes = source_list.join_all();
    let mut all_clean = true;
    for outcome in &source_outcomes {
        match &outcome.exit {
            Ok(_) => {
                info!(source = %outcome.id, "source finished");
            }
            Err(e) => {
                all_clean = false;
                error!(source = %outcome.id, error = %e, "source failed");
                if stop_on_source_ending && e.is_fatal_for_source() {
                    warn!(source = %outcome.id, "stop-on-source-ending: quitting every destination");
                    for handle in &quit_handles {
                        handle.quit();
                    }
                }
            }
        }
    }
    log_non_eof_exits(&source_outcomes);

    let destination_outcomes = destination_list.join_all();
    for outcome in &destination_outcomes {
        if !outcome.ok() {
            all_clean = false;
            if outcome.quit() {
                warn!(destination = %outcome.id, "destination quit");
            } else {
                error!(destination = %outcome.id, status = outcome.status, "destination failed");
            }
        }
    }

    Ok(all_clean)
}

fn log_non_eof_exits(outcomes: &[SourceOutcome]) {
    use stages::source::SourceExit;
    for outcome in outcomes {
        if let Ok(exit) = &outcome.exit {
            match exit {
                SourceExit::EndOfStream => {}
                SourceExit::NoDestinationsLeft => {
                    info!(source = %outcome.id, "source stopped: every destination gone");
                }
                SourceExit::Cancelled => {
                    info!(source = %outcome.id, "source cancelled");
                }
            }
        }
    }
}
