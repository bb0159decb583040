/// zkident Zero-Knowledge Identification Protocol Orchestrator
///
/// Main entry point for the orchestration binary. Discovers every available
/// parameter set, builds one isolated protocol instance per set, and drives
/// them with the cooperative round scheduler until each instance converges
/// (impersonation probability at or below 2^-30) or fails. Supports listing
/// the parameter-set manifest, bounded tick runs, and telemetry export as
/// CSV or JSON.
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use zkident::{
    HmacSha256Provider, InstanceFactory, OrchestratorError, RoundOutcome, RoundScheduler,
    TelemetryCollector,
};

/// How many ticks pass between progress table refreshes in run mode.
const REPORT_EVERY_TICKS: u64 = 50;

fn main() -> ExitCode {
    println!("zkident Zero-Knowledge Identification Orchestrator");
    println!("==================================================");

    let args: Vec<String> = env::args().collect();
    let mode = if args.len() > 1 { args[1].as_str() } else { "run" };

    let result = match mode {
        "list" => list_parameter_sets(),
        "ticks" => {
            let count = args
                .get(2)
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or(REPORT_EVERY_TICKS);
            run_session(SessionMode::BoundedTicks(count))
        }
        "export" => match args.get(2) {
            Some(filename) => run_session(SessionMode::ExportCsv(filename.clone())),
            None => {
                println!("export mode needs a filename: zkident export <file.csv>");
                return ExitCode::FAILURE;
            }
        },
        "json" => run_session(SessionMode::PrintJson),
        "run" => run_session(SessionMode::RunToCompletion),
        _ => {
            display_usage_info();
            return ExitCode::SUCCESS;
        }
    };

    match result {
        Ok(clean) if clean => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            println!("session error: {}", err);
            ExitCode::FAILURE
        }
    }
}

enum SessionMode {
    /// Tick until every instance has converged or failed
    RunToCompletion,
    /// Tick a fixed number of times, then report
    BoundedTicks(u64),
    /// Run to completion, then write snapshots to a CSV file
    ExportCsv(String),
    /// Run to completion, then print snapshots as JSON to stdout
    PrintJson,
}

/// Prints the discovered parameter-set manifest without running any rounds.
fn list_parameter_sets() -> Result<bool, OrchestratorError> {
    let factory = InstanceFactory::initialize(Arc::new(HmacSha256Provider::new()))?;
    let manifest = factory.discover()?;

    println!("\nDiscovered {} parameter sets:", manifest.len());
    println!("| {:10} | {:12} | {:>9} | {:>8} |", "Set", "Display", "Key bits", "Security");
    for descriptor in &manifest {
        println!(
            "| {:10} | {:12} | {:>9} | 2^{:>6.1} |",
            descriptor.id,
            descriptor.display_name,
            descriptor.key_space_log2,
            descriptor.security_exponent()
        );
    }
    Ok(true)
}

/// Builds the full instance fleet and drives the scheduler per mode.
fn run_session(mode: SessionMode) -> Result<bool, OrchestratorError> {
    let factory = InstanceFactory::initialize(Arc::new(HmacSha256Provider::new()))?;
    let instances = factory.build_all()?;
    println!("\nRunning {} protocol instances", instances.len());

    let collector = TelemetryCollector::new("identification_session");
    let mut scheduler = RoundScheduler::new(instances);
    scheduler.resume();

    let tick_limit = match &mode {
        SessionMode::BoundedTicks(count) => Some(*count),
        _ => None,
    };

    let mut ticks: u64 = 0;
    while !scheduler.all_settled() {
        if let Some(limit) = tick_limit {
            if ticks >= limit {
                break;
            }
        }

        let report = scheduler.tick();
        ticks += 1;

        for (index, outcome) in &report.outcomes {
            let name = scheduler.instances()[*index].descriptor().display_name.clone();
            match outcome {
                RoundOutcome::Converged => {
                    println!(
                        "[tick {}] {} converged after {} rounds",
                        ticks,
                        name,
                        scheduler.instances()[*index].round_count()
                    );
                }
                RoundOutcome::Failed(err) => {
                    println!("[tick {}] {} failed: {}", ticks, name, err);
                }
                RoundOutcome::Ok => {}
            }
        }

        // Convergence pauses the scheduler so an operator surface can react;
        // this unattended session just resumes for the remaining instances.
        if report.paused && !scheduler.all_settled() {
            scheduler.resume();
        }

        if ticks % REPORT_EVERY_TICKS == 0 {
            let snapshots = collector.collect(scheduler.instances());
            collector.print_summary(&snapshots);
        }

        if let Some(remaining) = scheduler.tick_period().checked_sub(report.elapsed) {
            thread::sleep(remaining);
        }
    }

    let snapshots = collector.collect(scheduler.instances());
    collector.print_summary(&snapshots);
    println!("\nSession finished after {} ticks.", ticks);

    match mode {
        SessionMode::ExportCsv(filename) => {
            collector
                .export_to_csv(&filename, &snapshots)
                .map_err(|err| OrchestratorError::Initialization(err.to_string()))?;
        }
        SessionMode::PrintJson => {
            let body = collector
                .to_json_string(&snapshots)
                .map_err(|err| OrchestratorError::Initialization(err.to_string()))?;
            println!("{}", body);
        }
        SessionMode::RunToCompletion | SessionMode::BoundedTicks(_) => {}
    }

    Ok(!snapshots.iter().any(|snap| snap.failed))
}

/// Display usage information and available modes
fn display_usage_info() {
    println!("\nAvailable execution modes:");
    println!("  zkident                   - run all instances to convergence");
    println!("  zkident list              - print the parameter-set manifest");
    println!("  zkident ticks <n>         - run a bounded number of scheduler ticks");
    println!("  zkident export <file.csv> - run to completion, export telemetry as CSV");
    println!("  zkident json              - run to completion, print telemetry as JSON");
}
