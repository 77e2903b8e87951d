//! Conformance test runner
//!
//! Runs the registered tests against the reference adapter and prints the
//! diagnostics of every test. The exit status is non-zero when any test
//! fails.

use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use d3d12_conformance::harness::fixture::TestEnv;
use d3d12_conformance::harness::Severity;
use d3d12_conformance::{reference, suite, Config};

#[derive(Debug, Default)]
struct Summary {
    passed: usize,
    failed: usize,
    skipped: usize,
}

fn run(config: &Config) -> Summary {
    let runtime = reference::create_runtime();
    info!("Running tests against {}", runtime.name());
    let env = TestEnv::new(runtime, config.device_options()).with_wait_timeout(config.wait_timeout());

    let mut summary = Summary::default();
    for case in suite::registry().iter().filter(|case| config.selects(case.name)) {
        let start = Instant::now();
        let outcome = suite::run_case(&env, case);
        debug!("{} finished in {:?}", case.name, start.elapsed());

        for record in outcome.records.iter().filter(|r| r.severity != Severity::Trace) {
            println!("{}", record);
        }
        let status = if outcome.failed(config.fail_on_todo_pass) {
            summary.failed += 1;
            "FAIL"
        } else if outcome.skipped() {
            summary.skipped += 1;
            "skip"
        } else {
            summary.passed += 1;
            "ok"
        };
        println!(
            "{}: {} ({} checks, {} failures, {} todo, {} skipped)",
            case.name, status, outcome.checks, outcome.failures, outcome.todos, outcome.skips
        );
    }
    summary
}

fn main() -> Result<ExitCode> {
    let config = Config::from_args(std::env::args().skip(1))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Configuration loaded: {:?}", config);

    let summary = run(&config);
    println!(
        "{} passed, {} failed, {} skipped",
        summary.passed, summary.failed, summary.skipped
    );

    Ok(if summary.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
