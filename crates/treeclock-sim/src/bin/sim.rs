#![forbid(unsafe_code)]

use anyhow::{bail, Result};
use treeclock_sim::{SimConfig, Simulator};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let report = Simulator::new(SimConfig::default())?.run()?;

    println!(
        "simulation complete: rounds={} events={} syncs={} forks={} retires={} peak_agents={} checks={} clean={}",
        report.rounds,
        report.events,
        report.syncs,
        report.forks,
        report.retires,
        report.peak_agents,
        report.oracle.checks_run,
        report.oracle.clean(),
    );

    if !report.oracle.clean() {
        for violation in &report.oracle.violations {
            eprintln!("violation: {violation}");
        }
        bail!("{} oracle violations", report.oracle.violations.len());
    }
    Ok(())
}
