//! simhostd: simulation host daemon.
//!
//! Steps the bundled demo fleet forever, publishing each step to the
//! shared directory and obeying its control and reset files.
//!
//! Usage:
//!   simhostd --data-dir simulation_data
//!   simhostd --config host.json --agents 8 --seed 7
//!   simhostd --ticks 20

use anyhow::Result;
use simhost_core::{config::HostConfig, SimulationHost, TickReport};
use std::env;
use std::path::Path;

mod demo;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let agents = parse_arg(&args, "--agents", demo::DEFAULT_AGENTS);
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks: Option<u64> = flag_value(&args, "--ticks").and_then(|v| v.parse().ok());

    let mut config = match flag_value(&args, "--config") {
        Some(path) => HostConfig::load(Path::new(path))?,
        None => HostConfig::default(),
    };
    if let Some(dir) = flag_value(&args, "--data-dir") {
        config = config.with_data_dir(dir);
    }

    println!("simhostd: simulation host daemon");
    println!("  data_dir:  {}", config.data_dir.display());
    println!("  agents:    {agents}");
    println!("  seed:      {seed}");
    match ticks {
        Some(n) => println!("  ticks:     {n}"),
        None => println!("  ticks:     unbounded"),
    }
    println!();

    let mut host = SimulationHost::new(demo::DemoFactory { agents, seed }, &config)?;
    log::info!("Daemon initialization complete");

    match ticks {
        Some(n) => {
            let reports = host.run_ticks(n);
            print_summary(&reports);
            Ok(())
        }
        None => host.run(),
    }
}

fn print_summary(reports: &[TickReport]) {
    let stepped = reports.iter().filter(|r| r.stepped).count();
    let published = reports.iter().filter(|r| r.published).count();
    let resets = reports.iter().filter(|r| r.reset_requested).count();
    let failures: usize = reports.iter().map(|r| r.failures.len()).sum();

    println!("=== RUN SUMMARY ===");
    println!("  ticks run:   {}", reports.len());
    println!("  stepped:     {stepped}");
    println!("  published:   {published}");
    println!("  resets:      {resets}");
    println!("  failures:    {failures}");
    if let Some(last) = reports.last() {
        println!("  final tick:  {}", last.tick);
        println!("  generation:  {}", last.generation);
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
