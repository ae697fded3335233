//! TaskFarm CLI entry point

use anyhow::{Context, Result};
use std::process::Child;
use std::sync::Arc;
use std::time::{Duration, Instant};

use taskfarm::config::{cli::Cli, resolve_worker_addresses, ConfigError, ExecutionMode, RunConfig, RunFile};
use taskfarm::dispatch::coordinator::DispatchReport;
use taskfarm::output::RunSummary;
use taskfarm::task::runner::ShellRunner;
use taskfarm::util::time::{calculate_rate, format_duration, format_rate};
use taskfarm::{hooks, Coordinator, WorkerService};

fn main() -> Result<()> {
    println!("TaskFarm v{}", env!("CARGO_PKG_VERSION"));
    println!("Minimal distributed task dispatcher");
    println!();

    // Parse CLI arguments
    let cli = Cli::parse_args();
    cli.validate()?;

    // Environment hook wraps the whole run, whatever the mode
    let mut hook = hooks::default_hook();
    hook.startup().context("Environment hook startup failed")?;

    let result = match cli.mode {
        ExecutionMode::Standalone => run_standalone(cli),
        ExecutionMode::Coordinator => run_coordinator(cli),
        ExecutionMode::Worker => run_worker(cli),
    };

    hook.shutdown().context("Environment hook shutdown failed")?;

    result
}

/// Load the optional run file named by --config
fn load_run_file(cli: &Cli) -> Result<RunFile> {
    match cli.config {
        Some(ref path) => RunFile::from_file(path),
        None => Ok(RunFile::default()),
    }
}

/// Print the run configuration summary
fn print_configuration(config: &RunConfig, workers: usize) {
    println!("Configuration:");
    println!("  Tasks:   {}", config.tasks);
    println!("  Workers: {}", workers);
    println!("  Command: {}", config.command);
    println!();
}

/// Run in standalone mode (spawn local workers, coordinate them)
fn run_standalone(cli: Cli) -> Result<()> {
    let run_file = load_run_file(&cli)?;
    let config = Arc::new(RunConfig::resolve(&cli, &run_file)?);

    let workers = cli.workers.unwrap_or_else(num_cpus::get);
    if workers == 0 {
        return Err(ConfigError::NoWorkers.into());
    }

    print_configuration(&config, workers);

    if cli.dry_run {
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    // Spawn one worker process per port
    let ports = find_available_ports(workers, cli.debug)?;
    let mut children = Vec::new();
    for &port in &ports {
        children.push(launch_worker(port, &cli)?);
    }

    // Give the workers a moment to bind their listeners
    std::thread::sleep(Duration::from_millis(500));

    let addresses: Vec<String> = ports.iter().map(|p| format!("127.0.0.1:{}", p)).collect();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let start = Instant::now();
    let result = runtime.block_on(async {
        let coordinator = Coordinator::new(config.clone(), addresses)?;
        coordinator.run().await
    });
    let elapsed = start.elapsed();

    // Workers exit on their own after their stop sentinel
    reap_workers(children, cli.debug)?;

    let report = result?;
    finish_run(&config, &report, elapsed, &cli)
}

/// Run in coordinator mode (distribute to remote workers)
fn run_coordinator(cli: Cli) -> Result<()> {
    let run_file = load_run_file(&cli)?;
    let config = Arc::new(RunConfig::resolve(&cli, &run_file)?);
    let addresses = resolve_worker_addresses(&cli, &run_file)?;

    print_configuration(&config, addresses.len());

    if cli.dry_run {
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let start = Instant::now();
    let report = runtime.block_on(async {
        let coordinator = Coordinator::new(config.clone(), addresses)?;
        coordinator.run().await
    })?;
    let elapsed = start.elapsed();

    finish_run(&config, &report, elapsed, &cli)
}

/// Run in worker mode (serve one coordinator, then exit)
fn run_worker(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let service = WorkerService::bind(cli.listen_port, cli.debug).await?;
        let mut runner = ShellRunner::new();
        service.run(&mut runner).await
    })?;

    Ok(())
}

/// Print the final report and write the optional JSON summary
fn finish_run(config: &RunConfig, report: &DispatchReport, elapsed: Duration, cli: &Cli) -> Result<()> {
    let rate = calculate_rate(report.dispatched, elapsed);

    println!();
    println!(
        "Elapsed: {} ({} tasks/s)",
        format_duration(elapsed),
        format_rate(rate)
    );

    if let Some(ref path) = cli.json_output {
        let summary = RunSummary::new(config, report, elapsed);
        summary.to_file(path)?;
        println!("Run summary written to: {}", path.display());
    }

    Ok(())
}

/// Find free localhost ports for the spawned workers
fn find_available_ports(count: usize, debug: bool) -> Result<Vec<u16>> {
    use std::net::TcpListener;

    let mut ports = Vec::with_capacity(count);

    // Scan a fixed range so leftover workers from a crashed run are easy to spot
    for port in 9999..10100 {
        if ports.len() == count {
            break;
        }
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            drop(listener);
            if debug {
                eprintln!("DEBUG: port {} is available", port);
            }
            ports.push(port);
        }
    }

    if ports.len() < count {
        anyhow::bail!(
            "Found only {} free ports in range 9999-10099, need {}. Close other TaskFarm instances.",
            ports.len(),
            count
        );
    }

    Ok(ports)
}

/// Launch a worker process on the given port
fn launch_worker(port: u16, cli: &Cli) -> Result<Child> {
    use std::process::{Command, Stdio};

    let exe_path = std::env::current_exe().context("Failed to get current executable path")?;

    let mut cmd = Command::new(&exe_path);
    cmd.arg("--mode").arg("worker");
    cmd.arg("--listen-port").arg(port.to_string());

    if cli.debug {
        cmd.arg("--debug");
        let log_path = format!("/tmp/taskfarm_worker_{}.log", port);
        let log_file = std::fs::File::create(&log_path)
            .context("Failed to create worker log file")?;
        cmd.stdout(Stdio::from(log_file.try_clone()?));
        cmd.stderr(Stdio::from(log_file));
        eprintln!("DEBUG: worker log: {}", log_path);
    } else {
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
    }

    let child = cmd.spawn().context("Failed to spawn worker process")?;

    if cli.debug {
        eprintln!("DEBUG: worker launched on port {} (PID: {})", port, child.id());
    }

    Ok(child)
}

/// Wait for the spawned workers to exit, killing stragglers
fn reap_workers(children: Vec<Child>, debug: bool) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);

    for mut child in children {
        loop {
            match child.try_wait()? {
                Some(status) => {
                    if debug {
                        eprintln!("DEBUG: worker {} exited with status: {}", child.id(), status);
                    }
                    break;
                }
                None if Instant::now() >= deadline => {
                    if debug {
                        eprintln!("DEBUG: worker {} still running, killing", child.id());
                    }
                    child.kill()?;
                    child.wait()?;
                    break;
                }
                None => std::thread::sleep(Duration::from_millis(100)),
            }
        }
    }

    Ok(())
}
