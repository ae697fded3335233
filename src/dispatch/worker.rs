//! Worker service
//!
//! A worker binds a listener, waits for the coordinator to connect, and then
//! runs the request/execute loop: ask for a task, run it, ask for the next
//! one. The loop ends when the coordinator answers with the stop sentinel,
//! after which the worker sends nothing further and the process exits.
//!
//! A failed task execution is logged and counted but never ends the loop;
//! one bad task must not stall the whole distribution.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;

use crate::dispatch::protocol::{
    read_message, write_message, GetMessage, Message, PROTOCOL_VERSION,
};
use crate::stats::WorkerStats;
use crate::task::runner::{TaskOutcome, TaskRunner};

/// Worker service
///
/// Accepts one coordinator connection and serves it until stopped.
pub struct WorkerService {
    /// Listener the coordinator connects to
    listener: TcpListener,

    /// Worker identifier (hostname and bound port)
    worker_id: String,

    /// Verbose logging
    debug: bool,
}

impl WorkerService {
    /// Bind the service
    ///
    /// Port 0 binds an ephemeral port; `local_addr` reports the actual one.
    pub async fn bind(listen_port: u16, debug: bool) -> Result<Self> {
        let addr = format!("0.0.0.0:{}", listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .context("Failed to bind worker service")?;

        let port = listener
            .local_addr()
            .context("Failed to read bound address")?
            .port();
        let worker_id = worker_identity(port);

        Ok(Self {
            listener,
            worker_id,
            debug,
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read bound address")
    }

    /// This worker's identity as reported to the coordinator
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Serve one dispatch session
    ///
    /// Blocks until the coordinator connects, then requests and executes
    /// tasks until stopped. Returns the worker's tally.
    pub async fn run<R: TaskRunner>(self, runner: &mut R) -> Result<WorkerStats> {
        println!(
            "Worker {} listening on port {}",
            self.worker_id,
            self.local_addr()?.port()
        );
        println!("Waiting for coordinator connection...");

        let (mut stream, addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept coordinator connection")?;
        println!("Coordinator connected from: {}", addr);

        let stats = work_loop(&mut stream, runner, &self.worker_id, self.debug).await?;

        println!("Worker {} stopped: {}", self.worker_id, stats.summary());
        Ok(stats)
    }
}

/// The request/execute loop
///
/// Sends a work request, blocks for the reply, executes the task if one came
/// back, and repeats until the stop sentinel arrives. Execution failures are
/// logged with this worker's identity and the failing descriptor, then the
/// loop continues. Any reply other than a task or the stop sentinel is a
/// fatal protocol error.
pub async fn work_loop<S, R>(
    stream: &mut S,
    runner: &mut R,
    worker_id: &str,
    debug: bool,
) -> Result<WorkerStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: TaskRunner,
{
    let mut stats = WorkerStats::new();

    loop {
        let request = Message::Get(GetMessage {
            protocol_version: PROTOCOL_VERSION,
            worker_id: worker_id.to_string(),
        });
        write_message(stream, &request)
            .await
            .context("Failed to send work request")?;

        let reply = read_message(stream)
            .await
            .context("Failed to read coordinator reply")?;

        match reply {
            Message::Stop => break,
            Message::Task(task) => {
                if debug {
                    eprintln!("DEBUG: worker {} executing: {}", worker_id, task.descriptor);
                }

                let started = Instant::now();
                match runner.run(&task.descriptor) {
                    Ok(TaskOutcome::Success) => stats.record_success(started.elapsed()),
                    Ok(TaskOutcome::Failed { exit_code }) => {
                        eprintln!(
                            "Task failed on worker {}: {} (exit {:?})",
                            worker_id, task.descriptor, exit_code
                        );
                        stats.record_failure(started.elapsed());
                    }
                    Err(e) => {
                        eprintln!(
                            "Task failed on worker {}: {}: {:#}",
                            worker_id, task.descriptor, e
                        );
                        stats.record_failure(started.elapsed());
                    }
                }
            }
            other => anyhow::bail!("Expected TASK or STOP, got {:?}", other),
        }
    }

    Ok(stats)
}

/// Worker identity reported in every work request
///
/// Hostname plus bound port, so several workers on one host stay
/// distinguishable in the logs.
fn worker_identity(port: u16) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{}:{}", host, port)
}
