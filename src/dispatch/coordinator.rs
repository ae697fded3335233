//! Dispatch coordinator
//!
//! The coordinator owns the task counter and answers work requests in
//! arrival order. Dispatch is pull-based and first-come-first-served: an
//! idle worker asks for work, so faster workers naturally receive more tasks
//! without any explicit load metric.
//!
//! "Receive from any worker" is modeled as one shared request queue. Each
//! worker connection is pumped by its own task that forwards work requests
//! into the queue together with a reply channel; the dispatch loop drains the
//! queue strictly sequentially, so at most one worker is being served at a
//! time even though requests arrive concurrently.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;

use crate::config::RunConfig;
use crate::dispatch::protocol::{
    read_message, write_message, Message, TaskMessage, PROTOCOL_VERSION,
};
use crate::task::{FixedTaskSource, TaskDescriptor, TaskSource};

/// A work request waiting for the dispatch loop
///
/// Carries the index of the requesting worker and a one-shot channel for the
/// reply. The connection pump that created the request blocks on the reply
/// before it reads the next request from its worker, which keeps the
/// per-worker exchange strictly request/reply.
#[derive(Debug)]
pub struct WorkRequest {
    /// Index of the requesting worker connection
    pub worker: usize,

    /// Reply channel for this request
    pub reply: oneshot::Sender<Message>,
}

/// What the dispatch loop handed out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Total tasks dispatched
    pub dispatched: u64,

    /// Tasks dispatched per worker, indexed by connection order
    pub per_worker: Vec<u64>,
}

/// Dispatch coordinator
///
/// Connects to every worker, distributes the configured number of tasks, and
/// stops each worker exactly once.
#[derive(Debug)]
pub struct Coordinator {
    /// Run configuration
    config: Arc<RunConfig>,

    /// List of worker addresses (host:port)
    worker_addresses: Vec<String>,
}

impl Coordinator {
    /// Create a new coordinator
    ///
    /// Fails immediately when no workers are configured; with nobody to
    /// request them, the tasks could never be collected.
    pub fn new(config: Arc<RunConfig>, worker_addresses: Vec<String>) -> Result<Self> {
        if worker_addresses.is_empty() {
            anyhow::bail!("No workers!");
        }

        Ok(Self {
            config,
            worker_addresses,
        })
    }

    /// Run the dispatch phase and the shutdown phase
    ///
    /// Returns once every worker has received its stop sentinel and closed
    /// its connection.
    pub async fn run(self) -> Result<DispatchReport> {
        let workers = self.worker_addresses.len();

        println!("Connecting to {} workers...", workers);

        let mut connections = Vec::new();
        for (i, addr) in self.worker_addresses.iter().enumerate() {
            let stream = TcpStream::connect(addr)
                .await
                .with_context(|| format!("Failed to connect to {}", addr))?;
            if self.config.debug {
                eprintln!("DEBUG: connected to worker {} ({})", i, addr);
            }
            connections.push(stream);
        }

        println!("All {} workers connected", workers);
        println!();

        // One shared request queue; per-connection pumps feed it
        let (request_tx, mut request_rx) = mpsc::channel(workers);
        let mut pumps = JoinSet::new();
        for (i, stream) in connections.into_iter().enumerate() {
            let request_tx = request_tx.clone();
            pumps.spawn(async move { serve_worker(i, stream, request_tx).await });
        }
        drop(request_tx);

        let mut source = FixedTaskSource::new(TaskDescriptor::new(&self.config.command));
        let report = dispatch_loop(self.config.tasks, workers, &mut source, &mut request_rx).await?;

        // Every pump exits after writing its stop sentinel
        while let Some(joined) = pumps.join_next().await {
            joined.context("Worker connection task panicked")??;
        }

        println!("Dispatch complete: {} tasks", report.dispatched);
        for (i, count) in report.per_worker.iter().enumerate() {
            println!("  Worker {}: {} tasks", i, count);
        }

        Ok(report)
    }
}

/// Distribute `total_tasks` tasks, then stop all `workers` workers
///
/// Runs exactly `total_tasks` iterations answering the oldest pending work
/// request with the next descriptor from `source`, then exactly `workers`
/// more iterations answering with the stop sentinel. A worker that has been
/// stopped never requests again, so the second phase reaches every worker
/// exactly once regardless of how many tasks each one executed. With fewer
/// tasks than workers, the surplus workers are stopped on their first
/// request.
pub async fn dispatch_loop(
    total_tasks: u64,
    workers: usize,
    source: &mut dyn TaskSource,
    requests: &mut mpsc::Receiver<WorkRequest>,
) -> Result<DispatchReport> {
    if workers == 0 {
        anyhow::bail!("No workers!");
    }

    let mut per_worker = vec![0u64; workers];

    for _ in 0..total_tasks {
        let request = requests
            .recv()
            .await
            .context("Request queue closed before all tasks were dispatched")?;

        let descriptor = source.next_task();
        per_worker[request.worker] += 1;

        request
            .reply
            .send(Message::Task(TaskMessage { descriptor }))
            .map_err(|_| {
                anyhow::anyhow!("Worker {} hung up before receiving its task", request.worker)
            })?;
    }

    for _ in 0..workers {
        let request = requests
            .recv()
            .await
            .context("Request queue closed before all workers were stopped")?;

        request.reply.send(Message::Stop).map_err(|_| {
            anyhow::anyhow!(
                "Worker {} hung up before receiving its stop sentinel",
                request.worker
            )
        })?;
    }

    Ok(DispatchReport {
        dispatched: total_tasks,
        per_worker,
    })
}

/// Pump one worker connection
///
/// Reads work requests off the connection, forwards them to the dispatch
/// loop, and writes the reply back. Exits after relaying the stop sentinel.
async fn serve_worker<S>(
    worker: usize,
    mut stream: S,
    requests: mpsc::Sender<WorkRequest>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let msg = read_message(&mut stream)
            .await
            .with_context(|| format!("Failed to read request from worker {}", worker))?;

        let get = match msg {
            Message::Get(get) => get,
            other => anyhow::bail!("Expected GET from worker {}, got {:?}", worker, other),
        };

        if get.protocol_version != PROTOCOL_VERSION {
            anyhow::bail!(
                "Protocol version mismatch: coordinator={}, worker {} ({})={}",
                PROTOCOL_VERSION,
                worker,
                get.worker_id,
                get.protocol_version
            );
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        requests
            .send(WorkRequest {
                worker,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("Dispatch loop is gone"))?;

        let reply = reply_rx
            .await
            .context("Dispatch loop dropped the reply channel")?;

        let stop = matches!(reply, Message::Stop);
        write_message(&mut stream, &reply)
            .await
            .with_context(|| format!("Failed to reply to worker {}", worker))?;

        if stop {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Simulated worker talking straight to the request queue
    ///
    /// Returns its executed-task count and the sequence of replies it saw.
    async fn sim_worker(
        worker: usize,
        requests: mpsc::Sender<WorkRequest>,
        task_delay: Duration,
    ) -> (u64, Vec<&'static str>) {
        let mut executed = 0u64;
        let mut log = Vec::new();

        loop {
            let (reply_tx, reply_rx) = oneshot::channel();
            if requests
                .send(WorkRequest {
                    worker,
                    reply: reply_tx,
                })
                .await
                .is_err()
            {
                log.push("queue-closed");
                break;
            }

            match reply_rx.await {
                Ok(Message::Task(_)) => {
                    executed += 1;
                    log.push("task");
                    if !task_delay.is_zero() {
                        tokio::time::sleep(task_delay).await;
                    }
                }
                Ok(Message::Stop) => {
                    log.push("stop");
                    break;
                }
                Ok(_) => log.push("unexpected"),
                Err(_) => {
                    log.push("reply-dropped");
                    break;
                }
            }
        }

        (executed, log)
    }

    fn fixed_source() -> FixedTaskSource {
        FixedTaskSource::new(TaskDescriptor::new("unit"))
    }

    #[test]
    fn test_dispatches_exactly_n_tasks() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (tx, mut rx) = mpsc::channel(4);
            let mut source = fixed_source();

            let (report, a, b) = tokio::join!(
                dispatch_loop(6, 2, &mut source, &mut rx),
                sim_worker(0, tx.clone(), Duration::ZERO),
                sim_worker(1, tx, Duration::ZERO),
            );

            let report = report.unwrap();
            assert_eq!(report.dispatched, 6);
            assert_eq!(report.per_worker.iter().sum::<u64>(), 6);
            assert_eq!(a.0 + b.0, 6);

            // Exactly one stop each, and nothing after it
            for log in [&a.1, &b.1] {
                assert_eq!(log.iter().filter(|m| **m == "stop").count(), 1);
                assert_eq!(log.last(), Some(&"stop"));
            }
        });
    }

    #[test]
    fn test_zero_tasks_stops_every_worker_immediately() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (tx, mut rx) = mpsc::channel(4);
            let mut source = fixed_source();

            let (report, a, b, c) = tokio::join!(
                dispatch_loop(0, 3, &mut source, &mut rx),
                sim_worker(0, tx.clone(), Duration::ZERO),
                sim_worker(1, tx.clone(), Duration::ZERO),
                sim_worker(2, tx, Duration::ZERO),
            );

            let report = report.unwrap();
            assert_eq!(report.dispatched, 0);
            assert_eq!(report.per_worker, vec![0, 0, 0]);

            for (executed, log) in [a, b, c] {
                assert_eq!(executed, 0);
                assert_eq!(log, vec!["stop"]);
            }
        });
    }

    #[test]
    fn test_more_workers_than_tasks() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (tx, mut rx) = mpsc::channel(8);
            let mut source = fixed_source();

            let (report, results) = tokio::join!(
                dispatch_loop(3, 5, &mut source, &mut rx),
                async {
                    let mut sims = JoinSet::new();
                    for worker in 0..5 {
                        let tx = tx.clone();
                        // The delay keeps every re-request behind all five
                        // first requests
                        sims.spawn(async move {
                            sim_worker(worker, tx, Duration::from_millis(100)).await
                        });
                    }
                    drop(tx);

                    let mut results = Vec::new();
                    while let Some(joined) = sims.join_next().await {
                        results.push(joined.unwrap());
                    }
                    results
                },
            );

            let report = report.unwrap();
            assert_eq!(report.dispatched, 3);

            // Each worker's first request is served before anyone's second,
            // so three distinct workers execute exactly one task each
            let executed: Vec<u64> = results.iter().map(|(executed, _)| *executed).collect();
            assert_eq!(executed.iter().sum::<u64>(), 3);
            assert!(executed.iter().all(|&count| count <= 1));

            let stops: usize = results
                .iter()
                .map(|(_, log)| log.iter().filter(|m| **m == "stop").count())
                .sum();
            assert_eq!(stops, 5);
        });
    }

    #[test]
    fn test_faster_worker_receives_more_tasks() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (tx, mut rx) = mpsc::channel(4);
            let mut source = fixed_source();

            let (report, fast, slow) = tokio::join!(
                dispatch_loop(5, 2, &mut source, &mut rx),
                sim_worker(0, tx.clone(), Duration::ZERO),
                sim_worker(1, tx, Duration::from_millis(200)),
            );

            let report = report.unwrap();
            assert_eq!(report.dispatched, 5);
            assert_eq!(fast.0 + slow.0, 5);
            assert!(
                fast.0 >= 3,
                "fast worker got {} of 5 tasks, expected the larger share",
                fast.0
            );
        });
    }

    #[test]
    fn test_zero_workers_fails_fast() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (_tx, mut rx) = mpsc::channel::<WorkRequest>(1);
            let mut source = fixed_source();

            let err = dispatch_loop(5, 0, &mut source, &mut rx)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("No workers"));
        });
    }

    #[test]
    fn test_closed_queue_is_fatal() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (tx, mut rx) = mpsc::channel::<WorkRequest>(1);
            drop(tx);
            let mut source = fixed_source();

            let err = dispatch_loop(1, 1, &mut source, &mut rx)
                .await
                .unwrap_err();
            assert!(err.to_string().contains("Request queue closed"));
        });
    }

    #[test]
    fn test_coordinator_requires_workers() {
        let config = Arc::new(RunConfig {
            tasks: 1,
            command: "exit 0".to_string(),
            debug: false,
        });

        let err = Coordinator::new(config, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("No workers"));
    }

    #[test]
    fn test_serve_worker_rejects_version_mismatch() {
        use crate::dispatch::protocol::GetMessage;

        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (coordinator_side, mut worker_side) = tokio::io::duplex(1024);
            let (tx, _rx) = mpsc::channel(1);

            let pump = tokio::spawn(async move { serve_worker(0, coordinator_side, tx).await });

            let bad_get = Message::Get(GetMessage {
                protocol_version: PROTOCOL_VERSION + 1,
                worker_id: "node1:9999".to_string(),
            });
            write_message(&mut worker_side, &bad_get).await.unwrap();

            let err = pump.await.unwrap().unwrap_err();
            assert!(err.to_string().contains("Protocol version mismatch"));
        });
    }

    #[test]
    fn test_serve_worker_rejects_unexpected_message() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let (coordinator_side, mut worker_side) = tokio::io::duplex(1024);
            let (tx, _rx) = mpsc::channel(1);

            let pump = tokio::spawn(async move { serve_worker(0, coordinator_side, tx).await });

            write_message(&mut worker_side, &Message::Stop).await.unwrap();

            let err = pump.await.unwrap().unwrap_err();
            assert!(err.to_string().contains("Expected GET"));
        });
    }
}
