//! Worker lifecycle and cooperative shutdown
//!
//! Every long-running loop in the bridge runs as an independent tokio
//! task holding a clone of one shared shutdown signal. Cancellation is
//! cooperative: the signal is set once (idempotently) and each worker
//! observes it at its own blocking points; no task is ever aborted.
//!
//! The orchestrator also polls worker liveness. A worker that exits while
//! shutdown has not been requested gets a loud error log; if that worker
//! was marked critical (the serial listener; a dead listener defeats the
//! bridge's purpose), the whole bridge is shut down.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

type WorkerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type WorkerFactory = Box<dyn FnOnce(watch::Receiver<bool>) -> WorkerFuture + Send>;

/// How one worker ended, as reported by [`Orchestrator::await_termination`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The worker returned on its own
    Completed,
    /// The worker panicked
    Panicked,
    /// The worker was still running when the termination timeout expired
    /// (it is left running, never aborted)
    TimedOut,
}

struct Registered {
    name: String,
    critical: bool,
    factory: WorkerFactory,
}

struct Worker {
    name: String,
    critical: bool,
    handle: JoinHandle<()>,
    reported_dead: bool,
}

/// Starts, watches and cooperatively stops the bridge's workers
pub struct Orchestrator {
    shutdown_tx: watch::Sender<bool>,
    registered: Vec<Registered>,
    workers: Vec<Worker>,
    poll_interval: Duration,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    /// Create an orchestrator with no workers
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            registered: Vec::new(),
            workers: Vec::new(),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Change the liveness poll interval
    pub fn set_poll_interval(&mut self, poll_interval: Duration) {
        self.poll_interval = poll_interval;
    }

    /// A receiver for the shared shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// True once shutdown has been requested
    pub fn is_shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Register a worker. The closure receives its own clone of the
    /// shutdown signal when started and must exit promptly once it
    /// observes `true`. Nothing runs until [`Orchestrator::start_all`].
    pub fn register<F, Fut>(&mut self, name: &str, critical: bool, worker: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registered.push(Registered {
            name: name.to_string(),
            critical,
            factory: Box::new(move |shutdown| Box::pin(worker(shutdown))),
        });
    }

    /// Spawn every registered worker as an independent task
    pub fn start_all(&mut self) {
        for registered in self.registered.drain(..) {
            let handle = tokio::spawn((registered.factory)(self.shutdown_tx.subscribe()));
            info!("Worker {} started", registered.name);
            self.workers.push(Worker {
                name: registered.name,
                critical: registered.critical,
                handle,
                reported_dead: false,
            });
        }
    }

    /// Set the shutdown signal. Idempotent; safe from any context.
    pub fn request_shutdown(&self) {
        if !*self.shutdown_tx.borrow() {
            info!("Shutdown requested");
        }
        self.shutdown_tx.send_replace(true);
    }

    /// Watch worker liveness until shutdown is requested.
    pub async fn supervise(&mut self) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let poll = self.poll_interval;
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sleep(poll) => self.check_liveness(),
            }
        }
    }

    fn check_liveness(&mut self) {
        let mut critical_death = false;
        for worker in &mut self.workers {
            if worker.handle.is_finished() && !worker.reported_dead {
                worker.reported_dead = true;
                error!("Worker {} terminated unexpectedly", worker.name);
                if worker.critical {
                    error!(
                        "Critical worker {} is down, shutting down the bridge",
                        worker.name
                    );
                    critical_death = true;
                }
            }
        }
        if critical_death {
            self.request_shutdown();
        }
    }

    /// Join every worker, bounded by one overall timeout. Workers still
    /// running at the deadline are reported [`WorkerOutcome::TimedOut`]
    /// and left to finish on their own.
    pub async fn await_termination(self, timeout: Duration) -> Vec<(String, WorkerOutcome)> {
        let deadline = Instant::now() + timeout;
        let mut outcomes = Vec::with_capacity(self.workers.len());
        for worker in self.workers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = match tokio::time::timeout(remaining, worker.handle).await {
                Ok(Ok(())) => WorkerOutcome::Completed,
                Ok(Err(e)) => {
                    error!("Worker {} panicked: {}", worker.name, e);
                    WorkerOutcome::Panicked
                }
                Err(_) => {
                    warn!("Worker {} did not stop within the timeout", worker.name);
                    WorkerOutcome::TimedOut
                }
            };
            outcomes.push((worker.name, outcome));
        }
        outcomes
    }
}
