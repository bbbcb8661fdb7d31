//! Graceful startup/shutdown of a set of long running tasks
//!
//! ```no_run
//! use svckit::lifecycle::Runner;
//!
//! # async fn serve() -> anyhow::Result<()> {
//! let mut runner = Runner::new();
//! runner.spawn("ticker", |mut shutdown| async move {
//!     loop {
//!         tokio::select! {
//!             _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
//!             _ = shutdown.wait() => return Ok(()),
//!         }
//!     }
//! });
//! runner.run().await
//! # }
//! ```

use anyhow::anyhow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Shutdown notification handed to every task
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // runner dropped
                return;
            }
        }
    }
}

/// Requests shutdown from outside the runner
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Runs named tasks until ctrl-c, SIGTERM, an explicit trigger or a task
/// failure, then signals shutdown and waits for all of them
pub struct Runner {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    tasks: Vec<(String, TaskFuture)>,
    grace_period: Duration,
    listen_for_signals: bool,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            tasks: Vec::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
            listen_for_signals: true,
        }
    }

    /// How long tasks get to finish after shutdown before being aborted
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Do not install ctrl-c / SIGTERM handlers
    pub fn without_signals(mut self) -> Self {
        self.listen_for_signals = false;
        self
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.tx),
        }
    }

    pub fn shutdown(&self) -> Shutdown {
        Shutdown {
            rx: self.rx.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Register a task; it starts when [`Runner::run`] is called
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let future = task(self.shutdown());
        self.tasks.push((name.into(), Box::pin(future)));
    }

    /// Run every task and return the first error any of them reported
    pub async fn run(self) -> anyhow::Result<()> {
        let Runner {
            tx,
            rx,
            tasks,
            grace_period,
            listen_for_signals,
        } = self;

        let mut set = JoinSet::new();
        info!(tasks = tasks.len(), "Starting tasks");
        for (name, future) in tasks {
            set.spawn(async move { (name, future.await) });
        }

        let mut first_error: Option<anyhow::Error> = None;
        let mut shutdown = Shutdown { rx };
        let requested = shutdown.wait();
        let signal = wait_for_signal(listen_for_signals);
        tokio::pin!(requested, signal);

        loop {
            tokio::select! {
                _ = &mut requested => {
                    info!("Shutdown requested, stopping tasks...");
                    break;
                }
                _ = &mut signal => {
                    info!("Received shutdown signal, stopping tasks...");
                    break;
                }
                joined = set.join_next() => match joined {
                    None => break,
                    Some(result) => {
                        if let Err(e) = record(result, &mut first_error) {
                            error!(error = %e, "Task failed, stopping remaining tasks");
                            break;
                        }
                    }
                },
            }
        }

        tx.send_replace(true);

        let drain = async {
            while let Some(result) = set.join_next().await {
                if let Err(e) = record(result, &mut first_error) {
                    error!(error = %e, "Task failed during shutdown");
                }
            }
        };
        if tokio::time::timeout(grace_period, drain).await.is_err() {
            warn!(
                grace_period_ms = grace_period.as_millis() as u64,
                remaining = set.len(),
                "Grace period elapsed, aborting remaining tasks"
            );
            set.abort_all();
        }

        info!("Shutdown complete");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Log the outcome of one task, keeping the first failure.
/// Returns a description of the failure, if any.
fn record(
    result: Result<(String, anyhow::Result<()>), JoinError>,
    first_error: &mut Option<anyhow::Error>,
) -> Result<(), String> {
    let failure = match result {
        Ok((name, Ok(()))) => {
            debug!(task = %name, "Task finished");
            return Ok(());
        }
        Ok((name, Err(e))) => e.context(format!("task {} failed", name)),
        Err(e) => anyhow!("task panicked or was cancelled: {}", e),
    };

    let description = format!("{:#}", failure);
    if first_error.is_none() {
        *first_error = Some(failure);
    }
    Err(description)
}

async fn wait_for_signal(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!(error = %e, "Failed to listen for Ctrl+C");
                            std::future::pending::<()>().await;
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
