//! Polling thread that keeps scanning for due background commands.

use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::config::WorkerConfig;
use crate::scanner::BackgroundCommandExecution;

/// Handle to control a running worker.
#[derive(Debug)]
pub struct BackgroundWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl BackgroundWorkerHandle {
    /// Stop after the current scan and wait for the thread to exit.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("background worker thread panicked");
            }
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub scans: u64,
    pub commands_executed: u64,
    pub commands_succeeded: u64,
    pub commands_failed: u64,
    pub scan_errors: u64,
    pub uptime_secs: u64,
}

/// Runs [`BackgroundCommandExecution::execute_all`] in a loop on its own thread.
///
/// Scans back to back while there is work; sleeps for the poll interval when a scan came
/// back empty or failed.
pub struct BackgroundWorker<S> {
    source: S,
}

impl<S> BackgroundWorker<S>
where
    S: BackgroundCommandExecution + Send + 'static,
{
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn spawn(self, config: WorkerConfig) -> io::Result<BackgroundWorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker_loop(self.source, config, shutdown_rx, stats_clone))?;

        Ok(BackgroundWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn worker_loop<S: BackgroundCommandExecution>(
    source: S,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, poll_ms = config.poll_interval.as_millis() as u64, "background worker started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let scan = source.execute_all();
        let idle = {
            let mut s = stats.lock().unwrap();
            s.uptime_secs = start_time.elapsed().as_secs();
            s.scans += 1;
            match &scan {
                Ok(report) => {
                    s.commands_executed += report.executed as u64;
                    s.commands_succeeded += report.succeeded as u64;
                    s.commands_failed += report.failed as u64;
                    report.executed == 0
                }
                Err(_) => {
                    s.scan_errors += 1;
                    true
                }
            }
        };

        if let Err(e) = scan {
            error!(worker = %config.name, error = %e, "failed to find commands to execute");
        }

        if idle {
            // Doubles as the idle sleep; a shutdown request cuts it short.
            match shutdown_rx.recv_timeout(config.poll_interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    debug!(worker = %config.name, "nothing due");
                }
            }
        }
    }

    info!(worker = %config.name, "background worker stopped");
}
