//! Off-thread PPG analysis.
//!
//! Architecture:
//! - One worker thread owns a `ChannelEnsemble`
//! - Bounded command channel; the producer never blocks and frames are
//!   dropped (and counted) under backpressure
//! - Bounded result channel; results the consumer has no room for are
//!   dropped (and counted) instead of stalling analysis
//! - Atomic metrics for observability

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use zenb_ppg::{ChannelEnsemble, Frame, MultiChannelResult, PpgConfig};

const COMMAND_CAPACITY: usize = 64;
const RESULT_CAPACITY: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker queue full, frame dropped")]
    Backpressure,
    #[error("worker thread is not running")]
    Disconnected,
}

/// Worker metrics tracked atomically
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    pub frames_processed: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub results_dropped: AtomicU64,
}

impl WorkerMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub results_dropped: u64,
}

/// Commands sent to worker thread
pub enum WorkerCmd {
    Frame(Frame),
    AdjustGain { channel_id: usize, delta: f32 },
    Reset,
    /// Reply once every earlier command has been handled
    Flush { response_tx: Sender<()> },
    Shutdown,
}

/// Handle to the analysis thread
pub struct PpgWorker {
    tx: Sender<WorkerCmd>,
    results: Receiver<MultiChannelResult>,
    metrics: Arc<WorkerMetrics>,
    worker_thread: Option<thread::JoinHandle<()>>,
}

impl PpgWorker {
    /// Create and start the worker with default queue sizes
    pub fn start(config: PpgConfig) -> Self {
        Self::with_capacity(config, COMMAND_CAPACITY, RESULT_CAPACITY)
    }

    pub fn with_capacity(
        config: PpgConfig,
        command_capacity: usize,
        result_capacity: usize,
    ) -> Self {
        let (tx, rx) = bounded(command_capacity.max(1));
        let (result_tx, results) = bounded(result_capacity.max(1));
        let metrics = Arc::new(WorkerMetrics::default());
        let metrics_clone = Arc::clone(&metrics);

        let worker_thread = thread::spawn(move || {
            Self::run(ChannelEnsemble::with_config(config), rx, result_tx, metrics_clone);
        });

        PpgWorker {
            tx,
            results,
            metrics,
            worker_thread: Some(worker_thread),
        }
    }

    /// Queue one frame without blocking.
    pub fn submit_frame(&self, frame: Frame) -> Result<(), WorkerError> {
        match self.tx.try_send(WorkerCmd::Frame(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.metrics.frames_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!("ppg worker backpressure: frame dropped ({} total)", dropped);
                Err(WorkerError::Backpressure)
            }
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::Disconnected),
        }
    }

    pub fn adjust_channel_gain(&self, channel_id: usize, delta: f32) -> Result<(), WorkerError> {
        self.tx
            .send(WorkerCmd::AdjustGain { channel_id, delta })
            .map_err(|_| WorkerError::Disconnected)
    }

    pub fn reset(&self) -> Result<(), WorkerError> {
        self.tx
            .send(WorkerCmd::Reset)
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Block until everything queued so far has been processed.
    pub fn flush(&self) -> Result<(), WorkerError> {
        let (response_tx, response_rx) = bounded(1);
        self.tx
            .send(WorkerCmd::Flush { response_tx })
            .map_err(|_| WorkerError::Disconnected)?;
        response_rx.recv().map_err(|_| WorkerError::Disconnected)
    }

    /// Result stream, one entry per processed frame.
    pub fn results(&self) -> &Receiver<MultiChannelResult> {
        &self.results
    }

    pub fn try_recv_result(&self) -> Option<MultiChannelResult> {
        self.results.try_recv().ok()
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Shutdown worker gracefully
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.worker_thread.take() {
            let _ = self.tx.send(WorkerCmd::Shutdown);
            if handle.join().is_err() {
                log::warn!("ppg worker thread panicked");
            }
        }
    }

    fn run(
        mut ensemble: ChannelEnsemble,
        rx: Receiver<WorkerCmd>,
        result_tx: Sender<MultiChannelResult>,
        metrics: Arc<WorkerMetrics>,
    ) {
        while let Ok(cmd) = rx.recv() {
            match cmd {
                WorkerCmd::Frame(frame) => {
                    let result = ensemble.process_frame(frame);
                    metrics.frames_processed.fetch_add(1, Ordering::Relaxed);
                    if result_tx.try_send(result).is_err() {
                        metrics.results_dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                WorkerCmd::AdjustGain { channel_id, delta } => {
                    ensemble.adjust_channel_gain(channel_id, delta);
                }
                WorkerCmd::Reset => ensemble.reset(),
                WorkerCmd::Flush { response_tx } => {
                    let _ = response_tx.send(());
                }
                WorkerCmd::Shutdown => break,
            }
        }
        log::debug!("ppg worker stopped");
    }
}

impl Drop for PpgWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
