//! Background worker that uploads flushed batches.
//!
//! The recorder hands batches over an `mpsc` channel and never waits for the
//! network. The worker retries transient failures, parks undeliverable
//! records in a bounded queue, and retries that queue ahead of each new batch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::circuit_breaker::{CircuitBreaker, CircuitConfig};
use super::retry::{send_with_retry, RetryOutcome, RetryPolicy};
use super::CloudTransport;
use crate::event::CompletionRecord;

/// Maximum number of records kept for a later upload attempt.
pub const MAX_FAILED_QUEUE_SIZE: usize = 1000;

/// Records taken from the failed queue per upload.
const REQUEUE_BATCH_SIZE: usize = 100;

/// Tuning for a [`CloudForwarder`].
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    pub retry_policy: RetryPolicy,
    pub circuit: CircuitConfig,
    /// Capacity of the failed-record queue; the oldest records are dropped first.
    pub max_failed_queue: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            circuit: CircuitConfig::default(),
            max_failed_queue: MAX_FAILED_QUEUE_SIZE,
        }
    }
}

impl ForwarderConfig {
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_circuit(mut self, circuit: CircuitConfig) -> Self {
        self.circuit = circuit;
        self
    }

    pub fn with_max_failed_queue(mut self, max: usize) -> Self {
        self.max_failed_queue = max;
        self
    }
}

/// Counters describing what happened to forwarded records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Records accepted by the transport.
    pub sent: u64,
    /// Records given up on (rejected, queue overflow, or left over at shutdown).
    pub dropped: u64,
    /// Records waiting in the failed queue.
    pub queued: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sent: AtomicU64,
    dropped: AtomicU64,
    queued: AtomicU64,
    /// Set by `shutdown`; the worker stops backing off once it sees it.
    closing: AtomicBool,
}

/// Handle on the upload worker thread.
pub struct CloudForwarder {
    sender: Option<mpsc::Sender<Vec<CompletionRecord>>>,
    worker: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
    circuit: Arc<CircuitBreaker>,
}

impl CloudForwarder {
    /// Spawn the worker thread.
    pub fn start(transport: Arc<dyn CloudTransport>, config: ForwarderConfig) -> Self {
        let (sender, receiver) = mpsc::channel::<Vec<CompletionRecord>>();
        let counters = Arc::new(Counters::default());
        let circuit = Arc::new(CircuitBreaker::new(config.circuit.clone()));

        let mut worker = Worker {
            transport,
            retry_policy: config.retry_policy,
            max_failed_queue: config.max_failed_queue,
            circuit: Arc::clone(&circuit),
            counters: Arc::clone(&counters),
            failed: VecDeque::new(),
        };

        let handle = thread::Builder::new()
            .name("cactus-telemetry-upload".to_string())
            .spawn(move || worker.run(receiver));

        let worker = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::warn!(
                    target: "cactus_telemetry",
                    "Failed to spawn upload worker, cloud telemetry disabled: {}",
                    e
                );
                None
            }
        };

        Self {
            sender: worker.as_ref().map(|_| sender),
            worker,
            counters,
            circuit,
        }
    }

    /// Queue a batch for upload without blocking.
    pub fn submit(&self, batch: Vec<CompletionRecord>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len() as u64;
        let delivered = self
            .sender
            .as_ref()
            .map(|sender| sender.send(batch).is_ok())
            .unwrap_or(false);
        if !delivered {
            self.counters.dropped.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> ForwarderStats {
        ForwarderStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            queued: self.counters.queued.load(Ordering::Relaxed),
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        self.circuit.is_open()
    }

    /// Close the channel and wait for the worker's final drain.
    ///
    /// Batches still in the channel get a single attempt each.
    pub fn shutdown(&mut self) -> ForwarderStats {
        self.counters.closing.store(true, Ordering::SeqCst);
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!(target: "cactus_telemetry", "Upload worker panicked");
            }
        }
        self.stats()
    }
}

impl std::fmt::Debug for CloudForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudForwarder")
            .field("running", &self.worker.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for CloudForwarder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    transport: Arc<dyn CloudTransport>,
    retry_policy: RetryPolicy,
    max_failed_queue: usize,
    circuit: Arc<CircuitBreaker>,
    counters: Arc<Counters>,
    failed: VecDeque<CompletionRecord>,
}

impl Worker {
    fn run(&mut self, receiver: mpsc::Receiver<Vec<CompletionRecord>>) {
        let retry_policy = self.retry_policy.clone();
        let single_attempt = RetryPolicy::no_retry();
        for batch in receiver {
            let policy = if self.counters.closing.load(Ordering::SeqCst) {
                &single_attempt
            } else {
                &retry_policy
            };
            self.retry_failed(policy);
            self.deliver(batch, policy);
        }

        // Channel closed: one last attempt without backoff so shutdown stays quick.
        self.retry_failed(&single_attempt);
        if !self.failed.is_empty() {
            log::debug!(
                target: "cactus_telemetry",
                "Dropping {} undelivered telemetry records at shutdown",
                self.failed.len()
            );
            self.counters
                .dropped
                .fetch_add(self.failed.len() as u64, Ordering::Relaxed);
            self.failed.clear();
            self.publish_queue_len();
        }
    }

    fn deliver(&mut self, batch: Vec<CompletionRecord>, policy: &RetryPolicy) {
        let transport = Arc::clone(&self.transport);
        match send_with_retry(policy, &self.circuit, || transport.send_batch(&batch)) {
            RetryOutcome::Delivered => {
                self.counters
                    .sent
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
            RetryOutcome::Rejected(err) => {
                log::warn!(
                    target: "cactus_telemetry",
                    "Collector rejected {} records: {}",
                    batch.len(),
                    err
                );
                self.counters
                    .dropped
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                log::debug!(
                    target: "cactus_telemetry",
                    "Upload failed after {} attempts: {}",
                    attempts,
                    last_error
                );
                self.enqueue(batch);
            }
            RetryOutcome::CircuitOpen => self.enqueue(batch),
        }
    }

    fn retry_failed(&mut self, policy: &RetryPolicy) {
        // `allows_attempt` only peeks; the half-open attempt is claimed inside
        // `send_with_retry`.
        while !self.failed.is_empty() && self.circuit.allows_attempt() {
            let take = self.failed.len().min(REQUEUE_BATCH_SIZE);
            let batch: Vec<CompletionRecord> = self.failed.drain(..take).collect();
            self.publish_queue_len();

            let before = self.failed.len();
            self.deliver_requeued(batch, policy);
            if self.failed.len() > before {
                // Still failing; leave the rest for the next round.
                break;
            }
        }
    }

    /// Like `deliver`, but failed records go back to the front of the queue.
    fn deliver_requeued(&mut self, batch: Vec<CompletionRecord>, policy: &RetryPolicy) {
        let transport = Arc::clone(&self.transport);
        match send_with_retry(policy, &self.circuit, || transport.send_batch(&batch)) {
            RetryOutcome::Delivered => {
                self.counters
                    .sent
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
            RetryOutcome::Rejected(err) => {
                log::warn!(
                    target: "cactus_telemetry",
                    "Collector rejected {} queued records: {}",
                    batch.len(),
                    err
                );
                self.counters
                    .dropped
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
            }
            RetryOutcome::Exhausted { .. } | RetryOutcome::CircuitOpen => {
                for record in batch.into_iter().rev() {
                    self.failed.push_front(record);
                }
                self.publish_queue_len();
            }
        }
    }

    fn enqueue(&mut self, batch: Vec<CompletionRecord>) {
        for record in batch {
            if self.failed.len() >= self.max_failed_queue {
                self.failed.pop_front();
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
            self.failed.push_back(record);
        }
        self.publish_queue_len();
    }

    fn publish_queue_len(&self) {
        self.counters
            .queued
            .store(self.failed.len() as u64, Ordering::Relaxed);
    }
}
