// src/pipeline/controller.rs
use crate::error::{ConfigError, LifecycleError};
use crate::event::Event;
use crate::pipeline::chain::Chain;
use crate::pipeline::stage::{Outcome, Sentinel};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Per-controller event counts, summed over all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub received: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub undeliverable: usize,
}

impl ControllerStats {
    pub fn merge(&mut self, other: &ControllerStats) {
        self.received += other.received;
        self.delivered += other.delivered;
        self.dropped += other.dropped;
        self.undeliverable += other.undeliverable;
    }
}

enum State {
    Idle,
    Running {
        // Never sent on; dropping it tells every worker to drain and exit
        shutdown: Sender<()>,
        handles: Vec<JoinHandle<ControllerStats>>,
    },
    Closed,
}

/// A fixed pool of workers driving events from an inbound channel through a
/// shared [`Chain`] and into a [`Sentinel`].
pub struct Controller {
    name: String,
    chain: Arc<Chain>,
    workers: usize,
    state: State,
    stats: ControllerStats,
}

impl Controller {
    pub fn new(name: impl Into<String>, chain: Chain, workers: usize) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::InvalidWorkerCount(workers));
        }
        Ok(Controller {
            name: name.into(),
            chain: Arc::new(chain),
            workers,
            state: State::Idle,
            stats: ControllerStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Counts collected by the last successful or failed `close`.
    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Spawn the worker pool. Workers take events from `inbound` until it is
    /// disconnected or the controller is closed.
    pub fn start(&mut self, inbound: Receiver<Event>, sentinel: Sentinel) -> Result<(), LifecycleError> {
        match self.state {
            State::Idle => {}
            State::Running { .. } => return Err(LifecycleError::AlreadyStarted(self.name.clone())),
            State::Closed => return Err(LifecycleError::AlreadyClosed(self.name.clone())),
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let mut handles = Vec::with_capacity(self.workers);

        for index in 0..self.workers {
            let worker = Worker {
                controller: self.name.clone(),
                index,
                chain: Arc::clone(&self.chain),
                inbound: inbound.clone(),
                shutdown: shutdown_rx.clone(),
                sentinel: sentinel.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", self.name, index))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    drop(shutdown_tx);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    self.state = State::Closed;
                    return Err(LifecycleError::WorkerSpawn {
                        controller: self.name.clone(),
                        source,
                    });
                }
            }
        }

        tracing::info!(
            controller = %self.name,
            workers = self.workers,
            stages = ?self.chain.stage_names(),
            "controller started"
        );
        self.state = State::Running {
            shutdown: shutdown_tx,
            handles,
        };
        Ok(())
    }

    /// Stop the pool: workers finish whatever is already queued, then exit.
    /// Returns once every worker has been joined and every stage finished.
    ///
    /// Closing a controller that was never started is an error and leaves it
    /// startable.
    pub fn close(&mut self) -> Result<ControllerStats, LifecycleError> {
        let (shutdown, handles) = match std::mem::replace(&mut self.state, State::Closed) {
            State::Running { shutdown, handles } => (shutdown, handles),
            State::Idle => {
                self.state = State::Idle;
                return Err(LifecycleError::NotStarted(self.name.clone()));
            }
            State::Closed => return Err(LifecycleError::AlreadyClosed(self.name.clone())),
        };

        tracing::debug!(controller = %self.name, "closing controller");
        drop(shutdown);

        let mut stats = ControllerStats::default();
        let mut panicked = false;
        for handle in handles {
            match handle.join() {
                Ok(worker_stats) => stats.merge(&worker_stats),
                Err(_) => panicked = true,
            }
        }
        self.chain.finish();
        self.stats = stats;

        tracing::info!(
            controller = %self.name,
            received = stats.received,
            delivered = stats.delivered,
            dropped = stats.dropped,
            undeliverable = stats.undeliverable,
            "controller closed"
        );

        if panicked {
            return Err(LifecycleError::WorkerPanicked(self.name.clone()));
        }
        if stats.undeliverable > 0 {
            return Err(LifecycleError::DownstreamClosed {
                controller: self.name.clone(),
                count: stats.undeliverable,
            });
        }
        Ok(stats)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.close() {
                tracing::error!(controller = %self.name, error = %e, "controller dropped while running");
            }
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("chain", &self.chain)
            .field("running", &self.is_running())
            .finish()
    }
}

struct Worker {
    controller: String,
    index: usize,
    chain: Arc<Chain>,
    inbound: Receiver<Event>,
    shutdown: Receiver<()>,
    sentinel: Sentinel,
}

impl Worker {
    fn run(self) -> ControllerStats {
        let mut stats = ControllerStats::default();
        loop {
            select! {
                recv(self.inbound) -> msg => match msg {
                    Ok(event) => self.handle(event, &mut stats),
                    // Every sender is gone and the queue is empty
                    Err(_) => break,
                },
                recv(self.shutdown) -> _ => {
                    while let Ok(event) = self.inbound.try_recv() {
                        self.handle(event, &mut stats);
                    }
                    break;
                }
            }
        }
        tracing::debug!(controller = %self.controller, worker = self.index, received = stats.received, "worker exiting");
        stats
    }

    fn handle(&self, event: Event, stats: &mut ControllerStats) {
        stats.received += 1;
        match self.chain.run(event, &self.sentinel) {
            Outcome::Delivered => stats.delivered += 1,
            Outcome::Dropped => stats.dropped += 1,
            Outcome::Undeliverable(event) => {
                stats.undeliverable += 1;
                tracing::error!(
                    controller = %self.controller,
                    event = %event.to_json().unwrap_or_default(),
                    "next phase closed before this one; event not delivered"
                );
            }
        }
    }
}
