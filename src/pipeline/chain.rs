// src/pipeline/chain.rs
use crate::event::Event;
use crate::pipeline::stage::{Flow, Outcome, Sentinel, Stage};

/// An ordered, immutable list of stages.
///
/// Built once with [`ChainBuilder`] and shared read-only by every worker of a
/// controller. The terminal [`Sentinel`] is not part of the chain; it is
/// supplied on each run by the controller that owns it.
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl Chain {
    pub fn builder() -> ChainBuilder {
        ChainBuilder::new()
    }

    /// A chain with no stages: every event goes straight to the sentinel.
    pub fn empty() -> Self {
        Chain { stages: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Move one event through every stage, then through the sentinel.
    pub fn run(&self, event: Event, sentinel: &Sentinel) -> Outcome {
        let mut current = event;
        for stage in &self.stages {
            match stage.process(current) {
                Flow::Continue(next) => current = next,
                Flow::Drop => return Outcome::Dropped,
            }
        }
        sentinel.process(current)
    }

    /// Call `finish` on every stage in order. Failures are logged; the
    /// remaining stages are still finished.
    pub fn finish(&self) -> usize {
        let mut failures = 0;
        for stage in &self.stages {
            if let Err(e) = stage.finish() {
                tracing::error!(stage = stage.name(), error = %e, "stage failed to finish");
                failures += 1;
            }
        }
        failures
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[derive(Default)]
pub struct ChainBuilder {
    stages: Vec<Box<dyn Stage>>,
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn push_boxed(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn build(self) -> Chain {
        Chain {
            stages: self.stages,
        }
    }
}
