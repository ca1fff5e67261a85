// src/pipeline/stage.rs
use crate::error::ProcessingError;
use crate::event::Event;
use crossbeam_channel::{SendError, Sender};

/// What a stage decided about the event it was handed.
#[derive(Debug)]
pub enum Flow {
    /// Pass the (possibly modified) event to the next stage
    Continue(Event),
    /// The event is discarded on purpose; traversal stops
    Drop,
}

/// How an event left a chain.
#[derive(Debug)]
pub enum Outcome {
    /// The sentinel handed it to the next phase
    Delivered,
    /// A stage dropped it
    Dropped,
    /// The next phase was already closed; the event is returned
    Undeliverable(Event),
}

/// One processing step of a chain.
///
/// Stages are shared by every worker of a controller, so `process` takes
/// `&self`: anything that changes per event lives on the event.
pub trait Stage: Send + Sync {
    fn process(&self, event: Event) -> Flow;
    fn name(&self) -> &str;
    /// Called once after all workers have exited.
    fn finish(&self) -> Result<(), ProcessingError> {
        Ok(())
    }
}

/// Terminal step of a chain, bound when a controller starts.
#[derive(Debug, Clone)]
pub enum Sentinel {
    /// Send the event on to the next phase's inbound channel
    Forward(Sender<Event>),
    /// Last phase: the output stages already did the work
    End,
}

impl Sentinel {
    pub fn forward(sender: Sender<Event>) -> Self {
        Sentinel::Forward(sender)
    }

    pub fn end() -> Self {
        Sentinel::End
    }

    /// Perform the phase transition. Blocks while the next phase is full.
    pub fn process(&self, event: Event) -> Outcome {
        match self {
            Sentinel::Forward(sender) => match sender.send(event) {
                Ok(()) => Outcome::Delivered,
                Err(SendError(event)) => Outcome::Undeliverable(event),
            },
            Sentinel::End => Outcome::Delivered,
        }
    }
}
