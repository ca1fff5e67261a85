//! Input adapters: sources that push events onto the pipeline's inbound
//! channel.

pub mod lines;

pub use lines::LineInput;

use crate::error::LifecycleError;
use crate::event::Event;
use crossbeam_channel::Sender;

pub trait Input {
    fn name(&self) -> &str;

    /// Begin producing events on `out`. An input starts at most once.
    fn start(&mut self, out: Sender<Event>) -> Result<(), LifecycleError>;

    /// Block until the source is exhausted. Returns the number of events sent.
    fn wait(&mut self) -> Result<usize, LifecycleError>;

    /// Ask the source to stop at its next boundary without waiting for it.
    fn stop(&mut self);

    /// True once the source has stopped producing (or was never started).
    fn is_finished(&self) -> bool;

    /// Stop admitting events and release the outbound channel.
    fn close(&mut self) -> Result<usize, LifecycleError>;
}
