//! Filter stages: grok extraction, date normalization and field mutation.

pub mod date;
pub mod grok;
pub mod layout;
pub mod mutate;

pub use date::{DateConfig, DateStage};
pub use grok::{GrokConfig, GrokStage};
pub use mutate::{MutateAction, MutateConfig, MutateStage};

use crate::event::Event;
use crate::pipeline::stage::Flow;
use serde::Deserialize;

/// What a filter does with an event it could not process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Add a failure tag and keep going
    Tag,
    /// Discard the event
    Drop,
    /// Keep going, event untouched
    Pass,
}

impl FailurePolicy {
    pub(crate) fn apply(self, mut event: Event, tag: &str) -> Flow {
        match self {
            FailurePolicy::Tag => {
                event.add_tag(tag);
                Flow::Continue(event)
            }
            FailurePolicy::Drop => Flow::Drop,
            FailurePolicy::Pass => Flow::Continue(event),
        }
    }
}
