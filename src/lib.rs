// src/lib.rs
pub mod error;
pub mod event;
pub mod filters;
pub mod grok;
pub mod inputs;
pub mod outputs;
pub mod pipeline;

pub use error::*;
pub use event::{Event, Value, MESSAGE_FIELD};

pub use filters::{FailurePolicy, DateStage, GrokStage, MutateAction, MutateStage};
pub use grok::{CompiledMatcher, Compiler, PatternRegistry};
pub use inputs::{Input, LineInput};
pub use outputs::JsonLinesOutput;
pub use pipeline::config::PipelineConfig;
pub use pipeline::{
    Chain, ChainBuilder, Controller, ControllerStats, Flow, Outcome, Pipeline, PipelineStats,
    Sentinel, Stage,
};
