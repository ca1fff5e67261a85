//! Output adapters. Each is a [`Stage`](crate::pipeline::stage::Stage) run by
//! the output controller; writing is its `process`.

pub mod writer;

pub use writer::JsonLinesOutput;
