// src/pipeline.rs
pub mod chain;
pub mod config;
pub mod controller;
pub mod stage;

pub use chain::{Chain, ChainBuilder};
pub use config::PipelineConfig;
pub use controller::{Controller, ControllerStats};
pub use stage::{Flow, Outcome, Sentinel, Stage};

use crate::error::{ConfigError, LifecycleError, PipelineError};
use crate::event::Event;
use crate::inputs::Input;
use crossbeam_channel::{bounded, never, select, Receiver, Sender};
use std::time::Duration;

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Counts from both phases after a full shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub filters: ControllerStats,
    pub outputs: ControllerStats,
}

/// Filter phase and output phase joined by a bounded channel.
///
/// ```text
/// input -> [inbound] -> filter controller -> [outbound] -> output controller
/// ```
pub struct Pipeline {
    filters: Controller,
    outputs: Controller,
    channel_capacity: usize,
}

impl Pipeline {
    pub fn new(filters: Controller, outputs: Controller, channel_capacity: usize) -> Self {
        Pipeline {
            filters,
            outputs,
            channel_capacity,
        }
    }

    /// Build and validate every stage. Nothing is started.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let compiler = config.build_compiler()?;
        let filters = Controller::new(
            "filters",
            config.build_filter_chain(&compiler)?,
            config.workers.filters,
        )?;
        let outputs = Controller::new(
            "outputs",
            config.build_output_chain()?,
            config.workers.outputs,
        )?;
        Ok(Self::new(filters, outputs, config.channel_capacity))
    }

    pub fn filters(&self) -> &Controller {
        &self.filters
    }

    pub fn outputs(&self) -> &Controller {
        &self.outputs
    }

    /// Start outputs, then filters. Returns the sender inputs push onto;
    /// the pipeline keeps no copy of it.
    pub fn start(&mut self) -> Result<Sender<Event>, LifecycleError> {
        let (inbound_tx, inbound_rx) = bounded(self.channel_capacity);
        let (outbound_tx, outbound_rx) = bounded(self.channel_capacity);

        self.outputs.start(outbound_rx, Sentinel::end())?;
        if let Err(e) = self.filters.start(inbound_rx, Sentinel::forward(outbound_tx)) {
            if let Err(close_err) = self.outputs.close() {
                tracing::warn!(error = %close_err, "closing outputs after failed start");
            }
            return Err(e);
        }
        Ok(inbound_tx)
    }

    /// Close filters, then outputs. Outputs are closed even when closing the
    /// filters failed; the first error wins.
    pub fn close(&mut self) -> Result<PipelineStats, LifecycleError> {
        let filters = self.filters.close();
        let outputs = self.outputs.close();
        Ok(PipelineStats {
            filters: filters?,
            outputs: outputs?,
        })
    }

    /// Drive `input` to exhaustion and shut down in order: input, filters,
    /// outputs.
    pub fn run(&mut self, input: &mut dyn Input) -> Result<PipelineStats, PipelineError> {
        self.run_until(input, &never())
    }

    /// Like [`Pipeline::run`], but a message (or disconnect) on `shutdown`
    /// stops the input early. Events already admitted are still flushed
    /// through both phases; the input is told to stop and is not waited on,
    /// since it may be blocked reading a source that never ends.
    pub fn run_until(
        &mut self,
        input: &mut dyn Input,
        shutdown: &Receiver<()>,
    ) -> Result<PipelineStats, PipelineError> {
        let inbound = self.start()?;
        if let Err(e) = input.start(inbound) {
            self.close()?;
            return Err(e.into());
        }

        let interrupted = loop {
            select! {
                recv(shutdown) -> _ => break true,
                default(INPUT_POLL_INTERVAL) => {
                    if input.is_finished() {
                        break false;
                    }
                }
            }
        };

        let read = if interrupted {
            tracing::info!(input = input.name(), "shutdown requested, stopping input");
            input.stop();
            None
        } else {
            Some(input.wait())
        };
        let stats = self.close()?;
        if let Some(read) = read {
            let read = read?;
            tracing::info!(input = input.name(), read, "pipeline finished");
        } else {
            tracing::info!(
                input = input.name(),
                written = stats.outputs.delivered,
                "pipeline interrupted"
            );
        }
        Ok(stats)
    }
}
