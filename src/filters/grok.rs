// src/filters/grok.rs
use crate::error::ConfigError;
use crate::event::Event;
use crate::filters::FailurePolicy;
use crate::grok::{CompiledMatcher, Compiler};
use crate::pipeline::stage::{Flow, Stage};
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_FAILURE_TAG: &str = "_grokparsefailure";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrokConfig {
    /// Root expression with `%{NAME:capture}` placeholders
    pub pattern: String,
    pub on_failure: FailurePolicy,
    /// Match this field instead of the raw line
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Extracts fields from the raw line with a compiled grok expression.
pub struct GrokStage {
    name: String,
    matcher: Arc<CompiledMatcher>,
    source: Option<String>,
    on_failure: FailurePolicy,
    tag: String,
}

impl GrokStage {
    pub fn new(config: &GrokConfig, compiler: &Compiler) -> Result<Self, ConfigError> {
        if config.pattern.is_empty() {
            return Err(ConfigError::MissingOption {
                stage: "grok",
                option: "pattern",
            });
        }
        let matcher = compiler.compile(&config.pattern)?;
        Ok(GrokStage {
            name: "grok".to_string(),
            matcher,
            source: config.source.clone(),
            on_failure: config.on_failure,
            tag: config
                .tag
                .clone()
                .unwrap_or_else(|| DEFAULT_FAILURE_TAG.to_string()),
        })
    }

    pub fn matcher(&self) -> &CompiledMatcher {
        &self.matcher
    }

    /// Merge captures into the event. Returns false when there was nothing
    /// to match or the expression did not match.
    pub fn extract(&self, event: &mut Event) -> bool {
        let text = match &self.source {
            Some(field) => event.get_str(field),
            None => event.raw(),
        };
        let captures = match text.and_then(|text| self.matcher.captures(text)) {
            Some(captures) => captures,
            None => return false,
        };
        event.fields.extend(captures);
        true
    }
}

impl Stage for GrokStage {
    fn process(&self, mut event: Event) -> Flow {
        if self.extract(&mut event) {
            return Flow::Continue(event);
        }
        tracing::debug!(stage = %self.name, policy = ?self.on_failure, "grok pattern did not match");
        self.on_failure.apply(event, &self.tag)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
