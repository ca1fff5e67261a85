// src/pipeline/config.rs
use crate::error::ConfigError;
use crate::filters::{DateConfig, DateStage, GrokConfig, GrokStage, MutateConfig, MutateStage};
use crate::grok::{Compiler, PatternRegistry};
use crate::outputs::JsonLinesOutput;
use crate::pipeline::chain::{Chain, ChainBuilder};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Whole-pipeline configuration, usually loaded from YAML.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Extra grok patterns; these override builtins and pattern files
    #[serde(default)]
    pub patterns: IndexMap<String, String>,
    /// Pattern-definition files, relative to the config file's directory
    #[serde(default)]
    pub pattern_files: Vec<PathBuf>,
    /// Written as single-key maps: `- grok: {...}`
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub filters: Vec<FilterConfig>,
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub outputs: Vec<OutputConfig>,
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkersConfig {
    #[serde(default = "default_workers")]
    pub filters: usize,
    #[serde(default = "default_workers")]
    pub outputs: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        WorkersConfig {
            filters: DEFAULT_WORKERS,
            outputs: DEFAULT_WORKERS,
        }
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

/// One filter stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterConfig {
    Grok(GrokConfig),
    Date(DateConfig),
    Mutate(MutateConfig),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputConfig {
    Stdout(StdoutConfig),
    File(FileConfig),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdoutConfig {
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub append: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            workers: WorkersConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            patterns: IndexMap::new(),
            pattern_files: Vec::new(),
            filters: Vec::new(),
            outputs: Vec::new(),
            base_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Builtins, then pattern files in order, then inline patterns.
    pub fn build_compiler(&self) -> Result<Compiler, ConfigError> {
        let mut registry = PatternRegistry::with_builtins();
        for file in &self.pattern_files {
            let path = self.resolve(file);
            let loaded = registry.load_file(&path)?;
            tracing::debug!(path = %path.display(), loaded, "loaded pattern file");
        }
        for (name, expression) in &self.patterns {
            registry.define(name, expression)?;
        }
        Ok(Compiler::new(registry))
    }

    pub fn build_filter_chain(&self, compiler: &Compiler) -> Result<Chain, ConfigError> {
        let mut builder = ChainBuilder::new();
        for filter in &self.filters {
            match filter {
                FilterConfig::Grok(cfg) => builder.push_boxed(Box::new(GrokStage::new(cfg, compiler)?)),
                FilterConfig::Date(cfg) => builder.push_boxed(Box::new(DateStage::new(cfg)?)),
                FilterConfig::Mutate(cfg) => builder.push_boxed(Box::new(MutateStage::new(cfg)?)),
            }
        }
        Ok(builder.build())
    }

    /// Opens every output. With no outputs configured, events go to stdout.
    pub fn build_output_chain(&self) -> Result<Chain, ConfigError> {
        if self.outputs.is_empty() {
            return Ok(Chain::builder().stage(JsonLinesOutput::stdout(false)).build());
        }
        let mut builder = ChainBuilder::new();
        for output in &self.outputs {
            match output {
                OutputConfig::Stdout(cfg) => {
                    builder.push_boxed(Box::new(JsonLinesOutput::stdout(cfg.pretty)))
                }
                OutputConfig::File(cfg) => builder.push_boxed(Box::new(JsonLinesOutput::file(
                    &self.resolve(&cfg.path),
                    cfg.append,
                )?)),
            }
        }
        Ok(builder.build())
    }

    /// Check everything that can fail at startup without opening outputs.
    /// Returns the number of filter stages.
    pub fn validate(&self) -> Result<usize, ConfigError> {
        for count in [self.workers.filters, self.workers.outputs] {
            if count == 0 {
                return Err(ConfigError::InvalidWorkerCount(count));
            }
        }
        for output in &self.outputs {
            if let OutputConfig::File(cfg) = output {
                if cfg.path.as_os_str().is_empty() {
                    return Err(ConfigError::MissingOption {
                        stage: "file",
                        option: "path",
                    });
                }
            }
        }
        let compiler = self.build_compiler()?;
        Ok(self.build_filter_chain(&compiler)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Value;
    use crate::filters::FailurePolicy;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_yaml_str("filters: []").unwrap();
        assert_eq!(config.workers.filters, 10);
        assert_eq!(config.workers.outputs, 10);
        assert_eq!(config.channel_capacity, 64);
        assert!(config.outputs.is_empty());
    }

    #[test]
    fn test_stage_kinds_parse() {
        let yaml = r#"
workers: { filters: 2 }
filters:
  - grok: { pattern: "%{WORD:w}", on_failure: drop }
  - date: { field: ts, patterns: [ISO8601], on_failure: pass }
  - mutate: { action: remove_field, fields: [ts] }
outputs:
  - stdout: { pretty: true }
  - file: { path: out.jsonl, append: true }
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.workers.filters, 2);
        assert_eq!(config.workers.outputs, 10);
        assert!(matches!(config.filters[0], FilterConfig::Grok(_)));
        assert!(matches!(config.filters[1], FilterConfig::Date(_)));
        assert!(matches!(config.filters[2], FilterConfig::Mutate(_)));
        assert!(matches!(&config.outputs[1], OutputConfig::File(f) if f.append));
        assert_eq!(config.validate().unwrap(), 3);
    }

    #[test]
    fn test_single_key_map_stages_keep_operands() {
        let yaml = r#"
filters:
  - mutate:
      action: add_field
      values: { env: prod, retries: 3, sampled: true }
  - grok:
      pattern: "%{INT:n}"
      on_failure: tag
      tag: bad_number
outputs:
  - stdout: {}
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        match &config.filters[0] {
            FilterConfig::Mutate(cfg) => {
                assert_eq!(cfg.values.get("env"), Some(&Value::from("prod")));
                assert_eq!(cfg.values.get("retries"), Some(&Value::Integer(3)));
                assert_eq!(cfg.values.get("sampled"), Some(&Value::Bool(true)));
            }
            other => panic!("expected mutate, got {:?}", other),
        }
        match &config.filters[1] {
            FilterConfig::Grok(cfg) => {
                assert_eq!(cfg.on_failure, FailurePolicy::Tag);
                assert_eq!(cfg.tag.as_deref(), Some("bad_number"));
            }
            other => panic!("expected grok, got {:?}", other),
        }
        assert!(matches!(&config.outputs[0], OutputConfig::Stdout(s) if !s.pretty));
    }

    #[test]
    fn test_unknown_stage_kind_rejected() {
        assert!(matches!(
            PipelineConfig::from_yaml_str("filters:\n  - geoip: { field: ip }\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(matches!(
            PipelineConfig::from_yaml_str("filterz: []"),
            Err(ConfigError::Parse(_))
        ));
        assert!(PipelineConfig::from_yaml_str(
            "filters:\n  - grok: { pattern: x, on_failure: tag, colour: red }\n"
        )
        .is_err());
    }

    #[test]
    fn test_missing_failure_policy_rejected() {
        assert!(PipelineConfig::from_yaml_str("filters:\n  - grok: { pattern: x }\n").is_err());
    }

    #[test]
    fn test_inline_patterns_override_builtins() {
        let yaml = r#"
patterns:
  WORD: "[a-z]+"
  GREETING: "%{WORD:word}!"
"#;
        let config = PipelineConfig::from_yaml_str(yaml).unwrap();
        let compiler = config.build_compiler().unwrap();
        let matcher = compiler.compile("%{GREETING}").unwrap();
        assert!(matcher.is_match("hello!"));
        assert!(!matcher.is_match("Hello!"));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = PipelineConfig::from_yaml_str("workers: { outputs: 0 }").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWorkerCount(0))
        ));
    }
}
