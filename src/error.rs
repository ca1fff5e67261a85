/// Errors detected while assembling a pipeline. None of these can occur once
/// workers are running.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown pattern '{name}' referenced from '{referenced_from}'")]
    UnknownPattern {
        name: String,
        referenced_from: String,
    },

    #[error("Cyclic pattern reference: {}", chain.join(" -> "))]
    CyclicPattern { chain: Vec<String> },

    #[error("Invalid expression for pattern '{pattern}': {source}")]
    InvalidExpression {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid pattern name '{0}': use letters, digits and underscores")]
    InvalidPatternName(String),

    #[error("Unknown capture type '{kind}' for capture '{capture}': use int or float")]
    InvalidCaptureType { capture: String, kind: String },

    #[error("Invalid pattern definition at line {line}: {message}")]
    InvalidPatternDefinition { line: usize, message: String },

    #[error("Unknown mutate action '{0}'")]
    UnknownAction(String),

    #[error("Missing required option '{option}' for {stage} stage")]
    MissingOption {
        stage: &'static str,
        option: &'static str,
    },

    #[error("Invalid value for option '{option}' of {stage} stage: {message}")]
    InvalidOption {
        stage: &'static str,
        option: &'static str,
        message: String,
    },

    #[error("Unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("Invalid date layout '{layout}': {message}")]
    InvalidLayout { layout: String, message: String },

    #[error("Worker count must be a positive integer, got {0}")]
    InvalidWorkerCount(usize),

    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("IO error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Per-event failures. Stages turn these into tags, drops or pass-throughs;
/// they never cross a stage boundary as an error.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Field '{0}' is missing")]
    FieldMissing(String),

    #[error("No layout matched value '{value}' of field '{field}'")]
    NoMatchingLayout { field: String, value: String },

    #[error("Write error in output '{output}': {source}")]
    Write {
        output: String,
        #[source]
        source: std::io::Error,
    },
}

/// Misuse of the start/close protocol, or a violation of the shutdown order.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Controller '{0}' was closed before it was started")]
    NotStarted(String),

    #[error("Controller '{0}' is already running")]
    AlreadyStarted(String),

    #[error("Controller '{0}' is already closed")]
    AlreadyClosed(String),

    #[error("Controller '{controller}' could not deliver {count} event(s): downstream phase closed first")]
    DownstreamClosed { controller: String, count: usize },

    #[error("A worker of controller '{0}' panicked")]
    WorkerPanicked(String),

    #[error("Could not spawn worker for controller '{controller}': {source}")]
    WorkerSpawn {
        controller: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input '{name}' failed: {message}")]
    Input { name: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
