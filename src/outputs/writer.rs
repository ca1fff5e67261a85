// src/outputs/writer.rs
use crate::error::{ConfigError, ProcessingError};
use crate::event::Event;
use crate::pipeline::stage::{Flow, Stage};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Writes each event as one JSON object per line.
pub struct JsonLinesOutput {
    name: String,
    writer: Mutex<Box<dyn Write + Send>>,
    pretty: bool,
}

impl JsonLinesOutput {
    pub fn new(name: impl Into<String>, writer: impl Write + Send + 'static, pretty: bool) -> Self {
        JsonLinesOutput {
            name: name.into(),
            writer: Mutex::new(Box::new(writer)),
            pretty,
        }
    }

    pub fn stdout(pretty: bool) -> Self {
        Self::new("stdout", io::stdout(), pretty)
    }

    pub fn file(path: &Path, append: bool) -> Result<Self, ConfigError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::new(
            format!("file:{}", path.display()),
            BufWriter::new(file),
            false,
        ))
    }

    fn write_event(&self, event: &Event) -> Result<(), ProcessingError> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(event)
        } else {
            serde_json::to_string(event)
        }
        .map_err(|e| self.write_error(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{}", encoded).map_err(|e| self.write_error(e))
    }

    fn write_error(&self, source: io::Error) -> ProcessingError {
        ProcessingError::Write {
            output: self.name.clone(),
            source,
        }
    }
}

impl Stage for JsonLinesOutput {
    fn process(&self, event: Event) -> Flow {
        match self.write_event(&event) {
            Ok(()) => Flow::Continue(event),
            Err(e) => {
                tracing::error!(output = %self.name, error = %e, "dropping event");
                Flow::Drop
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn finish(&self) -> Result<(), ProcessingError> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writer.flush().map_err(|e| self.write_error(e))
    }
}
