// src/inputs/lines.rs
use crate::error::{ConfigError, LifecycleError};
use crate::event::Event;
use crate::inputs::Input;
use crossbeam_channel::Sender;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Reads a text source line by line on its own thread, one event per line.
pub struct LineInput {
    name: String,
    reader: Option<Box<dyn BufRead + Send>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<io::Result<usize>>>,
    sent: usize,
}

impl LineInput {
    pub fn new(name: impl Into<String>, reader: impl BufRead + Send + 'static) -> Self {
        LineInput {
            name: name.into(),
            reader: Some(Box::new(reader)),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            sent: 0,
        }
    }

    pub fn open(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::new(
            format!("file:{}", path.display()),
            BufReader::new(file),
        ))
    }

    pub fn stdin() -> Self {
        Self::new("stdin", BufReader::new(io::stdin()))
    }

    fn join(&mut self) -> Result<usize, LifecycleError> {
        let Some(handle) = self.handle.take() else {
            return Ok(self.sent);
        };
        let sent = handle
            .join()
            .map_err(|_| LifecycleError::WorkerPanicked(self.name.clone()))?
            .map_err(|e| LifecycleError::Input {
                name: self.name.clone(),
                message: e.to_string(),
            })?;
        self.sent = sent;
        tracing::debug!(input = %self.name, sent, "input finished");
        Ok(sent)
    }
}

fn read_lines(
    name: &str,
    mut reader: Box<dyn BufRead + Send>,
    out: Sender<Event>,
    stop: &AtomicBool,
) -> io::Result<usize> {
    let mut sent = 0;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        }
        // Invalid UTF-8 is replaced, not fatal: one bad byte must not end the input
        let line = match String::from_utf8(std::mem::take(&mut buf)) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(input = %name, line = sent + 1, "line is not valid UTF-8; invalid bytes replaced");
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        if out.send(Event::from_line(line)).is_err() {
            tracing::warn!(input = %name, "pipeline closed while input was still reading");
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

impl Input for LineInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, out: Sender<Event>) -> Result<(), LifecycleError> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| LifecycleError::AlreadyStarted(self.name.clone()))?;
        let stop = Arc::clone(&self.stop);
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(format!("input-{}", self.name))
            .spawn(move || read_lines(&name, reader, out, &stop))
            .map_err(|source| LifecycleError::WorkerSpawn {
                controller: self.name.clone(),
                source,
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    fn wait(&mut self) -> Result<usize, LifecycleError> {
        if self.handle.is_none() && self.reader.is_some() {
            return Err(LifecycleError::NotStarted(self.name.clone()));
        }
        self.join()
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Takes effect at the next line boundary; a reader blocked on a
    /// terminal keeps waiting for that line.
    fn close(&mut self) -> Result<usize, LifecycleError> {
        if self.handle.is_none() && self.reader.is_some() {
            return Err(LifecycleError::NotStarted(self.name.clone()));
        }
        self.stop.store(true, Ordering::Relaxed);
        self.join()
    }
}
