//! Per-topic output sinks.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::error::{Error, Result};

/// Where the output of every topic goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    Discard,
    /// One file per topic, named after the topic
    Directory(PathBuf),
}

impl OutputTarget {
    /// Interpret `--output-dir`: unset prints to stdout, an empty value
    /// discards the output.
    pub fn from_arg(dir: Option<&str>) -> Self {
        match dir.map(str::trim) {
            None => OutputTarget::Stdout,
            Some("") => OutputTarget::Discard,
            Some(dir) => OutputTarget::Directory(PathBuf::from(dir)),
        }
    }
}

enum Output {
    Stdout(io::Stdout),
    File { path: PathBuf, writer: BufWriter<File> },
    Writer(Box<dyn Write + Send>),
    Discard,
}

/// The output of one topic. Every event is written followed by a newline.
pub struct Sink {
    output: Output,
}

impl Sink {
    pub fn stdout() -> Self {
        Self {
            output: Output::Stdout(io::stdout()),
        }
    }

    pub fn discard() -> Self {
        Self {
            output: Output::Discard,
        }
    }

    /// Create (or truncate) `path`.
    pub fn create_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            output: Output::File {
                path,
                writer: BufWriter::new(file),
            },
        })
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            output: Output::Writer(writer),
        }
    }

    pub fn write_event(&mut self, output: &[u8]) -> io::Result<()> {
        match &mut self.output {
            Output::Stdout(stdout) => {
                let mut lock = stdout.lock();
                lock.write_all(output)?;
                lock.write_all(b"\n")?;
                lock.flush()
            }
            Output::File { writer, .. } => {
                writer.write_all(output)?;
                writer.write_all(b"\n")
            }
            Output::Writer(writer) => {
                writer.write_all(output)?;
                writer.write_all(b"\n")
            }
            Output::Discard => Ok(()),
        }
    }

    /// Flush buffered output; files are also synced to disk.
    pub fn close(self) -> io::Result<()> {
        match self.output {
            Output::Stdout(stdout) => stdout.lock().flush(),
            Output::File { path, writer } => {
                let file = writer.into_inner().map_err(|e| e.into_error())?;
                file.sync_all()?;
                debug!("Closed output file {}", path.display());
                Ok(())
            }
            Output::Writer(mut writer) => writer.flush(),
            Output::Discard => Ok(()),
        }
    }
}

/// One [`Sink`] per subscribed topic.
#[derive(Default)]
pub struct Sinks {
    sinks: HashMap<String, Sink>,
}

impl Sinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a sink for every topic. A target directory is created if it
    /// doesn't exist; existing topic files are truncated.
    pub fn open<'a>(
        target: &OutputTarget,
        topics: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        if let OutputTarget::Directory(dir) = target {
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!(
                    "Failed to create the output directory {}: {e}",
                    dir.display()
                ))
            })?;
        }

        let mut sinks = Self::new();
        for topic in topics {
            let sink = match target {
                OutputTarget::Stdout => Sink::stdout(),
                OutputTarget::Discard => Sink::discard(),
                OutputTarget::Directory(dir) => {
                    let path = dir.join(topic);
                    Sink::create_file(&path).map_err(|e| {
                        Error::Config(format!("Failed to create {}: {e}", path.display()))
                    })?
                }
            };
            sinks.insert(topic, sink);
        }
        Ok(sinks)
    }

    pub fn insert(&mut self, topic: impl Into<String>, sink: Sink) {
        self.sinks.insert(topic.into(), sink);
    }

    /// Write one event's output to the sink of `topic`.
    pub fn write(&mut self, topic: &str, output: &[u8]) -> Result<()> {
        let sink = self
            .sinks
            .get_mut(topic)
            .ok_or_else(|| Error::UnknownTopic(topic.to_string()))?;
        sink.write_event(output).map_err(|source| Error::Sink {
            topic: topic.to_string(),
            source,
        })
    }

    /// Finalize every sink. All sinks are closed even when some fail; the
    /// first failure is returned.
    pub fn close(self) -> Result<()> {
        let mut first = None;
        for (topic, sink) in self.sinks {
            if let Err(source) = sink.close() {
                error!("Failed to close the output of topic {topic}: {source}");
                first.get_or_insert(Error::Sink { topic, source });
            }
        }
        first.map_or(Ok(()), Err)
    }
}
