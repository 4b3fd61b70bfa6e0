//! # Publish Sinks
//!
//! Destinations for published deltas.
//!
//! - [`LineSink`] writes one JSON delta per line to any writer (stdout when
//!   running as a Signal K provider)
//! - [`RotatingJsonlSink`] records deltas to JSONL files, starting a new file
//!   every N records and keeping only the last M files

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::delta::Delta;
use crate::error::Result;

/// File name prefix of recorded delta files
const FILE_PREFIX: &str = "deltas_";

/// File name extension of recorded delta files
const FILE_EXTENSION: &str = "jsonl";

/// Destination for published deltas
pub trait TelemetrySink: Send {
    /// Publish one delta
    fn publish(&mut self, delta: &Delta) -> Result<()>;

    /// Flush buffered output
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes each delta as a JSON line
pub struct LineSink<W: Write + Send> {
    writer: W,
}

impl LineSink<io::Stdout> {
    /// Sink on stdout, the input of a Signal K execute provider
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consume the sink and return the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TelemetrySink for LineSink<W> {
    fn publish(&mut self, delta: &Delta) -> Result<()> {
        serde_json::to_writer(&mut self.writer, delta)?;
        self.writer.write_all(b"\n")?;
        // the consumer reads line by line
        self.writer.flush()?;
        Ok(())
    }
}

/// Records deltas to rotating JSONL files
pub struct RotatingJsonlSink {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    current: Option<BufWriter<File>>,
    records_in_file: usize,
    files_opened: u64,
}

impl std::fmt::Debug for RotatingJsonlSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingJsonlSink")
            .field("dir", &self.dir)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl RotatingJsonlSink {
    /// Create a recorder writing into `dir` (created if missing).
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Recording deltas to {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            current: None,
            records_in_file: 0,
            files_opened: 0,
        })
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut old) = self.current.take() {
            old.flush()?;
        }

        let name = format!(
            "{}{}_{:06}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%dT%H%M%S"),
            self.files_opened,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        debug!("Opening delta record file {}", path.display());

        self.current = Some(BufWriter::new(File::create(&path)?));
        self.records_in_file = 0;
        self.files_opened += 1;

        self.prune()
    }

    /// Delete the oldest record files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files = recorded_files(&self.dir)?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old record file {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

/// Record files in `dir`, unordered
fn recorded_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_record = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_EXTENSION))
            .unwrap_or(false);
        if is_record {
            files.push(path);
        }
    }
    Ok(files)
}

impl TelemetrySink for RotatingJsonlSink {
    fn publish(&mut self, delta: &Delta) -> Result<()> {
        if self.current.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.current.as_mut() {
            serde_json::to_writer(&mut *writer, delta)?;
            writer.write_all(b"\n")?;
            self.records_in_file += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.current.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl Drop for RotatingJsonlSink {
    fn drop(&mut self) {
        if let Err(e) = TelemetrySink::flush(self) {
            warn!("Failed to flush delta records: {}", e);
        }
    }
}
