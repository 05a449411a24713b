//! Rolling Logger
//!
//! File logger for the front end. Writes through a `tracing_subscriber::fmt`
//! subscriber into `<dir>/<app>.log`, rotates past a size limit and keeps the
//! most recent lines in memory so they can be shown without reading the file.
//!
//! Records emitted with the `log` facade reach the same file through
//! tracing-subscriber's log bridge.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("log file error: {0}")]
    Io(#[from] io::Error),
    #[error("logger already initialized")]
    AlreadyInitialized,
    #[error("logger not initialized")]
    NotInitialized,
}

/// Rotation and buffering limits
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Rotate once the active file grows past this many bytes
    pub max_file_bytes: u64,
    /// Number of rotated files kept next to the active one
    pub max_files: usize,
    /// Lines kept in the in-memory circular buffer
    pub buffer_lines: usize,
    pub level: log::LevelFilter,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 1024 * 1024,
            max_files: 3,
            buffer_lines: 500,
            level: log::LevelFilter::Info,
        }
    }
}

// ========================
// Rolling File
// ========================

/// Size-rotated log file plus a circular buffer of its latest lines
pub struct RollingFile {
    path: PathBuf,
    file: File,
    written: u64,
    recent: VecDeque<String>,
    partial: String,
    config: LoggerConfig,
}

impl RollingFile {
    pub fn open(dir: impl AsRef<Path>, app_name: &str, config: LoggerConfig) -> Result<Self, LoggerError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.log", app_name));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            recent: VecDeque::with_capacity(config.buffer_lines),
            partial: String::new(),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines currently held in the circular buffer, oldest first
    pub fn recent_lines(&self) -> Vec<String> {
        self.recent.iter().cloned().collect()
    }

    fn rotated_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    /// Shift `app.log.N-1 -> app.log.N`, ..., `app.log -> app.log.1`
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.config.max_files == 0 {
            self.file = OpenOptions::new().create(true).write(true).truncate(true).open(&self.path)?;
            self.written = 0;
            return Ok(());
        }
        let oldest = self.rotated_path(self.config.max_files);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.config.max_files).rev() {
            let from = self.rotated_path(index);
            if from.exists() {
                fs::rename(&from, self.rotated_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.rotated_path(1))?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;
        Ok(())
    }

    fn remember(&mut self, buf: &[u8]) {
        if self.config.buffer_lines == 0 {
            return;
        }
        self.partial.push_str(&String::from_utf8_lossy(buf));
        while let Some(end) = self.partial.find('\n') {
            let line: String = self.partial.drain(..=end).collect();
            if self.recent.len() == self.config.buffer_lines {
                self.recent.pop_front();
            }
            self.recent.push_back(line.trim_end().to_string());
        }
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.config.max_file_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        self.remember(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Cloneable writer handed to the tracing subscriber
#[derive(Clone)]
pub struct RollingHandle(Arc<Mutex<RollingFile>>);

impl Write for RollingHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.0.lock().map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self.0.lock().map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        file.flush()
    }
}

// ========================
// Global Logger
// ========================

static LOGGER: OnceLock<RollingHandle> = OnceLock::new();

/// Initialize logging into `<dir>/<app_name>.log` with default limits
pub fn init_logger(dir: impl AsRef<Path>, app_name: &str) -> Result<(), LoggerError> {
    init_logger_with(dir, app_name, LoggerConfig::default())
}

pub fn init_logger_with(dir: impl AsRef<Path>, app_name: &str, config: LoggerConfig) -> Result<(), LoggerError> {
    if LOGGER.get().is_some() {
        return Err(LoggerError::AlreadyInitialized);
    }
    let level = to_tracing_level(config.level);
    let handle = RollingHandle(Arc::new(Mutex::new(RollingFile::open(dir, app_name, config)?)));
    LOGGER.set(handle.clone()).map_err(|_| LoggerError::AlreadyInitialized)?;

    let writer = handle.clone();
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(level)
        .with_writer(move || writer.clone())
        .try_init()
        .map_err(|_| LoggerError::AlreadyInitialized)?;

    tracing::info!("logger initialized for {}", app_name);
    Ok(())
}

fn to_tracing_level(level: log::LevelFilter) -> LevelFilter {
    match level {
        log::LevelFilter::Off => LevelFilter::OFF,
        log::LevelFilter::Error => LevelFilter::ERROR,
        log::LevelFilter::Warn => LevelFilter::WARN,
        log::LevelFilter::Info => LevelFilter::INFO,
        log::LevelFilter::Debug => LevelFilter::DEBUG,
        log::LevelFilter::Trace => LevelFilter::TRACE,
    }
}

pub fn info(msg: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::info!("{}", msg);
    Ok(())
}

pub fn error(msg: &str) -> Result<(), LoggerError> {
    LOGGER.get().ok_or(LoggerError::NotInitialized)?;
    tracing::error!("{}", msg);
    Ok(())
}

/// Most recent log lines, oldest first. Empty before initialization.
pub fn recent_lines() -> Vec<String> {
    LOGGER
        .get()
        .and_then(|handle| handle.0.lock().ok().map(|file| file.recent_lines()))
        .unwrap_or_default()
}

/// Timestamp prefix for lines written outside the subscriber (e.g. stderr)
pub fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}
