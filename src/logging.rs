//! Console and rotating-file logging behind the `log` facade.
//!
//! [`init`] is called once at process start and returns a [`LogGuard`]; the
//! guard flushes both sinks when it is dropped at the end of `run()`.
//!
//! Threshold resolution: `RUST_LOG` when set, then `LOG_LEVEL`, then
//! `logging.level` from the config file, then `info` for this crate.

use std::{
    env,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, OnceLock},
};

use anyhow::{Context, Result};
use env_logger::{Target, WriteStyle};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

const CRATE_TARGET: &str = "facturas_etl";

static SINK: OnceLock<SharedFile> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub directory: PathBuf,
    pub file_name: String,
    pub max_bytes: u64,
    pub backups: usize,
    pub level: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "etl.log".to_string(),
            max_bytes: 10 * 1024 * 1024,
            backups: 5,
            level: None,
        }
    }
}

impl LogConfig {
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Size-capped log file. Once a write would push the file past `max_bytes`
/// it is renamed to `<name>.1`, older backups shift up to `<name>.<backups>`
/// and the oldest is discarded.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: usize,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            written,
            max_bytes,
            backups,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.backups > 0 {
            let oldest = self.backup_path(self.backups);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for index in (1..self.backups).rev() {
                let from = self.backup_path(index);
                if from.exists() {
                    fs::rename(&from, self.backup_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let incoming = buf.len() as u64;
        if self.max_bytes > 0 && self.written > 0 && self.written + incoming > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += incoming;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

#[derive(Debug, Clone)]
struct SharedFile(Arc<Mutex<RotatingFile>>);

impl SharedFile {
    fn with<T>(&self, f: impl FnOnce(&mut RotatingFile) -> io::Result<T>) -> io::Result<T> {
        let mut file = self
            .0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        f(&mut file)
    }
}

/// Duplicates every formatted record to stderr and the log file.
struct TeeWriter {
    file: SharedFile,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.with(|file| file.write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.with(|file| file.flush())
    }
}

/// Keeps the logging sinks alive; flushes them on drop.
#[must_use = "dropping the guard flushes and detaches the log file"]
pub struct LogGuard {
    file: SharedFile,
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        log::logger().flush();
        let _ = self.file.with(|file| file.flush());
    }
}

pub fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(LevelFilter::Warn),
        "critical" | "fatal" => Some(LevelFilter::Error),
        other => LevelFilter::from_str(other).ok(),
    }
}

fn resolve_level(config: &LogConfig) -> LevelFilter {
    env::var("LOG_LEVEL")
        .ok()
        .and_then(|raw| parse_level(&raw))
        .or_else(|| config.level.as_deref().and_then(parse_level))
        .unwrap_or(LevelFilter::Info)
}

/// Installs the process logger. Repeated calls reuse the first sink.
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    if let Some(file) = SINK.get() {
        return Ok(LogGuard { file: file.clone() });
    }

    fs::create_dir_all(&config.directory)
        .with_context(|| format!("Creating log directory {:?}", config.directory))?;
    let path = config.file_path();
    let rotating = RotatingFile::open(&path, config.max_bytes, config.backups)
        .with_context(|| format!("Opening log file {path:?}"))?;
    let file = SINK
        .get_or_init(|| SharedFile(Arc::new(Mutex::new(rotating))))
        .clone();

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if env::var("RUST_LOG").is_err() {
        builder.filter_module(CRATE_TARGET, resolve_level(config));
    }
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}:{} - {}",
                buf.timestamp_millis(),
                record.target(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .write_style(WriteStyle::Never)
        .target(Target::Pipe(Box::new(TeeWriter { file: file.clone() })));
    let _ = builder.try_init();
    Ok(LogGuard { file })
}
