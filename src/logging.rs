use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use env_logger::{Builder, Env, Target};

const LOG_FILE: &str = "matslot.log";
const OLD_LOG_FILE: &str = "matslot.old.log";
const ROTATE_BYTES: u64 = 2 * 1024 * 1024;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Writes every line to stderr and to the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Rename the log to `.old` once it grows past 2MB. Returns the active path.
pub fn rotate_if_large(dir: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let log_path = dir.join(LOG_FILE);
    if let Ok(meta) = std::fs::metadata(&log_path) {
        if meta.len() > ROTATE_BYTES {
            std::fs::rename(&log_path, dir.join(OLD_LOG_FILE))?;
        }
    }
    Ok(log_path)
}

/// Install the global logger. Level comes from `RUST_LOG` (default `info`).
/// With `log_dir`, lines are also appended to `matslot.log` there.
pub fn init(log_dir: Option<&Path>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{}] {:<5} {}: {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    let mut file_error = None;
    if let Some(dir) = log_dir {
        let opened = rotate_if_large(dir).and_then(|path| {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            Ok((path, file))
        });
        match opened {
            Ok((path, file)) => {
                builder.target(Target::Pipe(Box::new(Tee { file })));
                let _ = LOG_PATH.set(path);
            }
            Err(e) => file_error = Some(e),
        }
    }

    if builder.try_init().is_err() {
        return;
    }

    log::info!("=== matslot v{} started ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = log_path() {
        log::info!("Log file: {}", path.display());
    }
    if let Some(e) = file_error {
        log::warn!("Logging to stderr only, could not open log file: {}", e);
    }
}

pub fn log_path() -> Option<&'static Path> {
    LOG_PATH.get().map(|p| p.as_path())
}
