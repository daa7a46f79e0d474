//! Defines the console logger that writes to standard error.

use std::io::Write;

use log::LevelFilter;
use spin::Once;

pub struct Console {
    level: LevelFilter,
}

static DEFAULT: Once<Console> = Once::new();

impl Console {
    /// Installs the console as the global logger. Only the first call decides
    /// the level.
    pub fn init(level: LevelFilter) -> Result<&'static Self, log::SetLoggerError> {
        let console = DEFAULT.call_once(|| Console { level });
        console.install()?;
        Ok(console)
    }

    fn install(&'static self) -> Result<(), log::SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.level);
        Ok(())
    }

    /// Maps the number of `-v` flags to a level.
    pub fn level_for(verbosity: u8) -> LevelFilter {
        match verbosity {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

impl log::Log for Console {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        // Nowhere to report a failed write to stderr.
        let _ = write_log_entry_to(&mut stderr, record);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn write_log_entry_to(writer: &mut impl Write, record: &log::Record) -> std::io::Result<()> {
    #[cfg(feature = "detailed-logging")]
    return writeln!(
        writer,
        "[{} {}:{} {}] {}",
        record.level(),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.target(),
        record.args()
    );
    #[cfg(not(feature = "detailed-logging"))]
    return writeln!(writer, "[{:5} {}] {}", record.level(), record.target(), record.args());
}
