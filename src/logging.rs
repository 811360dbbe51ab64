use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::time::SystemTime;

/// Installs the global logger. Must run once, before the server accepts
/// connections; handlers only emit records afterwards.
pub fn setup_logging(enabled: bool) {
    let mut builder = Builder::new();
    if enabled {
        builder
            .filter_level(LevelFilter::Info) // Set default level
            .parse_env("RUST_LOG"); // Allow override through env var
    } else {
        builder.filter_level(LevelFilter::Off);
    }

    builder
        .format(|buf, record| {
            let timestamp = humantime::format_rfc3339_millis(SystemTime::now());
            let level = record.level();

            if atty::is(atty::Stream::Stderr) {
                let level_color = match level {
                    log::Level::Error => "\x1B[31m", // Red
                    log::Level::Warn => "\x1B[33m",  // Yellow
                    log::Level::Info => "\x1B[32m",  // Green
                    log::Level::Debug => "\x1B[36m", // Cyan
                    log::Level::Trace => "\x1B[35m", // Magenta
                };
                write!(buf, "{}{:>5}\x1B[0m [{}] {}", level_color, level, timestamp, record.args())?;
            } else {
                write!(buf, "{:>5} [{}] {}", level, timestamp, record.args())?;
            }

            // Only include file and line for debug/trace levels
            if level >= log::Level::Debug {
                write!(
                    buf,
                    " - {}:{}",
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0)
                )?;
            }
            writeln!(buf)
        })
        .init();
}

#[macro_export]
macro_rules! log_request {
    ($method:expr, $path:expr) => {
        log::info!("→ {} {}", $method, $path)
    };
}

#[macro_export]
macro_rules! log_response {
    ($status:expr, $duration:expr, $bytes:expr) => {
        log::info!("← {} ({:?}) - Sent: {} bytes", $status, $duration, $bytes)
    };
}

#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        log::error!("❌ {} - {}", $context, $error)
    };
}
