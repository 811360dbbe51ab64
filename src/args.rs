use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Stream folders as ZIP archives over HTTP", long_about = None)]
pub struct Args {
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Directory holding one sub-folder per archive
    #[arg(short, long, default_value = "photos")]
    pub root: PathBuf,

    /// Pause after every chunk sent, e.g. `100ms` or `1s`
    #[arg(short, long, value_parser = parse_duration)]
    pub delay: Option<Duration>,

    #[arg(short, long, default_value = "250", value_parser = clap::value_parser!(u64).range(1..))]
    pub chunk_size: u64,

    #[arg(long, default_value = "zip")]
    pub zip_program: PathBuf,

    #[arg(short, long, default_value = "index.html")]
    pub index: PathBuf,

    /// Drop a client that has not sent its request head within this long
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub read_timeout: Duration,

    /// Give up on a client that accepts no data for this long
    #[arg(long, default_value = "60s", value_parser = parse_duration)]
    pub write_timeout: Duration,

    #[arg(long)]
    pub no_logging: bool,

    #[arg(short, long, default_value = "3")]
    pub zstd_level: i32,

    #[arg(short, long, default_value = "6")]
    pub gzip_level: u32,
}

fn parse_duration(value: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(value.trim())
}
