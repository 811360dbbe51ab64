use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::args::Args;
use crate::error::ConfigError;
use crate::locator::ArchiveLocator;
use crate::relay::Relay;

/// Process-wide settings, fixed once the server starts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub locator: ArchiveLocator,
    pub relay: Relay,
    pub zip_program: PathBuf,
    pub index_path: PathBuf,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub zstd_level: i32,
    pub gzip_level: u32,
}

impl ServerConfig {
    /// Validates the archive root and builds a config with default settings
    /// for everything else.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Ok(Self {
            locator: ArchiveLocator::new(root)?,
            relay: Relay::default(),
            zip_program: PathBuf::from("zip"),
            index_path: PathBuf::from("index.html"),
            read_timeout: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(60)),
            zstd_level: 3,
            gzip_level: 6,
        })
    }

    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let chunk_size = usize::try_from(args.chunk_size).unwrap_or(usize::MAX);
        let mut config = Self::new(&args.root)?;
        config.relay = Relay::new(chunk_size, args.delay)?;
        config.zip_program = args.zip_program.clone();
        config.index_path = args.index.clone();
        config.read_timeout = (!args.read_timeout.is_zero()).then_some(args.read_timeout);
        config.write_timeout = (!args.write_timeout.is_zero()).then_some(args.write_timeout);
        config.zstd_level = args.zstd_level;
        config.gzip_level = args.gzip_level;

        log::info!("Serving archives from: {}", config.locator.root().display());
        match config.relay.pacing() {
            Some(delay) => log::info!(
                "Chunk size {} bytes, pacing {}",
                config.relay.chunk_size(),
                humantime::format_duration(delay)
            ),
            None => log::info!("Chunk size {} bytes, no pacing", config.relay.chunk_size()),
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn missing_root_fails_fast() {
        let args = Args::parse_from(["zipdrop", "--root", "/definitely/not/here"]);
        let err = ServerConfig::from_args(&args).unwrap_err();
        assert!(matches!(err, ConfigError::RootMissing(_)));
    }

    #[test]
    fn zero_delay_disables_pacing() {
        let root = tempfile::tempdir().unwrap();
        let root_arg = root.path().to_str().unwrap();
        let args = Args::parse_from(["zipdrop", "--root", root_arg, "--delay", "0s"]);
        let config = ServerConfig::from_args(&args).unwrap();
        assert_eq!(config.relay.pacing(), None);
    }

    #[test]
    fn args_flow_into_config() {
        let root = tempfile::tempdir().unwrap();
        let root_arg = root.path().to_str().unwrap();
        let args = Args::parse_from([
            "zipdrop",
            "--root",
            root_arg,
            "--delay",
            "20ms",
            "--chunk-size",
            "64",
            "--zip-program",
            "/usr/local/bin/zip",
            "--read-timeout",
            "0s",
        ]);
        let config = ServerConfig::from_args(&args).unwrap();
        assert_eq!(config.relay.chunk_size(), 64);
        assert_eq!(config.relay.pacing(), Some(Duration::from_millis(20)));
        assert_eq!(config.zip_program, PathBuf::from("/usr/local/bin/zip"));
        assert_eq!(config.read_timeout, None);
        assert_eq!(config.write_timeout, Some(Duration::from_secs(60)));
    }
}
