use percent_encoding::percent_decode_str;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use crate::error::{ConfigError, LocateError};

/// A folder ready to be archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFolder {
    pub path: PathBuf,
    /// Names of the folder's direct children, sorted.
    pub entries: Vec<OsString>,
}

/// Maps archive identifiers to folders under a fixed root.
#[derive(Debug, Clone)]
pub struct ArchiveLocator {
    root: PathBuf,
}

impl ArchiveLocator {
    /// Canonicalizes `root` and checks that it is a readable directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ConfigError::RootMissing(root.to_path_buf()),
            _ => ConfigError::RootUnreadable {
                path: root.to_path_buf(),
                source: e,
            },
        })?;

        if !canonical.is_dir() {
            return Err(ConfigError::RootNotDirectory(root.to_path_buf()));
        }

        fs::read_dir(&canonical).map_err(|e| ConfigError::RootUnreadable {
            path: root.to_path_buf(),
            source: e,
        })?;

        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a raw (still percent-encoded) path segment to a folder.
    pub fn resolve(&self, raw_identifier: &str) -> Result<ResolvedFolder, LocateError> {
        let start_time = Instant::now();
        log::debug!(
            "Resolving archive - root: {}, identifier: {}",
            self.root.display(),
            raw_identifier
        );

        let identifier = percent_decode_str(raw_identifier)
            .decode_utf8()
            .map_err(|_| LocateError::NotFound(raw_identifier.to_string()))?;

        if !is_single_segment(&identifier) {
            log::warn!("Rejected archive identifier: {:?}", identifier);
            return Err(LocateError::Traversal(identifier.into_owned()));
        }

        let requested = self.root.join(identifier.as_ref());
        let path = match fs::canonicalize(&requested) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LocateError::NotFound(identifier.into_owned()));
            }
            Err(e) => {
                return Err(LocateError::Io {
                    identifier: identifier.into_owned(),
                    source: e,
                })
            }
        };

        // A symlink inside the root may still point elsewhere.
        if !path.starts_with(&self.root) {
            log::warn!("Path escapes archive root: {}", path.display());
            return Err(LocateError::Traversal(identifier.into_owned()));
        }

        if !path.is_dir() {
            return Err(LocateError::NotFound(identifier.into_owned()));
        }

        let entries = list_entries(&path).map_err(|e| {
            log::error!("Failed to list entries of {}: {}", path.display(), e);
            LocateError::Io {
                identifier: identifier.to_string(),
                source: e,
            }
        })?;

        log::debug!(
            "Resolved {} to {} ({} entries) in {:?}",
            identifier,
            path.display(),
            entries.len(),
            start_time.elapsed()
        );

        Ok(ResolvedFolder { path, entries })
    }
}

/// True when `identifier` names exactly one ordinary child of a directory.
fn is_single_segment(identifier: &str) -> bool {
    if identifier.is_empty() || identifier.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(identifier).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn list_entries(dir: &Path) -> io::Result<Vec<OsString>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
