//! Ownership of the external archiver for the lifetime of one request.
//!
//! [`CompressionProcess`] is a guard: the child is killed and reaped when the
//! guard is consumed by [`CompressionProcess::terminate`] or, failing that,
//! when it is dropped. Either way no zombie or open pipe outlives the request.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::locator::ResolvedFolder;

/// Diagnostics kept from the archiver's stderr.
const STDERR_CAP: u64 = 4096;

/// How long a process that closed its output may take to exit by itself.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// How the process ended.
#[derive(Debug)]
pub struct Termination {
    pub status: ExitStatus,
    /// Set when a kill signal was sent instead of waiting for a normal exit.
    pub killed: bool,
    pub stderr: String,
}

pub struct CompressionProcess {
    child: Child,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<JoinHandle<Vec<u8>>>,
    reaped: bool,
}

impl CompressionProcess {
    /// Starts `<program> -r - -- <entries...>` inside the folder, so entry
    /// names inside the archive are relative to it. Entries are placed after
    /// `--` so a file named like an option is archived, not obeyed.
    pub fn spawn(program: &OsStr, folder: &ResolvedFolder) -> io::Result<Self> {
        let mut child = Command::new(program)
            .arg("-r")
            .arg("-")
            .arg("--")
            .args(&folder.entries)
            .current_dir(&folder.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        // stderr must keep flowing or a chatty archiver blocks on a full pipe.
        let stderr_drain = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let mut kept = Vec::new();
                let mut stderr = stderr;
                let _ = (&mut stderr).take(STDERR_CAP).read_to_end(&mut kept);
                let _ = io::copy(&mut stderr, &mut io::sink());
                kept
            })
        });

        log::debug!(
            "Started {} (pid {}) in {} with {} entries",
            program.to_string_lossy(),
            child.id(),
            folder.path.display(),
            folder.entries.len()
        );

        Ok(Self {
            child,
            stdout,
            stderr_drain,
            reaped: false,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Kills the process if it is still running and waits for it.
    ///
    /// With `output_finished` set the process has already closed its output,
    /// so it is first given a short grace period to exit with its real status.
    pub fn terminate(mut self, output_finished: bool) -> io::Result<Termination> {
        let grace = if output_finished {
            EXIT_GRACE
        } else {
            Duration::ZERO
        };
        self.reap(grace)
    }

    fn reap(&mut self, grace: Duration) -> io::Result<Termination> {
        let exited = if grace.is_zero() {
            None
        } else {
            // Output is done; let it finish on its own.
            self.stdout.take();
            self.wait_timeout(grace)?
        };

        let (status, killed) = match exited {
            Some(status) => (status, false),
            None => {
                if let Err(e) = self.child.kill() {
                    // Already reaped elsewhere or not permitted.
                    log::debug!("kill pid {}: {}", self.child.id(), e);
                }
                self.stdout.take();
                (self.child.wait()?, true)
            }
        };
        self.reaped = true;

        let stderr = self
            .stderr_drain
            .take()
            .and_then(|drain| drain.join().ok())
            .map(|bytes| String::from_utf8_lossy(&bytes).trim_end().to_string())
            .unwrap_or_default();

        log::debug!(
            "Archiver pid {} reaped: {} (killed: {})",
            self.child.id(),
            status,
            killed
        );

        Ok(Termination {
            status,
            killed,
            stderr,
        })
    }

    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);

        loop {
            match self.child.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None => {
                    if start.elapsed() >= timeout {
                        return Ok(None);
                    }
                    thread::sleep(poll_interval);
                }
            }
        }
    }
}

impl Read for CompressionProcess {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for CompressionProcess {
    fn drop(&mut self) {
        if !self.reaped {
            if let Err(e) = self.reap(Duration::ZERO) {
                log::error!("Failed to reap archiver pid {}: {}", self.child.id(), e);
            }
        }
    }
}
