use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{ConfigError, StreamFault};

pub const DEFAULT_CHUNK_SIZE: usize = 250;

/// Longest stretch of a pacing pause without looking at the shutdown flag.
const PAUSE_SLICE: Duration = Duration::from_millis(50);

/// Why a relay stopped before the end of the archive without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The client disconnected.
    ClientGone,
    /// The client stopped accepting data for longer than the write timeout.
    ClientStalled,
    /// The server is shutting down.
    Shutdown,
}

/// What was moved before the relay stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub chunks: u64,
    pub bytes: u64,
}

#[derive(Debug)]
pub enum RelayOutcome {
    Completed(RelayStats),
    Cancelled(RelayStats, CancelReason),
    Failed(RelayStats, StreamFault),
}

impl RelayOutcome {
    pub fn stats(&self) -> RelayStats {
        match self {
            RelayOutcome::Completed(stats)
            | RelayOutcome::Cancelled(stats, _)
            | RelayOutcome::Failed(stats, _) => *stats,
        }
    }

    /// Whether the client can still be sent the end of the body.
    pub fn client_reachable(&self) -> bool {
        !matches!(
            self,
            RelayOutcome::Cancelled(_, CancelReason::ClientGone | CancelReason::ClientStalled)
                | RelayOutcome::Failed(_, StreamFault::Write(_))
        )
    }
}

/// Copies a byte stream to a sink in bounded chunks, one write per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relay {
    chunk_size: usize,
    pacing: Option<Duration>,
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pacing: None,
        }
    }
}

impl Relay {
    /// A zero `pacing` is the same as none.
    pub fn new(chunk_size: usize, pacing: Option<Duration>) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(Self {
            chunk_size,
            pacing: pacing.filter(|d| !d.is_zero()),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn pacing(&self) -> Option<Duration> {
        self.pacing
    }

    /// Pumps `source` into `sink` until the source is exhausted, the sink
    /// fails, or `shutdown` is raised. Never reads a new chunk while the
    /// previous one is still being written.
    pub fn pump<R: Read, W: Write>(
        &self,
        source: &mut R,
        sink: &mut W,
        shutdown: &AtomicBool,
    ) -> RelayOutcome {
        let mut stats = RelayStats::default();
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            if shutdown.load(Ordering::Relaxed) {
                return RelayOutcome::Cancelled(stats, CancelReason::Shutdown);
            }

            let n = match source.read(&mut buf) {
                Ok(0) => {
                    log::debug!(
                        "Archiver output finished after {} chunks ({} bytes)",
                        stats.chunks,
                        stats.bytes
                    );
                    return RelayOutcome::Completed(stats);
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return RelayOutcome::Failed(stats, StreamFault::Read(e)),
            };

            log::trace!("Sending archive chunk of {} bytes", n);
            let started = Instant::now();
            if let Err(e) = sink.write_all(&buf[..n]).and_then(|()| sink.flush()) {
                return match cancel_reason(&e) {
                    Some(reason) => RelayOutcome::Cancelled(stats, reason),
                    None => RelayOutcome::Failed(stats, StreamFault::Write(e)),
                };
            }
            stats.chunks += 1;
            stats.bytes += n as u64;

            let elapsed = started.elapsed();
            if elapsed > Duration::from_secs(1) {
                log::debug!("Client took {:?} to accept a chunk", elapsed);
            }

            if let Some(delay) = self.pacing {
                pause(delay, shutdown);
            }
        }
    }
}

/// Sleeps for `delay`, returning early once `shutdown` is raised.
fn pause(delay: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + delay;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        thread::sleep(remaining.min(PAUSE_SLICE));
    }
}

/// Write errors that mean the client went away rather than a server fault.
fn cancel_reason(error: &io::Error) -> Option<CancelReason> {
    match error.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => Some(CancelReason::ClientGone),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Some(CancelReason::ClientStalled),
        _ => None,
    }
}
