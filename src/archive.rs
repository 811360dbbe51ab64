//! The `/archive/{identifier}/` handler.
//!
//! Headers are committed before the archiver starts, so every failure after
//! that point can only shorten the body. Whatever happens while streaming, the
//! archiver is killed and reaped before the handler returns.

use std::io::{self, Write};
use std::sync::atomic::AtomicBool;

use crate::config::ServerConfig;
use crate::error::StreamFault;
use crate::http::{write_head, write_response, ChunkedWriter};
use crate::locator::ResolvedFolder;
use crate::log_error;
use crate::process::CompressionProcess;
use crate::relay::{CancelReason, RelayOutcome, RelayStats};

pub const NOT_FOUND_BODY: &str =
    "Error 404\nArchive does not exist or has been deleted\nАрхив не существует или был удален\n";

/// What the handler sent back.
#[derive(Debug)]
pub struct ArchiveResponse {
    pub status: &'static str,
    /// Payload bytes of the body, excluding framing.
    pub bytes: u64,
    /// Set once headers were committed and a relay was attempted.
    pub outcome: Option<RelayOutcome>,
}

pub fn handle_archive_request<W: Write>(
    client: &mut W,
    config: &ServerConfig,
    identifier: &str,
    shutdown: &AtomicBool,
) -> io::Result<ArchiveResponse> {
    let folder = match config.locator.resolve(identifier) {
        Ok(folder) => folder,
        Err(e) if e.is_not_found() => {
            log::error!("Error 404: link to non-existent folder ({})", e);
            write_response(
                client,
                "404 Not Found",
                "text/plain; charset=utf-8",
                NOT_FOUND_BODY.as_bytes(),
            )?;
            return Ok(ArchiveResponse {
                status: "404 Not Found",
                bytes: 0,
                outcome: None,
            });
        }
        Err(e) => {
            log_error!(e, "Archive lookup failed");
            write_response(
                client,
                "500 Internal Server Error",
                "text/plain; charset=utf-8",
                b"Internal Server Error",
            )?;
            return Ok(ArchiveResponse {
                status: "500 Internal Server Error",
                bytes: 0,
                outcome: None,
            });
        }
    };

    write_head(
        client,
        "200 OK",
        &[
            ("Content-Type", "application/zip"),
            ("Content-Disposition", "attachment; filename=\"archive.zip\""),
            ("Transfer-Encoding", "chunked"),
            ("Connection", "close"),
        ],
    )?;

    let mut body = ChunkedWriter::new(&mut *client);
    let outcome = stream_folder(&mut body, config, &folder, shutdown);
    report(identifier, &outcome);

    let bytes = body.bytes_sent();
    if outcome.client_reachable() {
        if let Err(e) = body.finish() {
            log::debug!("Could not close archive body: {}", e);
        }
    } else {
        body.abandon();
    }

    Ok(ArchiveResponse {
        status: "200 OK",
        bytes,
        outcome: Some(outcome),
    })
}

/// Runs the archiver for `folder` and relays its output into `body`.
fn stream_folder<W: Write>(
    body: &mut W,
    config: &ServerConfig,
    folder: &ResolvedFolder,
    shutdown: &AtomicBool,
) -> RelayOutcome {
    let mut process = match CompressionProcess::spawn(config.zip_program.as_os_str(), folder) {
        Ok(process) => process,
        Err(e) => return RelayOutcome::Failed(RelayStats::default(), StreamFault::Spawn(e)),
    };
    let pid = process.id();

    let outcome = config.relay.pump(&mut process, body, shutdown);
    let output_finished = matches!(outcome, RelayOutcome::Completed(_));

    match process.terminate(output_finished) {
        Ok(termination) if output_finished && !termination.status.success() => {
            RelayOutcome::Failed(
                outcome.stats(),
                StreamFault::ToolExit {
                    status: termination.status,
                    stderr: termination.stderr,
                },
            )
        }
        Ok(termination) => {
            if output_finished && termination.killed {
                log::warn!(
                    "Archiver pid {} closed its output but did not exit; killed it",
                    pid
                );
            }
            if !termination.stderr.is_empty() {
                log::debug!("Archiver pid {} stderr: {}", pid, termination.stderr);
            }
            outcome
        }
        Err(e) => {
            log_error!(e, format!("Failed to reap archiver pid {}", pid));
            outcome
        }
    }
}

fn report(identifier: &str, outcome: &RelayOutcome) {
    match outcome {
        RelayOutcome::Completed(stats) => log::info!(
            "Archive {} sent: {} chunks, {} bytes",
            identifier,
            stats.chunks,
            stats.bytes
        ),
        RelayOutcome::Cancelled(stats, reason) => {
            let cause = match reason {
                CancelReason::ClientGone => "client disconnected",
                CancelReason::ClientStalled => "client stopped reading",
                CancelReason::Shutdown => "server shutting down",
            };
            log::info!(
                "Download was interrupted ({}) after {} bytes",
                cause,
                stats.bytes
            );
        }
        RelayOutcome::Failed(stats, fault) => {
            log::error!(
                "error while downloading archive {}: {} ({}) after {} bytes",
                identifier,
                fault.category(),
                fault,
                stats.bytes
            );
            if let StreamFault::ToolExit { stderr, .. } = fault {
                if !stderr.is_empty() {
                    log::error!("archiver said: {}", stderr);
                }
            }
        }
    }
}
