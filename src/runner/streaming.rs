//! Relays a child's output to ours while it runs.
//!
//! Each pipe gets its own thread so a chatty stderr cannot stall stdout. A
//! relay that loses its destination keeps reading and discards the rest, so
//! the child never blocks on a full pipe.

use std::io::{self, ErrorKind, Read, Write};
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};

const CHUNK_SIZE: usize = 8 * 1024;

/// Byte counts for one relayed pipe.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct Relayed {
    /// Bytes read from the child.
    pub(super) received: usize,
    /// Bytes that reached our stream.
    pub(super) delivered: usize,
}

impl Relayed {
    /// Whether part of the output was discarded.
    pub(super) const fn truncated(self) -> bool {
        self.delivered < self.received
    }
}

/// A finished child together with what its pipes carried.
#[derive(Debug)]
pub(super) struct ChildOutput {
    pub(super) status: ExitStatus,
    pub(super) stdout: Relayed,
    pub(super) stderr: Relayed,
}

/// Copy `source` into `sink` chunk by chunk until the child closes its end.
pub(super) fn relay<R: Read, W: Write>(mut source: R, mut sink: W) -> Relayed {
    let mut buffer = vec![0_u8; CHUNK_SIZE];
    let mut relayed = Relayed::default();
    let mut sink_open = true;
    loop {
        let count = match source.read(&mut buffer) {
            Ok(0) => break,
            Ok(count) => count,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::debug!("reading child output failed: {err}");
                break;
            }
        };
        relayed.received = relayed.received.saturating_add(count);
        if !sink_open {
            continue;
        }
        let Some(chunk) = buffer.get(..count) else {
            break;
        };
        match sink.write_all(chunk).and_then(|()| sink.flush()) {
            Ok(()) => relayed.delivered = relayed.delivered.saturating_add(count),
            Err(err) => {
                tracing::debug!("output closed ({err}); discarding the rest");
                sink_open = false;
            }
        }
    }
    relayed
}

fn collect(handle: JoinHandle<Relayed>, pipe: &str) -> Relayed {
    handle.join().unwrap_or_else(|_| {
        tracing::warn!("{pipe} relay thread panicked");
        Relayed::default()
    })
}

/// Relay the child's stdout and stderr to ours until it exits.
///
/// Both relay threads are joined before returning, including when waiting on
/// the child fails.
pub(super) fn wait_relaying_output(mut child: Child) -> io::Result<ChildOutput> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        stop(&mut child);
        return Err(io::Error::other("child was spawned without piped output"));
    };

    // Every write takes the lock afresh, so parallel steps interleave whole
    // chunks and never wait on each other's pipes.
    let stdout_relay = thread::spawn(move || relay(stdout, io::stdout()));
    let stderr_relay = thread::spawn(move || relay(stderr, io::stderr()));

    let waited = child.wait();
    if waited.is_err() {
        stop(&mut child);
    }
    let stdout_bytes = collect(stdout_relay, "stdout");
    let stderr_bytes = collect(stderr_relay, "stderr");
    Ok(ChildOutput {
        status: waited?,
        stdout: stdout_bytes,
        stderr: stderr_bytes,
    })
}

fn stop(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!("could not kill child: {err}");
    }
    if let Err(err) = child.wait() {
        tracing::debug!("could not reap child: {err}");
    }
}
