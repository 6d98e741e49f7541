use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::process::Stdio;
use std::time::Duration;

use command_fds::{CommandFdExt, FdMapping};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use balancer_protocol::child::{spawn_args, HEARTBEAT_PIPE_FD, LISTENING_HANDSHAKE, START_PIPE_FD};

use crate::pipe::PipeReader;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to create pipes: {0}")]
    Pipe(#[source] std::io::Error),
    #[error("failed to spawn child: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("startup handshake timed out waiting for slot {index}")]
    HandshakeTimeout { index: usize },
    #[error("startup handshake from slot {index} did not match expected payload")]
    HandshakeMismatch { index: usize },
}

pub struct SupervisorConfig {
    pub binary_path: String,
    pub node_address: String,
    pub allowed_origin: Option<String>,
    pub start_timeout: Duration,
    pub heartbeat_timeout: Duration,
}

/// A running, supervised child process.
///
/// The `tokio::process::Child` handle itself lives inside the exit-wait
/// task (it needs `&mut` access to call `wait()`/`start_kill()`); this
/// struct keeps only what callers need to observe liveness and request
/// shutdown.
pub struct Child {
    pub index: usize,
    pub port: u16,
    pid: Option<u32>,
    cancel: CancellationToken,
    /// Fires once whenever a heartbeat is observed.
    pub alive_rx: mpsc::Receiver<()>,
    pub exit_rx: watch::Receiver<bool>,
}

impl Child {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawns one child, performs the startup handshake, and wires up the
/// heartbeat/exit background tasks. Mirrors the original's `NewService`.
pub async fn spawn(index: usize, port: u16, cfg: &SupervisorConfig) -> Result<Child, SupervisorError> {
    let (start_r, start_w) = os_pipe().map_err(SupervisorError::Pipe)?;
    let (hb_r, hb_w) = os_pipe().map_err(SupervisorError::Pipe)?;

    let mut command = Command::new(&cfg.binary_path);
    command
        .args(spawn_args(&cfg.node_address, port, cfg.allowed_origin.as_deref()))
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
        .fd_mappings(vec![
            FdMapping { parent_fd: unsafe { OwnedFd::from_raw_fd(start_w) }, child_fd: START_PIPE_FD },
            FdMapping { parent_fd: unsafe { OwnedFd::from_raw_fd(hb_w) }, child_fd: HEARTBEAT_PIPE_FD },
        ])
        .map_err(SupervisorError::Pipe)?;

    // `fd_mappings` took ownership of the write-ends above (they close when
    // the mapped `OwnedFd`s drop after `spawn()` duplicates them into the
    // child); nothing further to close here.
    let mut process = command.spawn().map_err(SupervisorError::Spawn)?;

    let mut start_reader = unsafe { PipeReader::from_raw_fd(start_r) }.map_err(SupervisorError::Pipe)?;
    let mut buf = [0u8; 32];
    let n = match start_reader.read_with_timeout(&mut buf, cfg.start_timeout).await {
        Ok(n) => n,
        Err(_) => {
            let _ = process.start_kill();
            return Err(SupervisorError::HandshakeTimeout { index });
        }
    };
    if &buf[..n] != LISTENING_HANDSHAKE {
        let _ = process.start_kill();
        return Err(SupervisorError::HandshakeMismatch { index });
    }

    let cancel = CancellationToken::new();
    let (alive_tx, alive_rx) = mpsc::channel(1);
    let (exit_tx, exit_rx) = watch::channel(false);

    let hb_cancel = cancel.clone();
    let heartbeat_timeout = cfg.heartbeat_timeout;
    tokio::spawn(async move {
        let mut reader = match unsafe { PipeReader::from_raw_fd(hb_r) } {
            Ok(r) => r,
            Err(_) => return,
        };
        let mut buf = [0u8; 32];
        loop {
            tokio::select! {
                _ = hb_cancel.cancelled() => return,
                result = reader.read_with_timeout(&mut buf, heartbeat_timeout) => {
                    match result {
                        Ok(0) => return,
                        Ok(_) => {
                            if alive_tx.send(()).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
            }
        }
    });

    let pid = process.id();
    let wait_cancel = cancel.clone();
    let mut wait_child = process;
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_cancel.cancelled() => {
                let _ = wait_child.start_kill();
                let _ = wait_child.wait().await;
            }
            _ = wait_child.wait() => {}
        }
        let _ = exit_tx.send(true);
    });

    Ok(Child { index, port, pid, cancel, alive_rx, exit_rx })
}

fn os_pipe() -> std::io::Result<(RawFd, RawFd)> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    unsafe {
        let flags = libc::fcntl(fds[0], libc::F_GETFL);
        libc::fcntl(fds[0], libc::F_SETFL, flags | libc::O_NONBLOCK);
    }
    Ok((fds[0], fds[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_pipe_returns_distinct_fds() {
        let (r, w) = os_pipe().unwrap();
        assert_ne!(r, w);
        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }
}
