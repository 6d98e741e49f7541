//! Test fixture standing in for a real wallet-service/SBBS-monitor child.
//!
//! Implements exactly the contract SPEC_FULL §6 places on a supervised
//! child: write the literal bytes `LISTENING` to FD 3 once "bound", then
//! write a non-empty heartbeat byte to FD 4 on a steady cadence. CLI args
//! are accepted but ignored — this fixture only exists to drive
//! `balancer_core::supervisor::spawn` end to end in integration tests.

use std::fs::File;
use std::io::Write;
use std::os::fd::FromRawFd;
use std::thread;
use std::time::Duration;

fn main() {
    // SAFETY: the supervisor always hands the child exactly these two FDs
    // as its start-pipe and heartbeat-pipe write ends.
    let mut start = unsafe { File::from_raw_fd(3) };
    if start.write_all(b"LISTENING").is_err() {
        return;
    }
    drop(start);

    let mut heartbeat = unsafe { File::from_raw_fd(4) };
    loop {
        if heartbeat.write_all(b"H").is_err() {
            return;
        }
        thread::sleep(Duration::from_millis(200));
    }
}
