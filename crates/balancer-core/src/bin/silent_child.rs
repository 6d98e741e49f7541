//! Test fixture that never performs the startup handshake — stands in for
//! a child that hangs before binding its port, so the supervisor's
//! start-timeout path can be exercised against a real process rather than
//! a mock. Deliberately never touches FD 3/4.

fn main() {
    std::thread::sleep(std::time::Duration::from_secs(600));
}
