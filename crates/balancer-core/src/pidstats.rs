/// Accumulated CPU time, in clock ticks, for a process and its children.
///
/// Mirrors `utime+stime+cutime+cstime` from `/proc/<pid>/stat`; only
/// meaningful on Linux, where the pool's usage-based dispatch tier uses it
/// to pick the least-loaded child.
#[cfg(target_os = "linux")]
pub fn cpu_ticks(pid: u32) -> std::io::Result<u64> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/stat"))?;
    // Fields after the process name (which may itself contain spaces and is
    // wrapped in parentheses) are whitespace separated and fixed-position.
    let after_comm = contents
        .rfind(')')
        .map(|i| &contents[i + 2..])
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed stat line"))?;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // state=0, ppid=1, ... utime=11, stime=12, cutime=13, cstime=14
    // (offsets counted from the field following the comm field, which is
    // itself field index 2 in the canonical /proc/pid/stat numbering).
    let utime: u64 = fields.get(11).and_then(|s| s.parse().ok()).unwrap_or(0);
    let stime: u64 = fields.get(12).and_then(|s| s.parse().ok()).unwrap_or(0);
    let cutime: u64 = fields.get(13).and_then(|s| s.parse().ok()).unwrap_or(0);
    let cstime: u64 = fields.get(14).and_then(|s| s.parse().ok()).unwrap_or(0);
    Ok(utime + stime + cutime + cstime)
}

#[cfg(not(target_os = "linux"))]
pub fn cpu_ticks(_pid: u32) -> std::io::Result<u64> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "cpu usage dispatch only on linux"))
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn reads_own_pid_without_error() {
        let pid = std::process::id();
        let ticks = cpu_ticks(pid).unwrap();
        // Any running process has accrued at least a handful of ticks by the
        // time it reaches a test body.
        let _ = ticks;
    }

    #[test]
    fn parses_synthetic_stat_line() {
        // comm field deliberately contains a space and a closing paren look-alike.
        let line = "1234 (my) proc) R 1 1234 1234 0 -1 4194304 100 0 0 0 10 20 5 7 20 0 1 0 100 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0";
        let after_comm = &line[line.rfind(')').unwrap() + 2..];
        let fields: Vec<&str> = after_comm.split_whitespace().collect();
        let utime: u64 = fields[11].parse().unwrap();
        let stime: u64 = fields[12].parse().unwrap();
        let cutime: u64 = fields[13].parse().unwrap();
        let cstime: u64 = fields[14].parse().unwrap();
        assert_eq!(utime + stime + cutime + cstime, 10 + 20 + 5 + 7);
    }
}
