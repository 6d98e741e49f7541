use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::time::Duration;
use tokio::io::{AsyncReadExt, unix::AsyncFd};

/// A pipe read-end handed to a child process via `command-fds`, read from the
/// supervisor side with explicit deadlines — the async analogue of the
/// original's blocking `readPipe(fd, timeout)`.
pub struct PipeReader {
    inner: AsyncFd<std::fs::File>,
}

impl PipeReader {
    /// Takes ownership of a raw, already-nonblocking read-end fd.
    ///
    /// # Safety
    /// `fd` must be a valid, open file descriptor this process uniquely owns.
    pub unsafe fn from_raw_fd(fd: RawFd) -> std::io::Result<Self> {
        let owned: OwnedFd = OwnedFd::from_raw_fd(fd);
        let file = std::fs::File::from(owned);
        Ok(Self { inner: AsyncFd::new(file)? })
    }

    /// Reads up to `buf.len()` bytes, failing if nothing arrives within `timeout`.
    pub async fn read_with_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        tokio::time::timeout(timeout, self.read(buf))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "pipe read timed out"))?
    }

    async fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let mut guard = self.inner.readable_mut().await?;
            match guard.try_io(|inner| inner.get_mut().read(buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::IntoRawFd;

    fn make_pipe() -> (RawFd, std::fs::File) {
        let (r, w) = nix_pipe();
        (r, w)
    }

    // A tiny local pipe() wrapper so this test module doesn't need an extra
    // dependency just to exercise PipeReader.
    fn nix_pipe() -> (RawFd, std::fs::File) {
        let mut fds = [0 as RawFd; 2];
        let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(ret, 0);
        let write_end = unsafe { std::fs::File::from(OwnedFd::from_raw_fd(fds[1])) };
        unsafe {
            let flags = libc::fcntl(fds[0], libc::F_GETFL);
            libc::fcntl(fds[0], libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
        (fds[0], write_end)
    }

    #[tokio::test]
    async fn reads_written_bytes() {
        let (read_fd, mut write_end) = make_pipe();
        write_end.write_all(b"LISTENING").unwrap();
        let mut reader = unsafe { PipeReader::from_raw_fd(read_fd) }.unwrap();
        let mut buf = [0u8; 16];
        let n = reader.read_with_timeout(&mut buf, Duration::from_secs(1)).await.unwrap();
        assert_eq!(&buf[..n], b"LISTENING");
        let _ = write_end.into_raw_fd();
    }

    #[tokio::test]
    async fn times_out_when_nothing_written() {
        let (read_fd, write_end) = make_pipe();
        let mut reader = unsafe { PipeReader::from_raw_fd(read_fd) }.unwrap();
        let mut buf = [0u8; 16];
        let res = reader.read_with_timeout(&mut buf, Duration::from_millis(50)).await;
        assert!(res.is_err());
        drop(write_end);
    }
}
