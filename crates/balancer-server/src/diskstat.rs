//! Disk and on-disk database size reporting for `/status`.
//!
//! Grounded on the original `DiskUsage`/`DBSize` helpers (`syscall.Statfs` +
//! `filepath.Walk`); `libc::statvfs` is the direct Rust analogue of
//! `syscall.Statfs` and `std::fs::read_dir` walks the tree the way
//! `filepath.Walk` does, so no new dependency is needed for either.

use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DiskUsage {
    pub all_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub avail_gb: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DbSize {
    pub size_mb: f64,
    pub size_gb: f64,
}

const GB: f64 = 1024.0 * 1024.0 * 1024.0;
const MB: f64 = 1024.0 * 1024.0;

fn bytes_to(bytes: u64, unit: f64) -> f64 {
    (bytes as f64 / unit * 100.0).round() / 100.0
}

/// Statfs-based free/used/available space for the filesystem backing `path`.
#[cfg(unix)]
pub fn disk_usage(path: &str) -> DiskUsage {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let Ok(cpath) = CString::new(path) else { return DiskUsage::default() };
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let rc = unsafe { libc::statvfs(cpath.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return DiskUsage::default();
    }
    let stat = unsafe { stat.assume_init() };
    let block_size = stat.f_frsize as u64;

    let all_gb = bytes_to(stat.f_blocks as u64 * block_size, GB);
    let avail_gb = bytes_to(stat.f_bavail as u64 * block_size, GB);
    let free_gb = bytes_to(stat.f_bfree as u64 * block_size, GB);

    DiskUsage { all_gb, used_gb: all_gb - free_gb, free_gb, avail_gb }
}

#[cfg(not(unix))]
pub fn disk_usage(_path: &str) -> DiskUsage {
    DiskUsage::default()
}

/// Recursively sums file sizes under `path`, mirroring `filepath.Walk`.
pub fn db_size(path: &str) -> DbSize {
    let total = walk_size(Path::new(path));
    DbSize { size_mb: bytes_to(total, MB), size_gb: bytes_to(total, GB) }
}

fn walk_size(path: &Path) -> u64 {
    let Ok(meta) = std::fs::symlink_metadata(path) else { return 0 };
    if meta.is_file() {
        return meta.len();
    }
    if !meta.is_dir() {
        return 0;
    }
    let Ok(entries) = std::fs::read_dir(path) else { return 0 };
    let mut total = 0u64;
    for entry in entries.flatten() {
        total += walk_size(&entry.path());
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_size_sums_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), vec![0u8; 1024]).unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("b"), vec![0u8; 2048]).unwrap();

        let size = db_size(dir.path().to_str().unwrap());
        assert_eq!(size.size_mb, bytes_to(3072, MB));
    }

    #[test]
    fn disk_usage_on_real_path_returns_nonzero() {
        let usage = disk_usage("/");
        assert!(usage.all_gb >= 0.0);
    }
}
