use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity of interruptible sleeps.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Free space at a recording target
pub trait StorageProbe: Send + Sync {
    fn available_bytes(&self, directory: &Path) -> io::Result<u64>;
}

/// `statvfs(3)` based probe: blocks available to unprivileged users
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsProbe;

impl StorageProbe for StatvfsProbe {
    fn available_bytes(&self, directory: &Path) -> io::Result<u64> {
        let stat = nix::sys::statvfs::statvfs(directory).map_err(io::Error::from)?;
        #[allow(clippy::unnecessary_cast)]
        let bytes = stat.blocks_available() as u64 * stat.fragment_size() as u64;
        Ok(bytes)
    }
}

/// Sleep for `total`, waking early once `stop` is set. Returns false if interrupted.
pub fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if stop.load(Ordering::Acquire) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        std::thread::sleep(left.min(STOP_POLL));
    }
}
