//! Linux-specific shared memory operations

use crate::error::{ShmError, ShmResult};
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Linux-specific memory mapping configuration
pub struct LinuxMemoryConfig {
    /// Prefault pages at map time for RT performance
    pub populate: bool,
    /// File mode of newly created segments
    pub mode: u32,
}

impl Default for LinuxMemoryConfig {
    fn default() -> Self {
        Self {
            populate: true,
            // External producers run under other users on the bench.
            mode: 0o666,
        }
    }
}

/// Create a new memory-mapped segment file; fails if the file exists
pub fn create_segment_mmap(
    path: &Path,
    size: usize,
    config: &LinuxMemoryConfig,
) -> Result<MmapMut, std::io::Error> {
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(config.mode)
        .open(path)?;

    // Zero-filled by the kernel
    file.set_len(size as u64)?;

    let mut mmap_options = MmapOptions::new();
    if config.populate {
        mmap_options.populate();
    }

    let mmap = unsafe { mmap_options.map_mut(&file)? };
    Ok(mmap)
}

/// Attach to existing segment
pub fn attach_segment_mmap(path: &Path) -> Result<MmapMut, std::io::Error> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;

    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Remove a segment file, ignoring files that are already gone
pub fn unlink_segment(path: &Path) -> ShmResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ShmError::Io { source: e }),
    }
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(_) => true,
            Err(nix::Error::ESRCH) => false,
            Err(nix::Error::EPERM) => true, // exists, owned by someone else
            Err(_) => false,
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        false
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

/// Block until `word` no longer holds `expected`, a wake-up, or the timeout.
///
/// Uses a shared (non-private) futex so that waiters in other processes
/// mapping the same segment are woken as well. Spurious returns are
/// possible; callers re-check the word.
#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    let ts = timeout.map(|t| libc::timespec {
        tv_sec: t.as_secs() as libc::time_t,
        tv_nsec: t.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    // EAGAIN (value changed), EINTR and ETIMEDOUT all mean "re-check".
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Wake every waiter blocked on `word`.
#[cfg(target_os = "linux")]
pub fn futex_wake_all(word: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAKE,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Sleeping fallback for platforms without futexes
#[cfg(not(target_os = "linux"))]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) {
    use std::sync::atomic::Ordering;

    let step = Duration::from_micros(50);
    let deadline = timeout.map(|t| std::time::Instant::now() + t);
    while word.load(Ordering::Acquire) == expected {
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                return;
            }
        }
        std::thread::sleep(step);
    }
}

/// No-op on platforms without futexes; waiters poll the word
#[cfg(not(target_os = "linux"))]
pub fn futex_wake_all(_word: &AtomicU32) {}
