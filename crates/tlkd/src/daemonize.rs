//! Detach from the controlling terminal
//!
//! Must run before the tokio runtime or any other thread is started.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Which side of the fork the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forked {
    Parent { child: i32 },
    Child,
}

/// Fork; the child starts a new session, moves to `/`, and points stdio at
/// `/dev/null`. The parent is expected to exit right away.
///
/// # Safety
///
/// The process must still be single-threaded: only the calling thread
/// survives in the child.
pub unsafe fn daemonize() -> io::Result<Forked> {
    // Safe under the single-threaded precondition of this function.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(io::Error::last_os_error());
    }
    if pid > 0 {
        return Ok(Forked::Parent { child: pid });
    }

    // Safe because setsid has no memory effects; the return value is checked.
    if unsafe { libc::setsid() } < 0 {
        return Err(io::Error::last_os_error());
    }
    std::env::set_current_dir("/")?;

    let null = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // Safe because both descriptors are valid for the duration of the call.
        if unsafe { libc::dup2(null.as_raw_fd(), fd) } < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(Forked::Child)
}

/// Anchor `path` at `cwd` unless it is already absolute.
///
/// The detached child runs from `/`, so every path taken from the command
/// line or config must go through this before [`daemonize`].
pub fn resolve_from(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
