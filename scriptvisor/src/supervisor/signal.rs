//! Termination signal delivery and exit status decoding

use std::io;
use std::process::ExitStatus;
use tokio::process::Child;

/// Ask the worker to terminate.
///
/// On unix this is SIGTERM to the worker pid. Other platforms have no soft
/// termination, so the process is killed outright.
#[cfg(unix)]
pub fn terminate(child: &mut Child) -> io::Result<()> {
    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "worker has already been reaped"))?;
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;

    // SAFETY: kill(2) has no memory-safety preconditions
    let result = unsafe { libc::kill(pid, libc::SIGTERM) };
    if result == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

/// Signal that terminated the process, if any
#[cfg(unix)]
pub fn exit_signal(status: &ExitStatus) -> Option<i32> {
    std::os::unix::process::ExitStatusExt::signal(status)
}

#[cfg(not(unix))]
pub fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
