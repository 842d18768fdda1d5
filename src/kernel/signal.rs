//! Signal delivery to blocking processes

use crate::config::types::SignalStrength;
use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

impl SignalStrength {
    pub fn as_signal(self) -> Signal {
        match self {
            SignalStrength::Term => Signal::SIGTERM,
            SignalStrength::Kill => Signal::SIGKILL,
        }
    }
}

/// Deliver a termination signal to one process.
///
/// Returns whether the signal was delivered. A pid that exited between
/// scan and delivery (ESRCH) is not an error; the process table is racy by
/// nature. Other failures (EPERM) are reported as false and logged.
pub fn send(pid: i32, strength: SignalStrength) -> bool {
    match kill(Pid::from_raw(pid), strength.as_signal()) {
        Ok(()) => {
            debug!("sent {:?} to pid {}", strength.as_signal(), pid);
            true
        }
        Err(Errno::ESRCH) => {
            debug!("pid {} already exited", pid);
            false
        }
        Err(e) => {
            debug!("failed to signal pid {}: {}", pid, e);
            false
        }
    }
}
