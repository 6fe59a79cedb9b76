//! The command launcher port.
//!
//! The domain decides *whether* a command runs; an infrastructure crate
//! decides *how*. [`CommandLauncher`] is the seam between the two.

use async_trait::async_trait;

use crate::{LaunchError, ProjectEntry, ProjectId};

/// What a launcher reports after a successful launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchReport {
    /// Foreground run: the process exited. `exit_code` is `None` when it was
    /// terminated by a signal.
    Completed {
        /// Process exit code.
        exit_code: Option<i32>,
    },
    /// Background run: the process was spawned and left running.
    Detached {
        /// OS process id, when available.
        pid: Option<u32>,
    },
}

/// Starts configured commands.
///
/// Implementations must honour [`ProjectEntry::mode`]: wait for the process
/// in foreground mode, return as soon as it is spawned in background mode.
/// A launch is attempted exactly once; there is no retry.
#[async_trait]
pub trait CommandLauncher: Send + Sync {
    /// Launches `entry`'s command for `project`, handing it `payload`
    /// according to the launcher's delivery policy.
    async fn launch(
        &self,
        project: &ProjectId,
        entry: &ProjectEntry,
        payload: &[u8],
    ) -> Result<LaunchReport, LaunchError>;
}
