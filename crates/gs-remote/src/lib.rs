//! # gs-remote
//!
//! Runs GridSweep trials on remote machines.
//!
//! [`RemoteSession`] is the narrow "run a command on a host" capability the
//! rest of the system depends on; [`SshSession`] implements it with the
//! OpenSSH client. [`RemoteTrialExecutor`] turns one trial assignment into a
//! workload invocation, runs it through a session and parses the trailing
//! metrics report into a [`gs_types::TrialResult`].

mod executor;
mod invocation;
mod report;
mod session;
mod ssh;

pub use executor::RemoteTrialExecutor;
pub use invocation::{shell_quote, WorkloadInvocation};
pub use report::parse_report;
pub use session::{CommandOutput, OutputBuffer, RemoteSession};
pub use ssh::{SshConfig, SshSession};
