//! Workflow shell library
//!
//! Dual-surface synchronisation, the Agent / Manual / Recording mode
//! controller and the automation-server channel. Exposed for the binary and
//! for integration testing.

pub mod channel;
pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod host;
pub mod metrics;
pub mod mode;
pub mod shell;
pub mod sync;

pub use commands::CommandResult;
pub use config::ShellConfig;
pub use errors::{ShellError, ShellResult};
pub use host::{interactive_bounds, HostWindow, HostWindowState};
pub use mode::{ControllerSettings, ModeController};
pub use shell::{OperatorCommand, Shell};
pub use sync::{SyncOutcome, Synchronizer};
