//! Stream-of-values pipeline interpreter.
//!
//! A command line like `yes hi | head 3 | join ,` is split into stages, each
//! stage runs as a task on a single-threaded executor, and stages talk over
//! bounded [`io::Pipe`]s carrying [`Value`]s.

pub mod config;
pub mod error;
pub mod history;
pub mod host;
pub mod io;
pub mod logging;
pub mod session;
pub mod shell;

pub use config::ShellConfig;
pub use error::{Result, ShellError};
pub use history::{FileHistory, HistoryEntry, HistoryStore, MemoryHistory};
pub use host::{HostBridge, HostResponse, LocalHost, NullHost, Payload};
pub use logging::Logger;
pub use session::{Interrupter, Outcome, Session};
pub use shell::{ExecEnv, Pipeline, Registry, Value};
