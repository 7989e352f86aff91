//! Shell module - single-threaded command pipelines over bounded pipes
//!
//! Lines are parsed into `|`-separated stages, each stage runs as a local
//! task with a reader on the previous stage's pipe and a writer on its own.

pub mod args;
pub mod commands;
pub mod env;
pub mod parser;
pub mod pipeline;
pub mod timers;
pub mod value;

pub use args::{ArgOptions, ArgsOrStdin};
pub use commands::{CommandFn, CommandSpec, Registry, ShellCommands};
pub use env::ExecEnv;
pub use parser::{parse_line, CommandLine, PipelineState, Stage};
pub use pipeline::{run_line, Pipeline, RunResult};
pub use value::Value;
