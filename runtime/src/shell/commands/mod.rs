//! Shell command implementations.
//!
//! Every command reads from an optional upstream reader, writes items to its
//! own writer and returns a `Result`. The writer closes when the command's
//! future completes or is dropped, so downstream always sees end-of-data.
//!
//! Commands are grouped by category; each category's `#[shell_commands]`
//! impl generates its registry entries.

mod background;
mod core;
mod interval;
mod settings;
mod stream;
mod string;
mod terminal;

pub use self::background::BackgroundCommands;
pub use self::core::CoreCommands;
pub use self::interval::IntervalCommands;
pub use self::settings::SettingsCommands;
pub use self::stream::StreamCommands;
pub use self::string::StringCommands;
pub use self::terminal::TerminalCommands;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use futures_lite::future::BoxedLocal;

use super::env::ExecEnv;
use super::value::Value;
use crate::error::Result;
use crate::io::{Reader, Writer};

/// Command function type.
/// Takes the execution context, the upstream reader (absent for the first
/// stage), this stage's writer and the raw argument text.
pub type CommandFn = fn(
    env: Rc<ExecEnv>,
    stdin: Option<Reader<Value>>,
    stdout: Writer<Value>,
    args: Option<String>,
) -> BoxedLocal<Result<()>>;

/// One registry entry. `run == None` forwards input unchanged.
#[derive(Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
    pub help: &'static [&'static str],
    pub aliases: &'static [&'static str],
    pub run: Option<CommandFn>,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("forward", &self.run.is_none())
            .finish()
    }
}

/// Name → command table with alias resolution.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    commands: BTreeMap<&'static str, CommandSpec>,
    aliases: HashMap<&'static str, &'static str>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in command.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for spec in ShellCommands::specs() {
            registry.register(spec);
        }
        registry
    }

    /// Add or replace a command and its aliases.
    pub fn register(&mut self, spec: CommandSpec) {
        for &alias in spec.aliases {
            self.aliases.insert(alias, spec.name);
        }
        self.commands.insert(spec.name, spec);
    }

    /// Canonical name lookup only.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    pub fn resolve_alias(&self, alias: &str) -> Option<&'static str> {
        self.aliases.get(alias).copied()
    }

    /// Look up by canonical name, falling back to aliases.
    pub fn lookup(&self, name: &str) -> Option<&CommandSpec> {
        self.get(name)
            .or_else(|| self.resolve_alias(name).and_then(|c| self.get(c)))
    }

    /// Commands sorted by name.
    pub fn specs(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Unified shell commands interface.
///
/// Gathers the registry entries of every category module; dispatch goes
/// through the [`Registry`] built from them.
pub struct ShellCommands;

impl ShellCommands {
    pub fn specs() -> Vec<CommandSpec> {
        let mut specs = Vec::new();
        specs.extend(CoreCommands::specs());
        specs.extend(StreamCommands::specs());
        specs.push(stream::PAUSE);
        specs.extend(StringCommands::specs());
        specs.extend(IntervalCommands::specs());
        specs.extend(TerminalCommands::specs());
        specs.extend(SettingsCommands::specs());
        specs.extend(BackgroundCommands::specs());
        specs
    }
}

/// Copy every upstream item to `stdout`. Used for entries without an
/// implementation.
pub async fn forward(stdin: Option<Reader<Value>>, stdout: Writer<Value>) -> Result<()> {
    if let Some(stdin) = stdin {
        while let Some(item) = stdin.read().await {
            stdout.write(item).await?;
        }
    }
    Ok(())
}

/// Parse a leading count argument, falling back to `default` when the text
/// is absent, not a number, or zero.
pub fn parse_count(args: Option<&str>, default: usize) -> usize {
    args.and_then(|a| a.split_whitespace().next())
        .and_then(|a| a.parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(default)
}
