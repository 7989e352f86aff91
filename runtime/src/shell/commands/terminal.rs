//! Terminal commands: history, _, clear

use std::rc::Rc;

use bshell_macros::shell_commands;
use futures_lite::future::BoxedLocal;

use super::super::env::ExecEnv;
use super::super::value::Value;
use super::parse_count;
use crate::error::{Result, ShellError};
use crate::io::{Reader, Writer};

/// Terminal commands - access to earlier lines and their output.
pub struct TerminalCommands;

#[shell_commands]
impl TerminalCommands {
    #[shell_command(
        name = "history",
        usage = "history [INDEX]",
        description = "Show command history",
        aliases = "hist",
        help = "history - print command history",
        help = "history index - print output from history[INDEX]"
    )]
    fn cmd_history(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            if let Some(stdin) = stdin {
                stdin.read_all().await;
            }
            let history = env.history();
            match args.as_deref().map(str::trim) {
                Some(index) => {
                    let index: isize = index.parse().map_err(|_| {
                        ShellError::InvalidArgument(format!("history: bad index '{}'", index))
                    })?;
                    if let Some(entry) = history.get(index) {
                        let lines = entry.output.into_iter().map(Value::from).collect();
                        stdout.write(Value::List(lines)).await?;
                    }
                }
                None => {
                    for (index, entry) in history.entries().into_iter().enumerate() {
                        stdout
                            .write(Value::from(format!("[{}] {}", index, entry.command)))
                            .await?;
                    }
                }
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "_",
        usage = "_ [n=1]",
        description = "Access the previous command's output",
        help = "_ n - output of the Nth previous command"
    )]
    fn cmd_previous(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            if let Some(stdin) = stdin {
                stdin.read_all().await;
            }
            let back = parse_count(args.as_deref(), 1) as isize;
            if let Some(entry) = env.history().get(-back) {
                stdout.write_all(entry.output.into_iter().map(Value::from)).await?;
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "clear",
        usage = "clear [history]",
        description = "Clear the screen",
        help = "clear - clear the screen",
        help = "clear history - forget every history entry"
    )]
    fn cmd_clear(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        _stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            if let Some(stdin) = stdin {
                stdin.read_all().await;
            }
            if args.as_deref().map(str::trim) == Some("history") {
                env.log().debug("cmd:clear", format_args!("history cleared"));
                env.history().clear()
            } else {
                env.request_clear();
                Ok(())
            }
        })
    }
}
