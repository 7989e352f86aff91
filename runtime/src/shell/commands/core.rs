//! Core shell commands: echo, help, collect

use std::rc::Rc;

use bshell_macros::shell_commands;
use futures_lite::future::BoxedLocal;

use super::super::args::{ArgOptions, ArgsOrStdin};
use super::super::env::ExecEnv;
use super::super::value::Value;
use super::CommandSpec;
use crate::error::Result;
use crate::io::{Reader, Writer};

/// Core commands - basic shell utilities.
pub struct CoreCommands;

#[shell_commands]
impl CoreCommands {
    /// echo - output the argument text as a single item
    #[shell_command(
        name = "echo",
        usage = "echo [TEXT]",
        description = "Output the argument text"
    )]
    fn cmd_echo(
        _env: Rc<ExecEnv>,
        _stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move { stdout.write(Value::from(args.unwrap_or_default())).await })
    }

    /// help - describe commands
    #[shell_command(
        name = "help",
        usage = "help [-l] [COMMAND]...",
        description = "Show help",
        help = "help - show short descriptions for all commands",
        help = "help commands... - show all help for COMMANDS",
        help = "help -l - list commands"
    )]
    fn cmd_help(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            if args.as_deref().map(str::trim) == Some("-l") {
                let names: Vec<Value> = env.registry().names().map(Value::from).collect();
                return stdout.write(Value::List(names)).await;
            }

            let mut input = ArgsOrStdin::new(
                Rc::clone(&env),
                stdin,
                args.as_deref(),
                ArgOptions::new("help").split_stdin().flatten(),
            );
            let wanted = input.read_all().await;
            let details = !wanted.is_empty();

            let mut specs: Vec<&CommandSpec> = if details {
                wanted
                    .iter()
                    .filter_map(|name| {
                        let name = name.to_string();
                        let spec = env.command(&name);
                        if spec.is_none() {
                            env.error(format!("help: no such command: {}", name));
                        }
                        spec
                    })
                    .collect()
            } else {
                env.registry().specs().collect()
            };
            specs.sort_by_key(|spec| spec.name);
            specs.dedup_by_key(|spec| spec.name);

            for spec in specs {
                stdout.write(Value::from(describe(spec, details))).await?;
            }
            Ok(())
        })
    }

    /// collect - gather all input into one list
    #[shell_command(
        name = "collect",
        usage = "collect [ITEM]...",
        description = "Collect inputs into an array"
    )]
    fn cmd_collect(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(env, stdin, args.as_deref(), ArgOptions::new("collect"));
            let items = input.read_all().await;
            stdout.write(Value::List(items)).await
        })
    }
}

fn describe(spec: &CommandSpec, details: bool) -> String {
    let mut doc = spec.name.to_string();
    if !spec.aliases.is_empty() {
        doc.push_str(&format!(" ({})", spec.aliases.join(",")));
    }
    doc.push(' ');
    doc.push_str(spec.description);
    if details {
        doc.push_str(&format!("\n  usage: {}", spec.usage));
        for line in spec.help {
            doc.push('\n');
            doc.push_str(line);
        }
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::commands::Registry;

    #[test]
    fn test_describe_short() {
        let registry = Registry::builtin();
        let head = registry.get("head").unwrap();
        assert_eq!(describe(head, false), "head (take) Keep the first [n=5] elements");
    }

    #[test]
    fn test_describe_details() {
        let registry = Registry::builtin();
        let help = registry.get("help").unwrap();
        let text = describe(help, true);
        assert!(text.starts_with("help Show help\n  usage: help [-l]"));
        assert!(text.ends_with("help -l - list commands"));
    }
}
