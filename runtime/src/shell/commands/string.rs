//! String commands: trim, gsub, grep

use std::rc::Rc;

use bshell_macros::shell_commands;
use futures_lite::future::BoxedLocal;
use regex::RegexBuilder;

use super::super::args::{ArgOptions, ArgsOrStdin};
use super::super::env::ExecEnv;
use super::super::value::Value;
use crate::error::Result;
use crate::io::{Reader, Writer};

/// String commands - per-item text edits and filters.
pub struct StringCommands;

#[shell_commands]
impl StringCommands {
    #[shell_command(
        name = "trim",
        usage = "trim [TEXT]...",
        description = "Trim whitespace",
        aliases = "chomp"
    )]
    fn cmd_trim(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(env, stdin, args.as_deref(), ArgOptions::new("trim"));
            while let Some(item) = input.read().await {
                for element in item.into_items() {
                    let element = match element {
                        Value::Text(text) => Value::from(text.trim()),
                        other => other,
                    };
                    stdout.write(element).await?;
                }
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "gsub",
        usage = "gsub [-gGi] REGEX REPLACEMENT [TEXT]...",
        description = "Search and replace regexp",
        help = "gsub [-gGi] regex replacement - replace REGEX match(es) with REPLACEMENT",
        help = "  Flags: g => global(default), G => not global, i => ignore case"
    )]
    fn cmd_gsub(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(
                env,
                stdin,
                args.as_deref(),
                ArgOptions::new("gsub").flags("gGi").required(2),
            );
            let required = input.require().await?;
            let (pattern, replacement) = (required[0].to_string(), required[1].to_string());
            let global = input.flag('g') || !input.flag('G');
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(input.flag('i'))
                .build()?;

            while let Some(item) = input.read().await {
                let text = item.to_string();
                let replaced = if global {
                    re.replace_all(&text, replacement.as_str())
                } else {
                    re.replace(&text, replacement.as_str())
                };
                stdout.write(Value::from(replaced.into_owned())).await?;
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "grep",
        usage = "grep [-iv] PATTERN [TEXT]...",
        description = "Search for lines matching a pattern",
        help = "grep [-iv] pattern ...rest - find matches for PATTERN in REST.",
        help = "  Flags: i => ignore case, v => keep non-matching lines"
    )]
    fn cmd_grep(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(
                env,
                stdin,
                args.as_deref(),
                ArgOptions::new("grep").flags("iv").required(1),
            );
            let required = input.require().await?;
            let re = RegexBuilder::new(&required[0].to_string())
                .case_insensitive(input.flag('i'))
                .build()?;
            let invert = input.flag('v');

            while let Some(item) = input.read().await {
                let text = item.to_string();
                for line in text.split('\n') {
                    if re.is_match(line) != invert {
                        stdout.write(Value::from(line)).await?;
                    }
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use crate::shell::commands::Registry;
    use crate::shell::pipeline::run_line;

    fn run(line: &str) -> (Vec<String>, Vec<String>) {
        let env = Rc::new(ExecEnv::new(Rc::new(Registry::builtin()), Logger::silent()));
        let result = run_line(&env, line);
        (
            result.output.iter().map(Value::to_string).collect(),
            result.errors,
        )
    }

    #[test]
    fn test_gsub_global_by_default() {
        let (out, errors) = run("gsub o 0 foo boo");
        assert!(errors.is_empty());
        assert_eq!(out, vec!["f00", "b00"]);
    }

    #[test]
    fn test_gsub_flags() {
        let (out, _) = run("gsub -G o 0 foo");
        assert_eq!(out, vec!["f0o"]);
        let (out, _) = run("gsub -i F x Foo");
        assert_eq!(out, vec!["xoo"]);
    }

    #[test]
    fn test_gsub_missing_replacement() {
        let (out, errors) = run("gsub only");
        assert!(out.is_empty());
        assert_eq!(errors, vec!["gsub: expected 2 argument(s), got 1"]);
    }

    #[test]
    fn test_gsub_bad_flag() {
        let (_, errors) = run("gsub -x a b c");
        assert_eq!(errors, vec!["invalid argument: unrecognized flags: x"]);
    }

    #[test]
    fn test_grep_lines_and_flags() {
        let (out, _) = run("echo one\ntwo\nthree | grep -i T");
        assert_eq!(out, vec!["two", "three"]);
        let (out, _) = run("echo one\ntwo\nthree | grep -v t");
        assert_eq!(out, vec!["one"]);
    }

    #[test]
    fn test_trim_alias() {
        let (out, errors) = run("echo a \n b | split \\n+ | chomp");
        assert!(errors.is_empty());
        assert_eq!(out, vec!["a", "b"]);
    }
}
