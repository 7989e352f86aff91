//! Settings commands: alias, debug, settings
//!
//! These change the session they run in. Aliases and settings live in the
//! shared [`ShellConfig`](crate::config::ShellConfig), the debug filter in the
//! shared [`Logger`](crate::logging::Logger), so the next line sees them.

use std::rc::Rc;

use bshell_macros::shell_commands;
use futures_lite::future::BoxedLocal;
use tracing::level_filters::LevelFilter;
use tracing::Level;

use super::super::args::{ArgOptions, ArgsOrStdin};
use super::super::env::ExecEnv;
use super::super::value::Value;
use crate::error::{Result, ShellError};
use crate::io::{Reader, Writer};

/// Settings commands - aliases, logging and config.
pub struct SettingsCommands;

#[shell_commands]
impl SettingsCommands {
    #[shell_command(
        name = "alias",
        usage = "alias [NAME [COMMAND]]",
        description = "Show command aliases",
        help = "alias - list aliases",
        help = "alias name command - define NAME as alias for COMMAND",
        help = "alias name - undefine alias NAME"
    )]
    fn cmd_alias(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(
                Rc::clone(&env),
                stdin,
                args.as_deref(),
                ArgOptions::new("alias").split_stdin().flatten(),
            );
            let words: Vec<String> = input
                .read_all()
                .await
                .iter()
                .map(ToString::to_string)
                .collect();
            match words.as_slice() {
                [] => {
                    let lines: Vec<Value> = env
                        .config()
                        .aliases
                        .iter()
                        .map(|(name, command)| format!("alias {}={}", name, command))
                        .map(Value::from)
                        .collect();
                    stdout.write_all(lines).await?;
                }
                [name] => {
                    let removed = env.config_mut().aliases.remove(name);
                    if removed.is_none() {
                        env.error(format!("alias: not found: {}", name));
                    }
                }
                [name, command, ..] => {
                    if env.registry().lookup(name).is_some() {
                        return Err(ShellError::InvalidArgument(format!(
                            "alias: {} is a built-in command",
                            name
                        )));
                    }
                    let Some(target) = env.resolve(command) else {
                        return Err(ShellError::UnknownCommand(command.clone()));
                    };
                    env.log()
                        .debug("cmd:alias", format_args!("{} -> {}", name, target));
                    env.config_mut()
                        .aliases
                        .insert(name.clone(), target.to_string());
                }
            }
            Ok(())
        })
    }

    #[shell_command(
        name = "debug",
        usage = "debug enable|enabled|disable [SUBSYSTEM]",
        description = "Control debug logging",
        help = "debug enable [subsystem] - log debug output for SUBSYSTEM (default: all)",
        help = "debug enabled [subsystem] - check whether SUBSYSTEM logs debug output",
        help = "debug disable - back to warnings only"
    )]
    fn cmd_debug(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let mut input = ArgsOrStdin::new(
                Rc::clone(&env),
                stdin,
                args.as_deref(),
                ArgOptions::new("debug").required(1),
            );
            let action = input.require().await?[0].to_string();
            let subsystem = input
                .read()
                .await
                .map(|v| v.to_string())
                .unwrap_or_else(|| "*".to_string());
            let log = env.log();

            let message = match action.as_str() {
                "disable" => {
                    let previous = log.render();
                    log.set_filter(DISABLED)?;
                    format!("debug disabled (was '{}')", previous)
                }
                "enable" => {
                    log.set_level(&subsystem, LevelFilter::DEBUG);
                    format!("debug enabled for '{}'", subsystem)
                }
                "enabled" => {
                    if log.enabled(&subsystem, Level::DEBUG) {
                        format!("debug enabled for '{}'", subsystem)
                    } else {
                        format!("debug NOT enabled for '{}'", subsystem)
                    }
                }
                _ => {
                    return Err(ShellError::InvalidArgument(format!(
                        "unknown debug args: {}",
                        args.as_deref().unwrap_or_default().trim()
                    )))
                }
            };
            env.config_mut().debug.filter = log.render();
            stdout.write(Value::from(message)).await
        })
    }

    #[shell_command(
        name = "settings",
        usage = "settings [reset | KEY | KEY:VALUE]",
        description = "Show or change settings",
        aliases = "set",
        help = "settings - list every setting as [key, value]",
        help = "settings key - show one setting, e.g. pipe.capacity",
        help = "settings key:value - change a setting",
        help = "settings reset - restore the defaults"
    )]
    fn cmd_settings(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            if let Some(stdin) = stdin {
                stdin.read_all().await;
            }
            let args = args.as_deref().map(str::trim).unwrap_or_default();

            if args.is_empty() {
                let entries = env.config().entries()?;
                let rows: Vec<Value> = entries
                    .into_iter()
                    .map(|(key, value)| setting_row(key, &value))
                    .collect();
                return stdout.write_all(rows).await;
            }

            if args == "reset" {
                let defaults = crate::config::ShellConfig::default();
                env.log().set_filter(&defaults.debug.filter)?;
                let mut config = env.config_mut();
                let aliases = std::mem::take(&mut config.aliases);
                *config = crate::config::ShellConfig { aliases, ..defaults };
                return Ok(());
            }

            let row = match split_setting(args) {
                Some((key, raw)) => {
                    if key == "debug.filter" {
                        env.log().set_filter(raw)?;
                    }
                    let stored = env.config_mut().set(key, raw)?;
                    setting_row(key.to_string(), &stored)
                }
                None => {
                    let value = env.config().get(args)?;
                    match value {
                        Some(value) => setting_row(args.to_string(), &value),
                        None => {
                            return Err(ShellError::InvalidArgument(format!(
                                "unknown setting: {}",
                                args
                            )))
                        }
                    }
                }
            };
            stdout.write(row).await
        })
    }
}

/// Filter `debug disable` falls back to.
const DISABLED: &str = "*=warn";

/// `key:value` or `key value`; keys never contain either separator.
fn split_setting(args: &str) -> Option<(&str, &str)> {
    let at = args.find(|c: char| c == ':' || c.is_whitespace())?;
    let (key, rest) = args.split_at(at);
    Some((key, rest[1..].trim_start()))
}

fn setting_row(key: String, value: &toml::Value) -> Value {
    Value::List(vec![Value::from(key), from_toml(value)])
}

fn from_toml(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::from(s.as_str()),
        toml::Value::Integer(n) => Value::Number(*n as f64),
        toml::Value::Float(n) => Value::Number(*n),
        toml::Value::Array(items) => Value::List(items.iter().map(from_toml).collect()),
        other => Value::from(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use crate::shell::commands::Registry;
    use crate::shell::pipeline::run_line;

    fn env() -> Rc<ExecEnv> {
        Rc::new(ExecEnv::new(Rc::new(Registry::builtin()), Logger::default()))
    }

    fn texts(env: &Rc<ExecEnv>, line: &str) -> Vec<String> {
        let result = run_line(env, line);
        assert!(result.errors.is_empty(), "{}: {:?}", line, result.errors);
        result.output.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_split_setting() {
        assert_eq!(split_setting("pipe.capacity:8"), Some(("pipe.capacity", "8")));
        assert_eq!(split_setting("pipe.capacity 8"), Some(("pipe.capacity", "8")));
        assert_eq!(
            split_setting("debug.filter:cmd:string=debug"),
            Some(("debug.filter", "cmd:string=debug"))
        );
        assert_eq!(split_setting("pipe.capacity"), None);
    }

    #[test]
    fn test_alias_define_use_and_list() {
        let env = env();
        assert!(texts(&env, "alias ll len").is_empty());
        assert_eq!(texts(&env, "ll a bb"), vec!["1", "2"]);
        // the target is stored by canonical name
        assert!(texts(&env, "alias first take").is_empty());
        assert_eq!(
            texts(&env, "alias"),
            vec!["alias first=head", "alias ll=len"]
        );
    }

    #[test]
    fn test_alias_undefine() {
        let env = env();
        texts(&env, "alias ll len");
        assert!(texts(&env, "alias ll").is_empty());
        assert_eq!(
            run_line(&env, "ll x").errors,
            vec!["Unknown command: ll"]
        );
        assert_eq!(
            run_line(&env, "alias ll").errors,
            vec!["alias: not found: ll"]
        );
    }

    #[test]
    fn test_alias_rejects_bad_definitions() {
        let env = env();
        assert_eq!(
            run_line(&env, "alias x frob").errors,
            vec!["Unknown command: frob"]
        );
        assert_eq!(
            run_line(&env, "alias head len").errors,
            vec!["invalid argument: alias: head is a built-in command"]
        );
        assert!(env.config().aliases.is_empty());
    }

    #[test]
    fn test_alias_from_stdin() {
        let env = env();
        texts(&env, "echo ll len | alias");
        assert_eq!(env.resolve("ll"), Some("len"));
    }

    #[test]
    fn test_debug_enable_and_check() {
        let env = env();
        assert_eq!(
            texts(&env, "debug enabled pipe"),
            vec!["debug NOT enabled for 'pipe'"]
        );
        assert_eq!(
            texts(&env, "debug enable pipe"),
            vec!["debug enabled for 'pipe'"]
        );
        assert!(env.log().enabled("pipe", Level::DEBUG));
        assert!(!env.log().enabled("exec", Level::DEBUG));
        assert_eq!(
            texts(&env, "debug enabled pipe"),
            vec!["debug enabled for 'pipe'"]
        );
        assert_eq!(env.config().debug.filter, "pipe=debug,*=warn");
    }

    #[test]
    fn test_debug_enable_all_then_disable() {
        let env = env();
        texts(&env, "debug enable");
        assert!(env.log().enabled("anything", Level::DEBUG));
        assert_eq!(
            texts(&env, "debug disable"),
            vec!["debug disabled (was '*=debug')"]
        );
        assert!(!env.log().enabled("anything", Level::DEBUG));
        assert_eq!(env.config().debug.filter, DISABLED);
    }

    #[test]
    fn test_debug_bad_args() {
        let env = env();
        assert_eq!(
            run_line(&env, "debug").errors,
            vec!["debug: expected 1 argument(s), got 0"]
        );
        assert_eq!(
            run_line(&env, "debug loud pipe").errors,
            vec!["invalid argument: unknown debug args: loud pipe"]
        );
    }

    #[test]
    fn test_settings_list_and_get() {
        let env = env();
        let result = run_line(&env, "settings");
        assert!(result.output.contains(&Value::List(vec![
            Value::from("pipe.capacity"),
            Value::from(crate::io::DEFAULT_CAPACITY),
        ])));
        assert_eq!(
            run_line(&env, "set output.max_buffer").output,
            vec![Value::List(vec![
                Value::from("output.max_buffer"),
                Value::from(1024usize)
            ])]
        );
        assert_eq!(
            run_line(&env, "set output.nope").errors,
            vec!["invalid argument: unknown setting: output.nope"]
        );
    }

    #[test]
    fn test_settings_change_and_reset() {
        let env = env();
        texts(&env, "alias ll len");
        texts(&env, "set pipe.capacity:2");
        assert_eq!(env.config().pipe.capacity, 2);
        texts(&env, "set debug.filter:exec=info");
        assert!(env.log().enabled("exec", Level::INFO));
        assert!(!env.log().enabled("pipe", Level::WARN));

        texts(&env, "settings reset");
        assert_eq!(env.config().pipe.capacity, crate::io::DEFAULT_CAPACITY);
        assert!(env.log().enabled("pipe", Level::WARN));
        // aliases are not settings
        assert_eq!(env.resolve("ll"), Some("len"));
    }

    #[test]
    fn test_settings_bad_value_keeps_config() {
        let env = env();
        let result = run_line(&env, "set pipe.capacity:lots");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("config error: pipe.capacity"));
        assert_eq!(env.config().pipe.capacity, crate::io::DEFAULT_CAPACITY);

        assert!(!run_line(&env, "set debug.filter:pipe=loud").errors.is_empty());
        assert_eq!(env.config().debug.filter, "*=warn");
    }
}
