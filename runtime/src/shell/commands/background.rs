//! Host command: background (bg)

use std::rc::Rc;

use bshell_macros::shell_commands;
use futures_lite::future::BoxedLocal;
use serde_json::Value as Json;

use super::super::args::{ArgOptions, ArgsOrStdin};
use super::super::env::ExecEnv;
use super::super::value::Value;
use crate::error::{Result, ShellError};
use crate::host::Payload;
use crate::io::{Reader, Writer};

/// Background commands - messages to the embedding host.
pub struct BackgroundCommands;

#[shell_commands]
impl BackgroundCommands {
    #[shell_command(
        name = "background",
        usage = "background TARGET:COMMAND [KEY:VALUE]...",
        description = "Send command to background",
        aliases = "bg",
        help = "bg target:command [args...] - send COMMAND to TARGET",
        help = "   ARGS can be key-value pairs with syntax KEY:VALUE"
    )]
    fn cmd_background(
        env: Rc<ExecEnv>,
        stdin: Option<Reader<Value>>,
        stdout: Writer<Value>,
        args: Option<String>,
    ) -> BoxedLocal<Result<()>> {
        Box::pin(async move {
            let args = match (&stdin, args) {
                (None, None) => Some("background:listCommands".to_string()),
                (_, args) => args,
            };
            let mut input = ArgsOrStdin::new(
                Rc::clone(&env),
                stdin,
                args.as_deref(),
                ArgOptions::new("background").required(1),
            );
            let required = input.require().await?;
            let (target, command) = split_target(&required[0].to_string())
                .ok_or_else(|| ShellError::InvalidArgument("missing target:command".to_string()))?;

            let payload = build_payload(input.read_all().await);
            env.log().debug(
                "cmd:bg",
                format_args!("target={} command={} payload={:?}", target, command, payload),
            );

            let response = env.host().send_message(&target, &command, payload).await?;
            if response.is_error() {
                return Err(ShellError::Host(response.errors.join(", ")));
            }
            let json =
                serde_json::to_string(&response).map_err(|e| ShellError::Host(e.to_string()))?;
            stdout.write(Value::from(json)).await
        })
    }
}

/// `target:command`, both parts non-empty.
fn split_target(text: &str) -> Option<(String, String)> {
    let (target, command) = text.split_once(':')?;
    let (target, command) = (target.trim(), command.trim());
    if target.is_empty() || command.is_empty() {
        return None;
    }
    Some((target.to_string(), command.to_string()))
}

/// `key:value` items; the first occurrence of a key wins, a bare key maps
/// to null.
fn build_payload(items: Vec<Value>) -> Payload {
    let mut payload = Payload::new();
    for item in items {
        let text = item.to_string();
        let (key, value) = match text.split_once(':') {
            Some((k, v)) => (k.to_string(), Json::String(v.to_string())),
            None => (text, Json::Null),
        };
        payload.entry(key).or_insert(value);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostResponse, LocalHost};
    use crate::logging::Logger;
    use crate::shell::commands::Registry;
    use crate::shell::pipeline::run_line;

    #[test]
    fn test_split_target() {
        assert_eq!(
            split_target("tabs:close"),
            Some(("tabs".to_string(), "close".to_string()))
        );
        assert_eq!(split_target("tabs"), None);
        assert_eq!(split_target(":close"), None);
    }

    #[test]
    fn test_payload_first_key_wins() {
        let payload = build_payload(vec![
            Value::from("a:1"),
            Value::from("b:2"),
            Value::from("a:3"),
            Value::from("flag"),
        ]);
        assert_eq!(payload["a"], Json::String("1".into()));
        assert_eq!(payload["b"], Json::String("2".into()));
        assert_eq!(payload["flag"], Json::Null);
    }

    fn env_with(host: LocalHost) -> Rc<ExecEnv> {
        Rc::new(
            ExecEnv::new(Rc::new(Registry::builtin()), Logger::silent())
                .with_host(Rc::new(host)),
        )
    }

    #[test]
    fn test_bg_roundtrip() {
        let host = LocalHost::new();
        host.on("background", "echo", |payload| HostResponse::ok(payload.clone()));
        let result = run_line(&env_with(host), "bg background:echo x:1");
        assert!(result.errors.is_empty());
        assert_eq!(result.output, vec![Value::from(r#"{"x":"1"}"#)]);
    }

    #[test]
    fn test_bg_host_error() {
        let result = run_line(&env_with(LocalHost::new()), "bg tabs:close");
        assert!(result.output.is_empty());
        assert_eq!(result.errors, vec!["host error: unknown command tabs:close"]);
    }

    #[test]
    fn test_bg_defaults_to_list() {
        let host = LocalHost::new();
        host.on("background", "ping", |_| HostResponse::default());
        let result = run_line(&env_with(host), "bg");
        assert_eq!(result.output, vec![Value::from(r#"{"commands":["ping"]}"#)]);
    }
}
